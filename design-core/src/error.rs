//! Error types for design operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for design operations.
pub type DesignResult<T> = Result<T, DesignError>;

/// Machine-readable classification shared by every error in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required key is absent.
    MissingField,
    /// A value is present but out of range or of the wrong type.
    InvalidValue,
    /// An element `type` the engine does not know.
    UnsupportedElement,
    /// An output or container format the engine cannot produce or read.
    UnsupportedFormat,
    /// Input could not be parsed as a design document at all.
    InvalidDocument,
    /// Script-like content or unsafe asset paths.
    SecurityViolation,
    /// Incoming design version is not newer than the stored one.
    VersionConflict,
    /// Input exceeds the configured maximum size.
    FileTooLarge,
    /// A resource ceiling (memory, pixels, element count) was hit.
    ResourceExceeded,
    /// A design or version lookup found nothing.
    NotFound,
    /// A storage collaborator failed.
    Storage,
    /// An output encoder failed.
    Encoding,
}

impl ErrorKind {
    /// Stable snake_case identifier for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::InvalidValue => "invalid_value",
            Self::UnsupportedElement => "unsupported_element",
            Self::UnsupportedFormat => "unsupported_format",
            Self::InvalidDocument => "invalid_document",
            Self::SecurityViolation => "security_violation",
            Self::VersionConflict => "version_conflict",
            Self::FileTooLarge => "file_too_large",
            Self::ResourceExceeded => "resource_exceeded",
            Self::NotFound => "not_found",
            Self::Storage => "storage",
            Self::Encoding => "encoding",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while parsing, validating, storing or versioning designs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DesignError {
    /// A required key is absent.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A value is out of range or malformed.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Unknown element type.
    #[error("Unsupported element type '{kind}' at elements[{index}]")]
    UnsupportedElement {
        /// Position in the `elements` array.
        index: usize,
        /// The rejected `type` value.
        kind: String,
    },

    /// The input is not a design document.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A resource ceiling was hit.
    #[error("Resource limit exceeded: {0}")]
    ResourceExceeded(String),

    /// A design or version was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A storage collaborator failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl DesignError {
    /// Shorthand for [`DesignError::InvalidValue`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Machine-readable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_) => ErrorKind::MissingField,
            Self::InvalidValue { .. } => ErrorKind::InvalidValue,
            Self::UnsupportedElement { .. } => ErrorKind::UnsupportedElement,
            Self::InvalidDocument(_) => ErrorKind::InvalidDocument,
            Self::ResourceExceeded(_) => ErrorKind::ResourceExceeded,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<std::io::Error> for DesignError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            DesignError::MissingField("elements".into()).kind(),
            ErrorKind::MissingField
        );
        assert_eq!(
            DesignError::invalid("opacity", "out of range").kind(),
            ErrorKind::InvalidValue
        );
        assert_eq!(
            DesignError::UnsupportedElement {
                index: 0,
                kind: "video".into()
            }
            .kind(),
            ErrorKind::UnsupportedElement
        );
    }

    #[test]
    fn test_error_messages() {
        let err = DesignError::invalid("elements[2].opacity", "must be within [0, 1]");
        assert_eq!(
            err.to_string(),
            "Invalid value for elements[2].opacity: must be within [0, 1]"
        );
        assert_eq!(ErrorKind::VersionConflict.to_string(), "version_conflict");
    }
}
