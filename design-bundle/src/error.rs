//! Bundle error types.

use design_core::{DesignError, ErrorKind};
use thiserror::Error;

/// Result type for bundle operations.
pub type BundleResult<T> = Result<T, BundleError>;

/// Errors raised while exporting or importing bundles.
#[derive(Debug, Error)]
pub enum BundleError {
    /// Validation, lookup or storage failure from the design model.
    #[error(transparent)]
    Design(#[from] DesignError),

    /// A required bundle field is absent.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The bundle is not a readable JSON or ZIP container.
    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    /// Script-like content or an unsafe path.
    #[error("Security violation at {path}: {reason}")]
    SecurityViolation {
        /// JSON path or archive entry that triggered the check.
        path: String,
        /// What was found.
        reason: String,
    },

    /// The incoming design is not newer than the stored one.
    #[error("Version conflict: incoming {incoming} is not newer than stored {stored}")]
    VersionConflict {
        /// Version carried by the bundle.
        incoming: String,
        /// Version of the stored design.
        stored: String,
    },

    /// The input exceeds the configured size limit.
    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge {
        /// Input size in bytes.
        size: u64,
        /// Configured maximum.
        limit: u64,
    },

    /// Extraction would exceed a resource ceiling.
    #[error("Resource limit exceeded: {0}")]
    ResourceExceeded(String),

    /// An asset could not be read or stored.
    #[error("Asset error: {0}")]
    Asset(String),

    /// Writing a container failed.
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BundleError {
    /// Machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Design(err) => err.kind(),
            Self::MissingField(_) => ErrorKind::MissingField,
            Self::InvalidBundle(_) => ErrorKind::InvalidDocument,
            Self::SecurityViolation { .. } => ErrorKind::SecurityViolation,
            Self::VersionConflict { .. } => ErrorKind::VersionConflict,
            Self::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            Self::ResourceExceeded(_) => ErrorKind::ResourceExceeded,
            Self::Asset(_) | Self::Io(_) => ErrorKind::Storage,
            Self::Encoding(_) => ErrorKind::Encoding,
        }
    }

    pub(crate) fn security(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SecurityViolation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<zip::result::ZipError> for BundleError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => Self::Io(io),
            other => Self::InvalidBundle(format!("archive: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_design_errors_keep_their_kind() {
        let err = BundleError::from(DesignError::NotFound("design x".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Not found: design x");
    }

    #[test]
    fn test_bundle_kinds() {
        assert_eq!(
            BundleError::FileTooLarge { size: 2, limit: 1 }.kind(),
            ErrorKind::FileTooLarge
        );
        assert_eq!(
            BundleError::security("design.title", "script").kind(),
            ErrorKind::SecurityViolation
        );
    }
}
