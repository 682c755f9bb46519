//! Renderer error types.

use design_core::{DesignError, ErrorKind};
use serde::Serialize;
use thiserror::Error;

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that abort a whole render.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The document failed validation; nothing was drawn.
    #[error("Invalid document: {0}")]
    InvalidDocument(#[from] DesignError),

    /// Render options are out of range (zero size, non-finite scale, ...).
    #[error("Invalid render options: {0}")]
    InvalidOptions(String),

    /// The requested output format is not supported.
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Output dimensions exceed the configured pixel ceiling.
    #[error("Resource limit exceeded: {0}")]
    ResourceExceeded(String),

    /// Rasterization or encoding failed.
    #[error("Encoding failed: {0}")]
    Encoding(String),
}

impl RenderError {
    /// Machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDocument(_) => ErrorKind::InvalidDocument,
            Self::InvalidOptions(_) => ErrorKind::InvalidValue,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::ResourceExceeded(_) => ErrorKind::ResourceExceeded,
            Self::Encoding(_) => ErrorKind::Encoding,
        }
    }
}

/// Why a single element could not be drawn.
#[derive(Debug, Error)]
pub enum ElementError {
    /// The asset behind an image could not be read.
    #[error("asset unavailable: {0}")]
    Asset(String),

    /// Asset bytes could not be decoded as an image.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// QR payload could not be encoded.
    #[error("QR encoding failed: {0}")]
    Qr(String),

    /// Element geometry or style cannot be drawn.
    #[error("cannot draw element: {0}")]
    Unrenderable(String),
}

impl ElementError {
    /// Machine-readable kind for diagnostics.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Asset(_) => ErrorKind::NotFound,
            Self::Decode(_) | Self::Unrenderable(_) => ErrorKind::InvalidValue,
            Self::Qr(_) => ErrorKind::Encoding,
        }
    }
}

/// An element that rendered as an error placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Position of the element in the document's element list.
    pub element_index: usize,
    /// The element's `id`, when it has one.
    pub element_id: Option<String>,
    /// Element `type` tag.
    pub element_type: String,
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable cause.
    pub message: String,
}
