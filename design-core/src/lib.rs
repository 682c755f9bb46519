//! # Design Core
//!
//! The design document model shared by the renderer and the bundle codec.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 design-core                 │
//! ├─────────────────────────────────────────────┤
//! │  Document Model  │  Version Store           │
//! │  - Elements      │  - Per-design logs       │
//! │  - Settings      │  - Restore / retention   │
//! │  - Validation    │  - Diff summaries        │
//! ├─────────────────────────────────────────────┤
//! │  Collaborators   │  Document Store          │
//! │  - Clock / IDs   │  - Memory / file backed  │
//! │  - Asset access  │  - Typed records         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Untrusted JSON enters through [`validate_document`]; everything downstream
//! works on the typed [`DesignDocument`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod collaborator;
pub mod color;
pub mod document;
pub mod element;
pub mod error;
pub mod sanitize;
pub mod store;
pub mod version;

pub use collaborator::{
    AssetError, AssetResolver, AssetSink, Clock, FixedClock, FsAssets, IdGenerator, MemoryAssets,
    SequentialIds, SystemClock, UuidGenerator,
};
pub use color::{Color, ColorParseError};
pub use document::{
    compare_version_strings, validate_document, DesignDocument, DesignSettings, Guide,
    GuideOrientation, Unit, ValidationLimits,
};
pub use element::{
    Border, BorderStyle, CropRect, Element, ElementKind, FilterKind, ImageFilter, ImageSpec,
    ObjectFit, QrErrorCorrection, QrSpec, Shadow, ShapeKind, ShapeSpec, TextAlign,
    TextDecoration, TextSpec,
};
pub use error::{DesignError, DesignResult, ErrorKind};
pub use store::{
    DesignRecord, DesignRepository, DocumentStore, FileDocumentStore, MemoryDocumentStore,
    StoreError,
};
pub use version::{Version, VersionDiff, VersionStore};

/// Design core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
