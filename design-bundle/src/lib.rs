//! # Design Bundles
//!
//! Portable import/export of stored designs.
//!
//! ```text
//!              export_design / batch_export
//!  Repository ─────────────────────────────▶ JSON bundle | ZIP bundle
//!      ▲                                         │
//!      │  record + Version                       │ size · container · fields
//!      └──────────────── import_design ◀─────────┘ security · validation
//! ```
//!
//! Imports are all-or-nothing per design: every check runs before the first
//! write.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bundle;
pub mod error;
pub mod export;
pub mod import;
pub mod security;

pub use bundle::{
    Attachment, BundleManifest, BundledDesign, ExportBundle, BUNDLE_VERSION, DESIGN_DATA_KEY,
};
pub use error::{BundleError, BundleResult};
pub use export::{ContainerFormat, ExportOptions, Exporter};
pub use import::{
    BatchFailure, BatchImportReport, ImportOptions, ImportOutcome, ImportSource, Importer,
    VersionConflictStrategy, DEFAULT_MAX_FILE_SIZE, IMPORTED_SUFFIX,
};
