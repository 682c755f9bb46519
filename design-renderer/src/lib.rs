//! # Design Renderer
//!
//! Turns validated design documents into print and screen artifacts.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌─────────────┐   ┌──────────────────────┐
//! │ Compositor   │──▶│ ElementRenderer │──▶│ SVG canvas  │──▶│ resvg / tiny-skia    │
//! │ (sizing,     │   │ text · image ·  │   │ (design px) │   │ PNG JPEG WebP PDF    │
//! │  overlays)   │   │ shape · qr      │   │             │   │ (or SVG as-is)       │
//! └──────────────┘   └─────────────────┘   └─────────────┘   └──────────────────────┘
//! ```
//!
//! Element failures never abort a render: the element is drawn as a
//! placeholder and reported in [`RenderOutput::diagnostics`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod compose;
pub mod element;
pub mod error;
pub mod export;
pub mod image;
pub mod qr;
mod shape;
pub mod svg;
pub mod text;

pub use compose::{Composition, Compositor, RenderOptions, RenderOutput, Watermark, DEFAULT_MAX_PIXELS};
pub use element::ElementRenderer;
pub use error::{Diagnostic, ElementError, RenderError, RenderResult};
pub use export::{OutputFormat, PdfMetadata, PdfPage};
pub use text::{FontCatalog, ResolvedFont};
