//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use design_bundle::{VersionConflictStrategy, DEFAULT_MAX_FILE_SIZE};
use design_renderer::OutputFormat;

/// Validate, render, version and bundle design documents.
#[derive(Debug, Parser)]
#[command(name = "designctl", version)]
pub struct Cli {
    /// Directory holding stored designs and version history.
    #[arg(long, global = true, env = "DESIGN_STORE_DIR", default_value = "design-data")]
    pub store_dir: PathBuf,

    /// Root directory for image assets.
    #[arg(long, global = true, env = "DESIGN_ASSET_ROOT")]
    pub asset_root: Option<PathBuf>,

    /// Maximum bundle size in bytes.
    #[arg(long, global = true, env = "DESIGN_MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_FILE_SIZE)]
    pub max_file_size: u64,

    /// Ceiling on the estimated parsed size of a design, in bytes.
    #[arg(long, global = true, env = "DESIGN_MEMORY_LIMIT")]
    pub memory_limit: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a design document and print a summary.
    Validate {
        /// Design JSON file.
        file: PathBuf,
    },
    /// Render one design, or several into a multi-page PDF.
    Render(RenderArgs),
    /// Export a stored design as a bundle.
    Export(ExportArgs),
    /// Import one or more bundles.
    Import(ImportArgs),
    /// Inspect and manage version history.
    #[command(subcommand)]
    Versions(VersionsCommand),
}

/// `render` arguments.
#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Design JSON files; more than one requires `--format pdf`.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(long, default_value = "png")]
    pub format: OutputFormat,

    /// Output path.
    #[arg(long)]
    pub out: PathBuf,

    /// Output pixels per design pixel.
    #[arg(long, default_value_t = 1.0)]
    pub scale: f32,

    /// Exact output width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Exact output height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Extend the canvas by the design's bleed.
    #[arg(long)]
    pub bleed: bool,

    /// Draw crop marks in the bleed area.
    #[arg(long)]
    pub crop_marks: bool,

    /// Outline the safe zone.
    #[arg(long)]
    pub safe_zone: bool,

    /// Watermark text.
    #[arg(long)]
    pub watermark: Option<String>,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = 90)]
    pub quality: u8,

    /// PDF resolution overriding the design's.
    #[arg(long)]
    pub dpi: Option<f32>,

    /// PDF title.
    #[arg(long)]
    pub title: Option<String>,

    /// Skip loading system fonts.
    #[arg(long)]
    pub no_system_fonts: bool,
}

/// `export` arguments.
#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Stored design ID.
    pub id: String,

    /// Output path.
    #[arg(long)]
    pub out: PathBuf,

    /// Write a ZIP bundle instead of JSON.
    #[arg(long)]
    pub zip: bool,

    /// Leave asset bytes out of the bundle.
    #[arg(long)]
    pub no_assets: bool,
}

/// `import` arguments.
#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Bundle files (JSON or ZIP).
    #[arg(required = true)]
    pub bundles: Vec<PathBuf>,

    /// Update this stored design instead of creating a new one.
    #[arg(long)]
    pub update: Option<String>,

    /// Update the design named by the bundle's own ID.
    #[arg(long, conflicts_with = "update")]
    pub update_existing: bool,

    /// What to do when an update is not newer than the stored design.
    #[arg(long, default_value = "skip")]
    pub strategy: VersionConflictStrategy,

    /// Author recorded on imported designs.
    #[arg(long)]
    pub author: Option<String>,

    /// Keep going after a failed bundle.
    #[arg(long)]
    pub continue_on_error: bool,
}

/// `versions` subcommands.
#[derive(Debug, Subcommand)]
pub enum VersionsCommand {
    /// List versions of a design, newest first.
    List {
        /// Design ID.
        design_id: String,
    },
    /// Restore a version as the live design.
    Restore {
        /// Version ID.
        version_id: String,
        /// User recorded on the restore version.
        #[arg(long)]
        user: Option<String>,
    },
    /// Delete the oldest versions beyond `--keep`.
    Cleanup {
        /// Design ID.
        design_id: String,
        /// Versions to keep.
        #[arg(long, default_value_t = 10)]
        keep: usize,
    },
    /// Summarize element changes between two versions.
    Diff {
        /// Older version ID.
        from: String,
        /// Newer version ID.
        to: String,
    },
}
