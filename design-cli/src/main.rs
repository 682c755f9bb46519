//! # designctl
//!
//! Command-line front end for the design workspace: validates and renders
//! design documents, and manages a file-backed store of designs with version
//! history and bundle import/export.
//!
//! ```text
//! <store-dir>/
//! ├── designs/    one JSON record per design
//! └── versions/   one version log per design
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::Parser;
use design_bundle::{
    ContainerFormat, ExportOptions, Exporter, ImportOptions, ImportSource, Importer,
};
use design_core::{
    Clock, DesignDocument, DesignRepository, FileDocumentStore, FsAssets, SystemClock,
    UuidGenerator, ValidationLimits, VersionStore,
};
use design_renderer::{Compositor, FontCatalog, OutputFormat, RenderOptions, Watermark};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Command, ExportArgs, ImportArgs, RenderArgs, VersionsCommand};

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels
/// (default: `info,design_core=debug,design_renderer=debug,design_bundle=debug`).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,design_core=debug,design_renderer=debug,design_bundle=debug")
    });

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    tracing::debug!(store_dir = %cli.store_dir.display(), "designctl starting");

    match &cli.command {
        Command::Validate { file } => cmd_validate(file, &limits(&cli)),
        Command::Render(args) => cmd_render(args, &cli),
        Command::Export(args) => cmd_export(&Workspace::open(&cli)?, args),
        Command::Import(args) => cmd_import(&Workspace::open(&cli)?, args, &cli),
        Command::Versions(command) => cmd_versions(&Workspace::open(&cli)?, command),
    }
}

fn limits(cli: &Cli) -> ValidationLimits {
    ValidationLimits {
        memory_limit: cli.memory_limit,
        ..ValidationLimits::default()
    }
}

/// The file-backed store behind the stateful commands.
struct Workspace {
    repository: DesignRepository,
    versions: Arc<VersionStore>,
    assets: Option<Arc<FsAssets>>,
}

impl Workspace {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&cli.store_dir)
            .with_context(|| format!("creating store directory {}", cli.store_dir.display()))?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = FileDocumentStore::open(cli.store_dir.join("designs"))
            .context("opening document store")?;
        let repository = DesignRepository::new(Arc::new(store), clock.clone());

        let versions = VersionStore::with_data_dir(clock, Arc::new(UuidGenerator), &cli.store_dir);
        let loaded = versions.load_from_disk().context("loading version history")?;
        tracing::debug!(versions = loaded, "version history loaded");

        Ok(Self {
            repository,
            versions: Arc::new(versions),
            assets: cli.asset_root.as_ref().map(|root| Arc::new(FsAssets::new(root))),
        })
    }
}

fn read_design(path: &Path, limits: &ValidationLimits) -> anyhow::Result<DesignDocument> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    DesignDocument::parse_with(&raw, limits).with_context(|| format!("invalid design {}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// validate / render
// ============================================================================

fn cmd_validate(file: &Path, limits: &ValidationLimits) -> anyhow::Result<()> {
    let doc = read_design(file, limits)?;
    print_json(&serde_json::json!({
        "valid": true,
        "version": doc.version,
        "width": doc.settings.width,
        "height": doc.settings.height,
        "elements": doc.elements.len(),
    }))
}

fn render_options(args: &RenderArgs, first: &Path) -> RenderOptions {
    let mut options = RenderOptions::new(args.format);
    options.scale = args.scale;
    options.width = args.width;
    options.height = args.height;
    options.include_bleed = args.bleed;
    options.crop_marks = args.crop_marks;
    options.safe_zone_guides = args.safe_zone;
    options.watermark = args.watermark.as_ref().map(Watermark::new);
    options.quality = args.quality;
    options.dpi = args.dpi;
    options.pdf.title = args.title.clone().unwrap_or_else(|| {
        first
            .file_stem()
            .map_or_else(|| options.pdf.title.clone(), |stem| stem.to_string_lossy().into_owned())
    });
    options
}

fn cmd_render(args: &RenderArgs, cli: &Cli) -> anyhow::Result<()> {
    let Some(first) = args.files.first() else {
        bail!("no design files given");
    };
    if args.files.len() > 1 && args.format != OutputFormat::Pdf {
        bail!("rendering several designs needs --format pdf");
    }

    let limits = limits(cli);
    let docs = args
        .files
        .iter()
        .map(|path| read_design(path, &limits))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let compositor = if args.no_system_fonts {
        Compositor::new(Arc::new(FontCatalog::empty()))
    } else {
        Compositor::with_system_fonts()
    };
    // Relative image paths resolve against the first design's directory
    // unless an asset root is configured.
    let asset_root: PathBuf = cli.asset_root.clone().unwrap_or_else(|| {
        first
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    });
    let compositor = compositor.with_resolver(Arc::new(FsAssets::new(asset_root)));

    let options = render_options(args, first);
    let output = if docs.len() > 1 {
        compositor.render_pdf_pages(&docs, &options)?
    } else {
        compositor.render(&docs[0], &options)?
    };

    std::fs::write(&args.out, &output.bytes)
        .with_context(|| format!("writing {}", args.out.display()))?;
    tracing::info!(
        out = %args.out.display(),
        format = %output.format,
        width = output.width,
        height = output.height,
        diagnostics = output.diagnostics.len(),
        "rendered"
    );
    print_json(&output)
}

// ============================================================================
// export / import
// ============================================================================

fn cmd_export(workspace: &Workspace, args: &ExportArgs) -> anyhow::Result<()> {
    let mut exporter = Exporter::new(workspace.repository.clone());
    if let Some(assets) = &workspace.assets {
        exporter = exporter.with_resolver(assets.clone());
    }
    let options = ExportOptions {
        include_assets: !args.no_assets,
        ..ExportOptions::default()
    };
    let zip_extension = args
        .out
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    let container = if args.zip || zip_extension {
        ContainerFormat::Zip
    } else {
        ContainerFormat::Json
    };

    exporter.export_to_path(&args.id, &args.out, container, &options)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_import(workspace: &Workspace, args: &ImportArgs, cli: &Cli) -> anyhow::Result<()> {
    let mut importer = Importer::new(
        workspace.repository.clone(),
        workspace.versions.clone(),
        Arc::new(UuidGenerator),
    );
    if let Some(assets) = &workspace.assets {
        importer = importer.with_sink(assets.clone());
    }
    let options = ImportOptions {
        update_existing: args.update_existing || args.update.is_some(),
        target_id: args.update.clone(),
        version_conflict_strategy: args.strategy,
        author_id: args.author.clone(),
        max_file_size: cli.max_file_size,
        memory_limit: cli.memory_limit,
    };

    // A single bundle imports every design it carries; several bundles
    // import one design each with per-bundle failure isolation.
    if let [bundle] = args.bundles.as_slice() {
        let outcomes = importer.import_all(ImportSource::Path(bundle.clone()), &options)?;
        return print_json(&outcomes);
    }

    let sources = args.bundles.iter().cloned().map(ImportSource::Path).collect();
    let report = importer.batch_import(sources, &options, args.continue_on_error);
    print_json(&report)?;
    if !report.failed.is_empty() {
        bail!(
            "{} of {} bundles failed to import",
            report.failed.len(),
            args.bundles.len()
        );
    }
    Ok(())
}

// ============================================================================
// versions
// ============================================================================

fn cmd_versions(workspace: &Workspace, command: &VersionsCommand) -> anyhow::Result<()> {
    match command {
        VersionsCommand::List { design_id } => {
            for version in workspace.versions.get_versions(design_id) {
                println!(
                    "{}\t{}\t{}\t{}",
                    version.id,
                    version.created_at.to_rfc3339(),
                    version.user_id.as_deref().unwrap_or("-"),
                    version.description
                );
            }
            Ok(())
        }
        VersionsCommand::Restore { version_id, user } => {
            let version =
                workspace
                    .versions
                    .restore_version(version_id, user.as_deref(), &workspace.repository)?;
            eprintln!("restored {} as version {}", version.design_id, version.id);
            Ok(())
        }
        VersionsCommand::Cleanup { design_id, keep } => {
            let deleted = workspace.versions.cleanup_old_revisions(design_id, *keep);
            eprintln!("deleted {deleted} versions of {design_id}");
            Ok(())
        }
        VersionsCommand::Diff { from, to } => {
            print_json(&workspace.versions.compare_versions(from, to)?)
        }
    }
}
