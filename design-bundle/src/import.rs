//! Bundle import.
//!
//! Every design in a bundle is fully checked before anything is written:
//!
//! 1. size limit
//! 2. container detection (ZIP signature, else JSON)
//! 3. required fields
//! 4. security screening
//! 5. document validation under the memory ceiling
//! 6. attachment decoding
//!
//! Only then are assets stored, the record written and a version recorded.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use design_core::{
    compare_version_strings, AssetSink, Clock, DesignDocument, DesignRecord, DesignRepository,
    ElementKind, ErrorKind, IdGenerator, ValidationLimits, VersionStore,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::TempDir;

use crate::bundle::{
    is_zip, mime_for_path, BundledDesign, DESIGN_DATA_KEY, ZIP_ASSET_DIR, ZIP_MANIFEST,
};
use crate::error::{BundleError, BundleResult};
use crate::security::{check_locator, scan};

/// Default maximum bundle size (10 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum ratio of extracted bytes to the bundle size limit.
const MAX_EXPANSION: u64 = 20;

/// Suffix appended to the title of a duplicate import.
pub const IMPORTED_SUFFIX: &str = " (Imported)";

/// Where bundle bytes come from.
#[derive(Debug, Clone)]
pub enum ImportSource {
    /// JSON text.
    Json(String),
    /// Raw bytes, JSON or ZIP.
    Bytes(Vec<u8>),
    /// A file on disk, JSON or ZIP.
    Path(PathBuf),
}

impl ImportSource {
    /// Read the source, enforcing `limit` before loading files.
    fn read(self, limit: u64) -> BundleResult<Vec<u8>> {
        let bytes = match self {
            Self::Json(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
            Self::Path(path) => {
                let size = fs::metadata(&path)?.len();
                if size > limit {
                    return Err(BundleError::FileTooLarge { size, limit });
                }
                fs::read(&path)?
            }
        };
        let size = bytes.len() as u64;
        if size > limit {
            return Err(BundleError::FileTooLarge { size, limit });
        }
        Ok(bytes)
    }
}

impl fmt::Display for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(text) => write!(f, "<json {} bytes>", text.len()),
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// What to do when an update is not newer than the stored design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionConflictStrategy {
    /// Reject with a version conflict.
    #[default]
    Skip,
    /// Apply anyway.
    Override,
}

impl FromStr for VersionConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "override" => Ok(Self::Override),
            other => Err(format!("unknown strategy '{other}' (expected skip or override)")),
        }
    }
}

/// Import configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Update the existing design instead of creating a new one.
    pub update_existing: bool,
    /// Design to update; defaults to the bundle's source ID.
    pub target_id: Option<String>,
    /// Conflict handling for updates.
    pub version_conflict_strategy: VersionConflictStrategy,
    /// Author recorded on the record and version; defaults to the bundle's.
    pub author_id: Option<String>,
    /// Maximum bundle size in bytes.
    pub max_file_size: u64,
    /// Ceiling on the estimated parsed size of each design.
    pub memory_limit: Option<usize>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            update_existing: false,
            target_id: None,
            version_conflict_strategy: VersionConflictStrategy::Skip,
            author_id: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            memory_limit: None,
        }
    }
}

/// Result of importing one design.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    /// ID the design was stored under.
    pub design_id: String,
    /// Stored title.
    pub title: String,
    /// Stored document, asset locators rewritten.
    pub data: DesignDocument,
    /// `false` when an existing design was updated.
    pub created: bool,
    /// Attachments written through the asset sink.
    pub assets_restored: usize,
    /// Version recorded for the import.
    pub version_id: String,
}

/// One failed source in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    /// Position in the source list.
    pub index: usize,
    /// Source description.
    pub source: String,
    /// Failure kind.
    pub kind: ErrorKind,
    /// Human-readable cause.
    pub message: String,
}

/// Outcome of [`Importer::batch_import`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchImportReport {
    /// Successful imports in source order.
    pub imported: Vec<ImportOutcome>,
    /// Failed sources.
    pub failed: Vec<BatchFailure>,
    /// Sources not attempted after a failure.
    pub skipped: usize,
}

/// A design that passed every check, ready to write.
struct PreparedDesign {
    source_id: Option<String>,
    title: String,
    status: String,
    author: Option<String>,
    meta: Map<String, Value>,
    data: DesignDocument,
    attachments: Vec<DecodedAttachment>,
}

struct DecodedAttachment {
    path: String,
    mime_type: String,
    bytes: Vec<u8>,
}

/// Imports bundles into a repository and records versions.
#[derive(Clone)]
pub struct Importer {
    repository: DesignRepository,
    versions: Arc<VersionStore>,
    ids: Arc<dyn IdGenerator>,
    sink: Option<Arc<dyn AssetSink>>,
}

impl fmt::Debug for Importer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Importer")
            .field("sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl Importer {
    /// Importer writing to `repository` and `versions`; new design IDs come
    /// from `ids`.
    #[must_use]
    pub fn new(
        repository: DesignRepository,
        versions: Arc<VersionStore>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            repository,
            versions,
            ids,
            sink: None,
        }
    }

    /// Restore attachments through `sink`. Without one, attachments are
    /// ignored and locators left as-is.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AssetSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Import the first design of a bundle.
    ///
    /// # Errors
    ///
    /// - [`BundleError::FileTooLarge`] before anything is parsed.
    /// - [`BundleError::InvalidBundle`] for unreadable containers.
    /// - [`BundleError::MissingField`] for absent title, design data,
    ///   `elements` or `settings`.
    /// - [`BundleError::SecurityViolation`] for script-like content or unsafe
    ///   paths.
    /// - [`BundleError::VersionConflict`] when updating with
    ///   [`VersionConflictStrategy::Skip`] and the bundle is not newer.
    /// - [`BundleError::Design`] for document validation failures (including
    ///   the memory ceiling) and storage errors.
    ///
    /// Nothing is written when any check fails.
    pub fn import_design(
        &self,
        source: ImportSource,
        options: &ImportOptions,
    ) -> BundleResult<ImportOutcome> {
        let mut designs = prepare(source, options)?;
        if designs.len() > 1 {
            tracing::warn!(
                designs = designs.len(),
                "bundle holds several designs, importing the first"
            );
        }
        let design = designs
            .drain(..)
            .next()
            .ok_or_else(|| BundleError::MissingField("designs".to_string()))?;
        self.apply(design, options)
    }

    /// Import every design of a bundle. All designs are checked before the
    /// first is written.
    ///
    /// # Errors
    ///
    /// As [`Importer::import_design`]; the first write failure aborts the
    /// remaining designs.
    pub fn import_all(
        &self,
        source: ImportSource,
        options: &ImportOptions,
    ) -> BundleResult<Vec<ImportOutcome>> {
        prepare(source, options)?
            .into_iter()
            .map(|design| self.apply(design, options))
            .collect()
    }

    /// Import several sources. Never fails as a whole: failures are reported
    /// per source. Without `continue_on_error` the first failure stops the
    /// batch and the rest are counted as skipped.
    #[must_use]
    pub fn batch_import(
        &self,
        sources: Vec<ImportSource>,
        options: &ImportOptions,
        continue_on_error: bool,
    ) -> BatchImportReport {
        let mut report = BatchImportReport::default();
        let total = sources.len();
        for (index, source) in sources.into_iter().enumerate() {
            let label = source.to_string();
            match self.import_design(source, options) {
                Ok(outcome) => report.imported.push(outcome),
                Err(err) => {
                    tracing::warn!(index, source = %label, error = %err, "batch import entry failed");
                    report.failed.push(BatchFailure {
                        index,
                        source: label,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                    if !continue_on_error {
                        report.skipped = total - index - 1;
                        break;
                    }
                }
            }
        }
        tracing::info!(
            imported = report.imported.len(),
            failed = report.failed.len(),
            skipped = report.skipped,
            "batch import finished"
        );
        report
    }

    fn apply(&self, design: PreparedDesign, options: &ImportOptions) -> BundleResult<ImportOutcome> {
        let author = options.author_id.clone().or_else(|| design.author.clone());
        let update_target = if options.update_existing {
            options
                .target_id
                .clone()
                .or_else(|| design.source_id.clone())
        } else {
            None
        };

        if let Some(id) = &update_target {
            if self.repository.exists(id)? {
                return self.update(id, design, options, author.as_deref());
            }
        }

        let duplicate = match &design.source_id {
            Some(source_id) if update_target.is_none() => self.repository.exists(source_id)?,
            _ => false,
        };
        let design_id = update_target.unwrap_or_else(|| self.ids.new_id());
        let title = if duplicate {
            format!("{}{IMPORTED_SUFFIX}", design.title)
        } else {
            design.title.clone()
        };

        let mut data = design.data;
        let stored_assets = self.restore_assets(&mut data, &design.attachments)?;

        let mut record = DesignRecord::new(&design_id, &title, data, self.repository.clock().now());
        record.status = design.status;
        record.author_id.clone_from(&author);
        record.meta = design.meta.into_iter().collect();
        if let Err(e) = self.repository.save(&record) {
            self.discard_assets(&stored_assets);
            return Err(e.into());
        }
        let assets_restored = stored_assets.len();

        let version = self.versions.create_version(
            &design_id,
            record.data.clone(),
            "Imported from bundle",
            author.as_deref(),
        )?;
        tracing::info!(design_id = %design_id, %title, assets_restored, "imported design");
        Ok(ImportOutcome {
            design_id,
            title,
            data: record.data,
            created: true,
            assets_restored,
            version_id: version.id,
        })
    }

    fn update(
        &self,
        id: &str,
        design: PreparedDesign,
        options: &ImportOptions,
        author: Option<&str>,
    ) -> BundleResult<ImportOutcome> {
        let mut record = self.repository.load(id)?;
        let incoming = design.data.version.clone();
        let stored = record.data.version.clone();
        if options.version_conflict_strategy == VersionConflictStrategy::Skip
            && compare_version_strings(&incoming, &stored) != Ordering::Greater
        {
            return Err(BundleError::VersionConflict { incoming, stored });
        }

        let mut data = design.data;
        let stored_assets = self.restore_assets(&mut data, &design.attachments)?;
        record.data = data;
        record.modified_at = self.repository.clock().now();
        if let Err(e) = self.repository.save(&record) {
            self.discard_assets(&stored_assets);
            return Err(e.into());
        }
        let assets_restored = stored_assets.len();

        let version =
            self.versions
                .create_version(id, record.data.clone(), "Updated from import", author)?;
        tracing::info!(design_id = %id, %incoming, %stored, "updated design from bundle");
        Ok(ImportOutcome {
            design_id: id.to_string(),
            title: record.title,
            data: record.data,
            created: false,
            assets_restored,
            version_id: version.id,
        })
    }

    /// Store attachments and point matching image locators at the new
    /// locations. Returns the stored locators. If any attachment fails, the
    /// ones already stored are removed again.
    fn restore_assets(
        &self,
        data: &mut DesignDocument,
        attachments: &[DecodedAttachment],
    ) -> BundleResult<Vec<String>> {
        let Some(sink) = &self.sink else {
            if !attachments.is_empty() {
                tracing::debug!(count = attachments.len(), "no asset sink, attachments ignored");
            }
            return Ok(Vec::new());
        };
        let mut stored = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let name = Path::new(&attachment.path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(&attachment.path);
            match sink.store(name, &attachment.bytes, &attachment.mime_type) {
                Ok(locator) => stored.push(locator),
                Err(e) => {
                    self.discard_assets(&stored);
                    return Err(BundleError::Asset(format!("{}: {e}", attachment.path)));
                }
            }
        }

        for (attachment, locator) in attachments.iter().zip(&stored) {
            for element in &mut data.elements {
                if let ElementKind::Image(spec) = &mut element.kind {
                    for field in [&mut spec.src, &mut spec.asset] {
                        if field.as_deref() == Some(attachment.path.as_str()) {
                            *field = Some(locator.clone());
                        }
                    }
                }
            }
        }
        Ok(stored)
    }

    /// Best-effort removal of assets stored for an import that did not land.
    fn discard_assets(&self, locators: &[String]) {
        let Some(sink) = &self.sink else {
            return;
        };
        for locator in locators {
            if let Err(e) = sink.remove(locator) {
                tracing::warn!(%locator, error = %e, "failed to remove orphaned asset");
            }
        }
        if !locators.is_empty() {
            tracing::debug!(count = locators.len(), "rolled back imported assets");
        }
    }
}

/// Read and check every design in the source.
fn prepare(source: ImportSource, options: &ImportOptions) -> BundleResult<Vec<PreparedDesign>> {
    let bytes = source.read(options.max_file_size)?;
    if is_zip(&bytes) {
        let extracted = extract_zip(&bytes, options.max_file_size)?;
        let assets_root = extracted.path().join(ZIP_ASSET_DIR);
        let raw = fs::read(extracted.path().join(ZIP_MANIFEST))
            .map_err(|_| BundleError::MissingField(ZIP_MANIFEST.to_string()))?;
        let root = parse_json(&raw)?;
        // `extracted` is removed when it drops at the end of this block.
        prepare_all(&root, options, &|path| read_extracted(&assets_root, path))
    } else {
        let root = parse_json(&bytes)?;
        prepare_all(&root, options, &|path| {
            Err(BundleError::MissingField(format!("attachment content for {path}")))
        })
    }
}

fn parse_json(bytes: &[u8]) -> BundleResult<Value> {
    serde_json::from_slice(bytes).map_err(|e| BundleError::InvalidBundle(format!("malformed JSON: {e}")))
}

/// Check every design in a bundle root; `load_file` supplies attachment bytes
/// that are not inline.
fn prepare_all(
    root: &Value,
    options: &ImportOptions,
    load_file: &dyn Fn(&str) -> BundleResult<Vec<u8>>,
) -> BundleResult<Vec<PreparedDesign>> {
    let designs: Vec<&Value> = match (root.get("design"), root.get("designs")) {
        (Some(design), _) => vec![design],
        (None, Some(Value::Array(designs))) => designs.iter().collect(),
        _ => return Err(BundleError::MissingField("design".to_string())),
    };

    let data = designs
        .iter()
        .enumerate()
        .map(|(i, design)| required_fields(i, design))
        .collect::<BundleResult<Vec<_>>>()?;

    scan(root)?;
    // Design data stored as a JSON string escapes the tree scan.
    for value in &data {
        scan(value)?;
    }

    let limits = ValidationLimits {
        memory_limit: options.memory_limit,
        ..ValidationLimits::default()
    };
    designs
        .into_iter()
        .zip(data)
        .map(|(raw, data)| {
            let mut bundled: BundledDesign = serde_json::from_value(raw.clone())
                .map_err(|e| BundleError::InvalidBundle(format!("design: {e}")))?;
            bundled.meta.remove(DESIGN_DATA_KEY);
            let document = DesignDocument::from_value_with(data, &limits)?;
            let attachments = bundled
                .attachments
                .iter()
                .filter_map(|attachment| decode_attachment(attachment, load_file).transpose())
                .collect::<BundleResult<Vec<_>>>()?;
            Ok(PreparedDesign {
                source_id: bundled.id,
                title: bundled.title,
                status: bundled.status,
                author: bundled.author,
                meta: bundled.meta,
                data: document,
                attachments,
            })
        })
        .collect()
}

/// Title, design data, `elements` and `settings` of one design; returns the
/// design data as a JSON tree.
fn required_fields(index: usize, design: &Value) -> BundleResult<Value> {
    let field = |name: &str| BundleError::MissingField(format!("designs[{index}].{name}"));
    if !design
        .get("title")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.trim().is_empty())
    {
        return Err(field("title"));
    }
    let raw = design
        .get("meta")
        .and_then(|meta| meta.get(DESIGN_DATA_KEY))
        .ok_or_else(|| field(&format!("meta.{DESIGN_DATA_KEY}")))?;
    // Hosts that store post meta as text keep the document as a JSON string.
    let data = match raw {
        Value::String(text) => serde_json::from_str(text)
            .map_err(|e| BundleError::InvalidBundle(format!("design data: {e}")))?,
        other => other.clone(),
    };
    for key in ["elements", "settings"] {
        if data.get(key).is_none() {
            return Err(field(&format!("meta.{DESIGN_DATA_KEY}.{key}")));
        }
    }
    Ok(data)
}

/// Decode one attachment; `None` when its bytes are unavailable.
fn decode_attachment(
    attachment: &crate::bundle::Attachment,
    load_file: &dyn Fn(&str) -> BundleResult<Vec<u8>>,
) -> BundleResult<Option<DecodedAttachment>> {
    check_locator("attachments.path", &attachment.path)?;
    let bytes = match &attachment.content {
        Some(content) => base64::engine::general_purpose::STANDARD
            .decode(content.trim())
            .map_err(|e| BundleError::InvalidBundle(format!("attachment {}: {e}", attachment.path)))?,
        None => match load_file(&attachment.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %attachment.path, error = %err, "attachment bytes missing");
                return Ok(None);
            }
        },
    };
    let mime_type = if attachment.mime_type == "application/octet-stream" {
        mime_for_path(&attachment.path).to_string()
    } else {
        attachment.mime_type.clone()
    };
    Ok(Some(DecodedAttachment {
        path: attachment.path.clone(),
        mime_type,
        bytes,
    }))
}

/// Extract a ZIP bundle into a fresh temporary directory.
fn extract_zip(bytes: &[u8], max_file_size: u64) -> BundleResult<TempDir> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let dir = tempfile::tempdir()?;
    let budget = max_file_size.saturating_mul(MAX_EXPANSION);
    let mut extracted = 0u64;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let Some(relative) = entry.enclosed_name() else {
            return Err(BundleError::security(name, "archive entry escapes the bundle"));
        };
        let target = dir.path().join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let remaining = budget - extracted;
        let mut out = fs::File::create(&target)?;
        let copied = std::io::copy(&mut entry.by_ref().take(remaining + 1), &mut out)?;
        if copied > remaining {
            return Err(BundleError::ResourceExceeded(format!(
                "archive expands beyond {budget} bytes"
            )));
        }
        extracted += copied;
    }
    tracing::debug!(entries = archive.len(), bytes = extracted, "ZIP bundle extracted");
    Ok(dir)
}

fn read_extracted(assets_root: &Path, path: &str) -> BundleResult<Vec<u8>> {
    check_locator("attachments.path", path)?;
    Ok(fs::read(assets_root.join(path))?)
}
