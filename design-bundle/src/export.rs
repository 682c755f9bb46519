//! Bundle export.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use design_core::{AssetResolver, Clock, DesignRecord, DesignRepository, ElementKind};
use serde_json::Value;

use crate::bundle::{
    mime_for_path, write_zip, Attachment, BundleManifest, BundledDesign, ExportBundle,
    BUNDLE_VERSION, DESIGN_DATA_KEY,
};
use crate::error::{BundleError, BundleResult};
use crate::security::check_locator;

/// Export configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Embed the bytes of referenced assets.
    pub include_assets: bool,
    /// Pretty-print JSON output.
    pub pretty: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_assets: true,
            pretty: true,
        }
    }
}

/// Container written by [`Exporter::export_to_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Single-design JSON bundle.
    Json,
    /// ZIP bundle with `designs.json` and `assets/`.
    Zip,
}

/// Builds bundles from stored designs.
#[derive(Clone)]
pub struct Exporter {
    repository: DesignRepository,
    clock: Arc<dyn Clock>,
    resolver: Option<Arc<dyn AssetResolver>>,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("resolver", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}

impl Exporter {
    /// Exporter over `repository`; export dates come from the repository clock.
    #[must_use]
    pub fn new(repository: DesignRepository) -> Self {
        let clock = Arc::clone(repository.clock());
        Self {
            repository,
            clock,
            resolver: None,
        }
    }

    /// Read asset bytes through `resolver`.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn AssetResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Bundle one stored design with inline base64 attachments.
    ///
    /// Assets that cannot be read are left out of the bundle with a warning.
    ///
    /// # Errors
    ///
    /// Returns a [`BundleError::Design`] with kind `NotFound` for an unknown
    /// ID, or a storage error.
    pub fn export_design(&self, id: &str, options: &ExportOptions) -> BundleResult<ExportBundle> {
        let record = self.repository.load(id)?;
        let (design, files) = self.bundle_record(&record, options)?;
        let design = inline_attachments(design, &files);
        tracing::info!(design_id = %id, attachments = design.attachments.len(), "exported design");
        Ok(ExportBundle {
            version: BUNDLE_VERSION.to_string(),
            export_date: self.clock.now(),
            design,
        })
    }

    /// Serialize a bundle.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Encoding`] if serialization fails.
    pub fn to_json(bundle: &ExportBundle, options: &ExportOptions) -> BundleResult<String> {
        let result = if options.pretty {
            serde_json::to_string_pretty(bundle)
        } else {
            serde_json::to_string(bundle)
        };
        result.map_err(|e| BundleError::Encoding(format!("bundle JSON: {e}")))
    }

    /// One design as a ZIP bundle.
    ///
    /// # Errors
    ///
    /// As [`Exporter::batch_export`].
    pub fn export_zip(&self, id: &str, options: &ExportOptions) -> BundleResult<Vec<u8>> {
        self.batch_export(&[id], options)
    }

    /// Several designs as one ZIP bundle. Assets shared between designs are
    /// stored once.
    ///
    /// # Errors
    ///
    /// Fails on the first unknown ID or when the archive cannot be written.
    pub fn batch_export<S: AsRef<str>>(
        &self,
        ids: &[S],
        options: &ExportOptions,
    ) -> BundleResult<Vec<u8>> {
        let mut designs = Vec::with_capacity(ids.len());
        let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for id in ids {
            let record = self.repository.load(id.as_ref())?;
            let (design, design_files) = self.bundle_record(&record, options)?;
            files.extend(design_files);
            designs.push(design);
        }
        let manifest = BundleManifest {
            version: BUNDLE_VERSION.to_string(),
            export_date: self.clock.now(),
            designs,
        };
        let files: Vec<_> = files.into_iter().collect();
        let bytes = write_zip(&manifest, &files)?;
        tracing::info!(
            designs = manifest.designs.len(),
            assets = files.len(),
            bytes = bytes.len(),
            "exported ZIP bundle"
        );
        Ok(bytes)
    }

    /// Write a bundle to `path` atomically: a temporary file in the same
    /// directory is persisted over the target.
    ///
    /// # Errors
    ///
    /// As [`Exporter::export_design`] / [`Exporter::export_zip`], or
    /// [`BundleError::Io`] if the file cannot be written.
    pub fn export_to_path(
        &self,
        id: &str,
        path: &Path,
        format: ContainerFormat,
        options: &ExportOptions,
    ) -> BundleResult<()> {
        let bytes = match format {
            ContainerFormat::Json => {
                Self::to_json(&self.export_design(id, options)?, options)?.into_bytes()
            }
            ContainerFormat::Zip => self.export_zip(id, options)?,
        };
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| BundleError::Io(e.error))?;
        tracing::debug!(design_id = %id, path = %path.display(), "bundle written");
        Ok(())
    }

    /// Bundle metadata for a record plus the bytes of every readable asset.
    fn bundle_record(
        &self,
        record: &DesignRecord,
        options: &ExportOptions,
    ) -> BundleResult<(BundledDesign, BTreeMap<String, Vec<u8>>)> {
        let mut meta: serde_json::Map<String, Value> = record
            .meta
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        meta.insert(DESIGN_DATA_KEY.to_string(), record.data.to_value()?);

        let mut attachments = Vec::new();
        let mut files = BTreeMap::new();
        if options.include_assets {
            for locator in asset_locators(record) {
                if files.contains_key(&locator) {
                    continue;
                }
                if check_locator("attachment", &locator).is_err() {
                    tracing::warn!(design_id = %record.id, %locator, "unsafe asset locator not exported");
                    continue;
                }
                match self.read_asset(&locator) {
                    Ok(bytes) => {
                        attachments.push(Attachment {
                            mime_type: mime_for_path(&locator).to_string(),
                            path: locator.clone(),
                            content: None,
                        });
                        files.insert(locator, bytes);
                    }
                    Err(err) => {
                        tracing::warn!(design_id = %record.id, %locator, error = %err, "asset not exported");
                    }
                }
            }
        }

        let design = BundledDesign {
            id: Some(record.id.clone()),
            title: record.title.clone(),
            status: record.status.clone(),
            author: record.author_id.clone(),
            date: Some(record.created_at),
            meta,
            attachments,
        };
        Ok((design, files))
    }

    fn read_asset(&self, locator: &str) -> BundleResult<Vec<u8>> {
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| BundleError::Asset("no asset resolver configured".to_string()))?;
        resolver
            .read(locator)
            .map_err(|e| BundleError::Asset(e.to_string()))
    }
}

/// Locators of image assets stored alongside the design (not URLs or data URIs).
fn asset_locators(record: &DesignRecord) -> Vec<String> {
    record
        .data
        .elements
        .iter()
        .filter_map(|element| match &element.kind {
            ElementKind::Image(spec) => spec.locator(),
            _ => None,
        })
        .filter(|locator| {
            let lower = locator.to_ascii_lowercase();
            !(lower.starts_with("data:")
                || lower.starts_with("http://")
                || lower.starts_with("https://"))
        })
        .map(str::to_string)
        .collect()
}

fn inline_attachments(mut design: BundledDesign, files: &BTreeMap<String, Vec<u8>>) -> BundledDesign {
    for attachment in &mut design.attachments {
        attachment.content = files
            .get(&attachment.path)
            .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes));
    }
    design
}
