//! Bundle wire format.
//!
//! A JSON bundle carries one design with inline base64 attachments:
//!
//! ```json
//! { "version": "1.0", "exportDate": "...",
//!   "design": { "id": "...", "title": "...", "status": "draft", "author": "...",
//!               "date": "...", "meta": { "_design_data": { ... } },
//!               "attachments": [ { "path": "...", "content": "<base64>", "mimeType": "image/png" } ] } }
//! ```
//!
//! A ZIP bundle holds `designs.json` (`{ version, exportDate, designs: [...] }`)
//! with attachment bytes stored as files under `assets/` instead of inline.

use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zip::write::SimpleFileOptions;

use crate::error::{BundleError, BundleResult};

/// Format version written into every bundle.
pub const BUNDLE_VERSION: &str = "1.0";

/// Meta key holding the design document.
pub const DESIGN_DATA_KEY: &str = "_design_data";

/// Manifest entry name inside a ZIP bundle.
pub const ZIP_MANIFEST: &str = "designs.json";

/// Directory holding attachment files inside a ZIP bundle.
pub const ZIP_ASSET_DIR: &str = "assets";

/// Single-design JSON bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    /// Bundle format version.
    pub version: String,
    /// When the bundle was produced.
    pub export_date: DateTime<Utc>,
    /// The exported design.
    pub design: BundledDesign,
}

/// Multi-design manifest stored as `designs.json` in a ZIP bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    /// Bundle format version.
    pub version: String,
    /// When the bundle was produced.
    pub export_date: DateTime<Utc>,
    /// Exported designs.
    pub designs: Vec<BundledDesign>,
}

/// One design inside a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundledDesign {
    /// Source design ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display title.
    pub title: String,
    /// Publication status.
    #[serde(default = "default_status")]
    pub status: String,
    /// Source author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Source creation date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    /// Host metadata; [`DESIGN_DATA_KEY`] holds the document.
    #[serde(default)]
    pub meta: Map<String, Value>,
    /// Referenced assets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

fn default_status() -> String {
    "draft".to_string()
}

/// An asset referenced by an image element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Locator as it appears in the design (`src`/`asset`).
    pub path: String,
    /// Base64 bytes; absent in ZIP bundles, where the file lives under
    /// `assets/<path>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// MIME type.
    #[serde(default = "default_mime")]
    pub mime_type: String,
}

fn default_mime() -> String {
    "application/octet-stream".to_string()
}

/// MIME type guessed from a locator's extension.
#[must_use]
pub fn mime_for_path(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Whether `bytes` start with a ZIP local-file or empty-archive signature.
#[must_use]
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06")
}

/// Write a ZIP bundle: the manifest plus one file per attachment.
///
/// `files` pairs an attachment path with its bytes; paths are stored under
/// [`ZIP_ASSET_DIR`].
///
/// # Errors
///
/// Returns [`BundleError::Encoding`] if the archive cannot be written.
pub fn write_zip(manifest: &BundleManifest, files: &[(String, Vec<u8>)]) -> BundleResult<Vec<u8>> {
    let encode = |e: &dyn std::fmt::Display| BundleError::Encoding(format!("ZIP write failed: {e}"));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));

    let json = serde_json::to_vec_pretty(manifest).map_err(|e| encode(&e))?;
    writer
        .start_file(ZIP_MANIFEST, options)
        .map_err(|e| encode(&e))?;
    writer.write_all(&json).map_err(|e| encode(&e))?;

    for (path, bytes) in files {
        writer
            .start_file(format!("{ZIP_ASSET_DIR}/{path}"), options)
            .map_err(|e| encode(&e))?;
        writer.write_all(bytes).map_err(|e| encode(&e))?;
    }

    let cursor = writer.finish().map_err(|e| encode(&e))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_defaults() {
        let attachment: Attachment =
            serde_json::from_value(serde_json::json!({"path": "a.png"})).expect("parse");
        assert_eq!(attachment.mime_type, "application/octet-stream");
        assert!(attachment.content.is_none());
    }

    #[test]
    fn test_mime_guess() {
        assert_eq!(mime_for_path("uploads/Photo.JPG"), "image/jpeg");
        assert_eq!(mime_for_path("noext"), "application/octet-stream");
    }

    #[test]
    fn test_written_zip_is_detected() {
        let manifest = BundleManifest {
            version: BUNDLE_VERSION.to_string(),
            export_date: Utc::now(),
            designs: Vec::new(),
        };
        let bytes = write_zip(&manifest, &[("a.png".to_string(), vec![1, 2, 3])]).expect("zip");
        assert!(is_zip(&bytes));
        assert!(!is_zip(b"{\"design\": {}}"));
    }
}
