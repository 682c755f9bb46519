//! Interfaces to the host environment.
//!
//! The engine never reaches for globals: time, identifiers and asset bytes come
//! from these collaborators, passed in at construction. Each trait ships with a
//! production implementation and a deterministic one for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::sanitize::is_unsafe_path;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Source of opaque unique identifiers.
pub trait IdGenerator: Send + Sync {
    /// A new identifier, never returned before by this generator.
    fn new_id(&self) -> String;
}

/// Errors reported by asset collaborators.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Nothing is stored under the locator.
    #[error("Asset not found: {0}")]
    NotFound(String),
    /// The locator tries to escape the asset root.
    #[error("Unsafe asset locator: {0}")]
    Unsafe(String),
    /// The backing storage failed.
    #[error("Asset I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads asset bytes by locator (path, URL, attachment reference).
pub trait AssetResolver: Send + Sync {
    /// Fetch the bytes behind `locator`.
    ///
    /// # Errors
    ///
    /// Returns an [`AssetError`] when the asset cannot be produced.
    fn read(&self, locator: &str) -> Result<Vec<u8>, AssetError>;
}

/// Persists imported asset bytes and hands back the locator to reference them by.
pub trait AssetSink: Send + Sync {
    /// Store `bytes` under a name derived from `name`.
    ///
    /// # Errors
    ///
    /// Returns an [`AssetError`] when the asset cannot be written.
    fn store(&self, name: &str, bytes: &[u8], mime_type: &str) -> Result<String, AssetError>;

    /// Delete an asset previously returned by [`AssetSink::store`].
    ///
    /// # Errors
    ///
    /// Returns an [`AssetError`] when the asset cannot be deleted.
    fn remove(&self, locator: &str) -> Result<(), AssetError>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Start at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// `prefix-1`, `prefix-2`, ... for reproducible tests.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    /// Start counting at 1 with the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn new_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}

/// In-memory asset map; resolves and stores.
#[derive(Debug, Default)]
pub struct MemoryAssets {
    assets: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryAssets {
    /// An empty asset map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert bytes under an exact locator.
    pub fn insert(&self, locator: impl Into<String>, bytes: Vec<u8>) {
        self.assets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(locator.into(), bytes);
    }

    /// Number of stored assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assets
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether no assets are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AssetResolver for MemoryAssets {
    fn read(&self, locator: &str) -> Result<Vec<u8>, AssetError> {
        self.assets
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(locator)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(locator.to_string()))
    }
}

impl AssetSink for MemoryAssets {
    fn store(&self, name: &str, bytes: &[u8], _mime_type: &str) -> Result<String, AssetError> {
        let mut assets = self
            .assets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let locator = unique_name(name, |candidate| assets.contains_key(candidate));
        assets.insert(locator.clone(), bytes.to_vec());
        Ok(locator)
    }

    fn remove(&self, locator: &str) -> Result<(), AssetError> {
        self.assets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(locator)
            .map(|_| ())
            .ok_or_else(|| AssetError::NotFound(locator.to_string()))
    }
}

/// Assets stored as files under a root directory.
///
/// Locators are paths relative to the root; `file://` prefixes are accepted.
#[derive(Debug, Clone)]
pub struct FsAssets {
    root: PathBuf,
}

impl FsAssets {
    /// Serve and store assets under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The asset root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf, AssetError> {
        let relative = locator.strip_prefix("file://").unwrap_or(locator);
        if relative.is_empty() || is_unsafe_path(relative) {
            return Err(AssetError::Unsafe(locator.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl AssetResolver for FsAssets {
    fn read(&self, locator: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.resolve(locator)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(locator.to_string()))
            }
            Err(e) => Err(AssetError::Io(e)),
        }
    }
}

impl AssetSink for FsAssets {
    fn store(&self, name: &str, bytes: &[u8], _mime_type: &str) -> Result<String, AssetError> {
        let file_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AssetError::Unsafe(name.to_string()))?;
        let locator = unique_name(file_name, |candidate| self.root.join(candidate).exists());
        let path = self.resolve(&locator)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(locator)
    }

    fn remove(&self, locator: &str) -> Result<(), AssetError> {
        let path = self.resolve(locator)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(locator.to_string()))
            }
            Err(e) => Err(AssetError::Io(e)),
        }
    }
}

/// `name`, or `stem-2.ext`, `stem-3.ext`, ... until `taken` says no.
fn unique_name(name: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(name) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };
    (2..)
        .map(|n| format!("{stem}-{n}{ext}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new("design");
        assert_eq!(ids.new_id(), "design-1");
        assert_eq!(ids.new_id(), "design-2");
    }

    #[test]
    fn test_uuid_ids_are_unique() {
        let ids = UuidGenerator;
        assert_ne!(ids.new_id(), ids.new_id());
    }

    #[test]
    fn test_fixed_clock_advances() {
        let start = Utc::now();
        let clock = FixedClock::new(start);
        clock.advance(Duration::seconds(5));
        assert_eq!(clock.now(), start + Duration::seconds(5));
    }

    #[test]
    fn test_memory_assets_store_dedupes_names() {
        let assets = MemoryAssets::new();
        let a = assets.store("logo.png", b"a", "image/png").expect("store");
        let b = assets.store("logo.png", b"b", "image/png").expect("store");
        assert_eq!(a, "logo.png");
        assert_eq!(b, "logo-2.png");
        assert_eq!(assets.read("logo-2.png").expect("read"), b"b");
        assert!(matches!(assets.read("missing"), Err(AssetError::NotFound(_))));

        assets.remove("logo.png").expect("remove");
        assert_eq!(assets.len(), 1);
    }

    #[test]
    fn test_fs_assets_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let assets = FsAssets::new(dir.path());
        let locator = assets.store("nested/photo.jpg", b"jpeg", "image/jpeg").expect("store");
        assert_eq!(locator, "photo.jpg");
        assert_eq!(assets.read(&locator).expect("read"), b"jpeg");
        assert_eq!(assets.read("file://photo.jpg").expect("read"), b"jpeg");

        assets.remove(&locator).expect("remove");
        assert!(matches!(assets.read(&locator), Err(AssetError::NotFound(_))));
        assert!(matches!(assets.remove(&locator), Err(AssetError::NotFound(_))));
    }

    #[test]
    fn test_fs_assets_reject_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let assets = FsAssets::new(dir.path());
        assert!(matches!(
            assets.read("../secret.txt"),
            Err(AssetError::Unsafe(_))
        ));
        assert!(matches!(
            assets.read("nope.png"),
            Err(AssetError::NotFound(_))
        ));
    }
}
