//! Append-only version history.
//!
//! Each design ID owns its own log behind its own lock, so writers on
//! different designs never wait on each other. Within one design the log lock
//! is held across a whole `create_version` or `restore_version`, which makes
//! both look atomic to callers.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborator::{Clock, IdGenerator};
use crate::document::DesignDocument;
use crate::element::Element;
use crate::error::{DesignError, DesignResult};
use crate::store::DesignRepository;

/// Directory under the data dir holding one log file per design.
const VERSIONS_DIR: &str = "versions";

/// An immutable snapshot of a design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    /// Unique version ID.
    pub id: String,
    /// Design this version belongs to.
    pub design_id: String,
    /// The full document at snapshot time.
    pub data: DesignDocument,
    /// What produced this version.
    pub description: String,
    /// Who produced this version.
    #[serde(default)]
    pub user_id: Option<String>,
    /// When the version was recorded.
    pub created_at: DateTime<Utc>,
    /// Store-wide insertion counter; breaks `created_at` ties.
    pub sequence: u64,
}

/// Element-level summary of how two versions differ.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDiff {
    /// Elements present only in the newer side.
    pub added: usize,
    /// Elements present only in the older side.
    pub removed: usize,
    /// Elements present on both sides with different content.
    pub changed: usize,
    /// Whether canvas settings differ.
    pub settings_changed: bool,
}

impl VersionDiff {
    /// Whether the two versions are equivalent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.changed == 0 && !self.settings_changed
    }
}

type Log = Arc<Mutex<Vec<Version>>>;

/// Per-design version logs.
pub struct VersionStore {
    logs: RwLock<HashMap<String, Log>>,
    /// Version ID to design ID.
    index: RwLock<HashMap<String, String>>,
    sequence: AtomicU64,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    data_dir: Option<PathBuf>,
}

impl std::fmt::Debug for VersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionStore")
            .field("data_dir", &self.data_dir)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl VersionStore {
    /// An in-memory store.
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(1),
            clock,
            ids,
            data_dir: None,
        }
    }

    /// A store that mirrors every log to `data_dir/versions/<design>.json`.
    ///
    /// Call [`VersionStore::load_from_disk`] to pick up existing history.
    pub fn with_data_dir(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::new(clock, ids)
        }
    }

    /// The configured data directory, if any.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Append a snapshot of `data` to the design's history.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::InvalidValue`] for an empty design ID.
    pub fn create_version(
        &self,
        design_id: &str,
        data: DesignDocument,
        description: &str,
        user_id: Option<&str>,
    ) -> DesignResult<Version> {
        if design_id.trim().is_empty() {
            return Err(DesignError::invalid("designId", "must not be empty"));
        }
        let log = self.log_for(design_id);
        let mut entries = log.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let version = self.append(design_id, &mut entries, data, description, user_id);
        self.persist_log(design_id, &entries);
        Ok(version)
    }

    /// All versions of a design, newest first. Unknown designs have none.
    #[must_use]
    pub fn get_versions(&self, design_id: &str) -> Vec<Version> {
        let Some(log) = self.existing_log(design_id) else {
            return Vec::new();
        };
        let mut versions = log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        sort_newest_first(&mut versions);
        versions
    }

    /// The newest version of a design.
    #[must_use]
    pub fn latest_version(&self, design_id: &str) -> Option<Version> {
        self.get_versions(design_id).into_iter().next()
    }

    /// Look up one version.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::NotFound`] for unknown IDs.
    pub fn get_version(&self, version_id: &str) -> DesignResult<Version> {
        let design_id = self.design_of(version_id)?;
        self.existing_log(&design_id)
            .and_then(|log| {
                let entries = log.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                entries.iter().find(|v| v.id == version_id).cloned()
            })
            .ok_or_else(|| not_found(version_id))
    }

    /// Remove one version; the others keep their order.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::NotFound`] for unknown IDs.
    pub fn delete_version(&self, version_id: &str) -> DesignResult<Version> {
        let design_id = self.design_of(version_id)?;
        let log = self
            .existing_log(&design_id)
            .ok_or_else(|| not_found(version_id))?;
        let mut entries = log.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let position = entries
            .iter()
            .position(|v| v.id == version_id)
            .ok_or_else(|| not_found(version_id))?;
        let removed = entries.remove(position);
        self.index
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(version_id);
        self.persist_log(&design_id, &entries);
        tracing::debug!(version_id, design_id = %design_id, "deleted version");
        Ok(removed)
    }

    /// Number of versions of a design; unknown designs have zero.
    #[must_use]
    pub fn get_version_count(&self, design_id: &str) -> usize {
        self.existing_log(design_id).map_or(0, |log| {
            let entries = log.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            entries.len()
        })
    }

    /// Make a past version live again.
    ///
    /// Overwrites the live document through `repository`, then appends a new
    /// "restore" version carrying the same data. If the live write fails no
    /// version is appended.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::NotFound`] for an unknown version or design, or the
    /// repository's storage error.
    pub fn restore_version(
        &self,
        version_id: &str,
        user_id: Option<&str>,
        repository: &DesignRepository,
    ) -> DesignResult<Version> {
        let target = self.get_version(version_id)?;
        let log = self.log_for(&target.design_id);
        let mut entries = log.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        repository.replace_document(&target.design_id, target.data.clone())?;

        let description = format!("Restored from version {version_id}");
        let version = self.append(
            &target.design_id,
            &mut entries,
            target.data,
            &description,
            user_id,
        );
        self.persist_log(&target.design_id, &entries);
        tracing::info!(
            design_id = %version.design_id,
            restored_from = version_id,
            version_id = %version.id,
            "restored design version"
        );
        Ok(version)
    }

    /// Delete the oldest versions so at most `max_count` remain.
    ///
    /// The newest version always survives, even with `max_count == 0`.
    /// Returns how many versions were deleted.
    pub fn cleanup_old_revisions(&self, design_id: &str, max_count: usize) -> usize {
        let Some(log) = self.existing_log(design_id) else {
            return 0;
        };
        let keep = max_count.max(1);
        let mut entries = log.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.len() <= keep {
            return 0;
        }

        sort_newest_first(&mut entries);
        let pruned: Vec<Version> = entries.split_off(keep);
        // Logs are kept in insertion order.
        entries.reverse();
        {
            let mut index = self
                .index
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for version in &pruned {
                index.remove(&version.id);
            }
        }
        self.persist_log(design_id, &entries);
        tracing::debug!(design_id, deleted = pruned.len(), kept = keep, "pruned versions");
        pruned.len()
    }

    /// Summarize the differences between two versions (`from` → `to`).
    ///
    /// Elements are matched by `id` when present, otherwise by position.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::NotFound`] if either version is unknown.
    pub fn compare_versions(&self, from_id: &str, to_id: &str) -> DesignResult<VersionDiff> {
        let from = self.get_version(from_id)?;
        let to = self.get_version(to_id)?;
        Ok(diff_documents(&from.data, &to.data))
    }

    /// Load every log under `data_dir/versions`; returns the number of versions
    /// loaded. Unreadable files are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::Storage`] if the versions directory exists but
    /// cannot be listed.
    pub fn load_from_disk(&self) -> DesignResult<usize> {
        let Some(dir) = self.versions_dir() else {
            return Ok(0);
        };
        if !dir.exists() {
            return Ok(0);
        }

        let mut loaded = 0;
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let versions: Vec<Version> = match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
            {
                Ok(versions) => versions,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable version log");
                    continue;
                }
            };
            loaded += self.adopt(versions);
        }
        tracing::info!(loaded, dir = %dir.display(), "loaded version history");
        Ok(loaded)
    }

    fn adopt(&self, versions: Vec<Version>) -> usize {
        let count = versions.len();
        for version in versions {
            self.sequence
                .fetch_max(version.sequence.saturating_add(1), Ordering::SeqCst);
            self.index
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(version.id.clone(), version.design_id.clone());
            let log = self.log_for(&version.design_id);
            log.lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(version);
        }
        count
    }

    fn append(
        &self,
        design_id: &str,
        entries: &mut Vec<Version>,
        data: DesignDocument,
        description: &str,
        user_id: Option<&str>,
    ) -> Version {
        let version = Version {
            id: self.ids.new_id(),
            design_id: design_id.to_string(),
            data,
            description: description.to_string(),
            user_id: user_id.map(str::to_string),
            created_at: self.clock.now(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
        };
        self.index
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(version.id.clone(), design_id.to_string());
        entries.push(version.clone());
        tracing::debug!(
            design_id,
            version_id = %version.id,
            sequence = version.sequence,
            "created version"
        );
        version
    }

    fn design_of(&self, version_id: &str) -> DesignResult<String> {
        self.index
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(version_id)
            .cloned()
            .ok_or_else(|| not_found(version_id))
    }

    fn existing_log(&self, design_id: &str) -> Option<Log> {
        self.logs
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(design_id)
            .cloned()
    }

    fn log_for(&self, design_id: &str) -> Log {
        if let Some(log) = self.existing_log(design_id) {
            return log;
        }
        let mut logs = self
            .logs
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(logs.entry(design_id.to_string()).or_default())
    }

    fn versions_dir(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(VERSIONS_DIR))
    }

    /// Mirror one log to disk. Failures are logged, not returned: the
    /// in-memory history stays authoritative.
    fn persist_log(&self, design_id: &str, entries: &[Version]) {
        let Some(dir) = self.versions_dir() else {
            return;
        };
        let path = dir.join(format!("{}.json", log_file_stem(design_id)));
        let result = std::fs::create_dir_all(&dir)
            .map_err(|e| e.to_string())
            .and_then(|()| serde_json::to_string_pretty(entries).map_err(|e| e.to_string()))
            .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            tracing::warn!(design_id, path = %path.display(), error = %e, "failed to persist versions");
        }
    }
}

fn not_found(version_id: &str) -> DesignError {
    DesignError::NotFound(format!("version {version_id}"))
}

fn sort_newest_first(versions: &mut [Version]) {
    versions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.sequence.cmp(&a.sequence))
    });
}

/// File stem for a design's log: `[A-Za-z0-9-]` pass through, every other
/// byte (including `_`) becomes `_xx`. Distinct IDs never share a file.
fn log_file_stem(design_id: &str) -> String {
    let mut stem = String::with_capacity(design_id.len());
    for byte in design_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            let _ = write!(stem, "_{byte:02x}");
        }
    }
    stem
}

fn element_keys(elements: &[Element]) -> HashMap<String, &Element> {
    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let key = element
                .id
                .clone()
                .unwrap_or_else(|| format!("#{index}"));
            (key, element)
        })
        .collect()
}

fn diff_documents(from: &DesignDocument, to: &DesignDocument) -> VersionDiff {
    let before = element_keys(&from.elements);
    let after = element_keys(&to.elements);
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    let mut diff = VersionDiff {
        settings_changed: from.settings != to.settings,
        ..VersionDiff::default()
    };
    for key in keys {
        match (before.get(key), after.get(key)) {
            (None, Some(_)) => diff.added += 1,
            (Some(_), None) => diff.removed += 1,
            (Some(a), Some(b)) if a != b => diff.changed += 1,
            _ => {}
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::{FixedClock, SequentialIds};
    use crate::error::ErrorKind;
    use crate::store::{DesignRecord, MemoryDocumentStore};
    use chrono::Duration;

    fn store_with_clock() -> (VersionStore, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store = VersionStore::new(clock.clone(), Arc::new(SequentialIds::new("v")));
        (store, clock)
    }

    fn doc(width: f32) -> DesignDocument {
        DesignDocument::new(width, 100.0)
    }

    #[test]
    fn test_log_file_stems_are_distinct() {
        assert_eq!(log_file_stem("poster-1"), "poster-1");
        assert_eq!(log_file_stem("a_b"), "a_5fb");
        assert_eq!(log_file_stem("a/b"), "a_2fb");
        assert_ne!(log_file_stem("a_2fb"), log_file_stem("a/b"));
    }

    #[test]
    fn test_versions_newest_first() {
        let (store, clock) = store_with_clock();
        store.create_version("d1", doc(1.0), "first", None).expect("v1");
        clock.advance(Duration::seconds(1));
        store.create_version("d1", doc(2.0), "second", Some("7")).expect("v2");

        let versions = store.get_versions("d1");
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].description, "second");
        assert_eq!(versions[0].user_id.as_deref(), Some("7"));
        assert_eq!(versions[1].description, "first");
    }

    #[test]
    fn test_same_timestamp_breaks_ties_by_insertion() {
        let (store, _clock) = store_with_clock();
        for n in 0..5 {
            store
                .create_version("d1", doc(1.0), &format!("v{n}"), None)
                .expect("create");
        }
        let descriptions: Vec<_> = store
            .get_versions("d1")
            .into_iter()
            .map(|v| v.description)
            .collect();
        assert_eq!(descriptions, ["v4", "v3", "v2", "v1", "v0"]);
    }

    #[test]
    fn test_unknown_design_has_zero_versions() {
        let (store, _clock) = store_with_clock();
        assert_eq!(store.get_version_count("nope"), 0);
        assert!(store.get_versions("nope").is_empty());
        assert_eq!(store.cleanup_old_revisions("nope", 1), 0);
    }

    #[test]
    fn test_get_and_delete_version() {
        let (store, _clock) = store_with_clock();
        let a = store.create_version("d1", doc(1.0), "a", None).expect("a");
        let b = store.create_version("d1", doc(2.0), "b", None).expect("b");
        assert_eq!(store.get_version(&a.id).expect("get"), a);

        store.delete_version(&a.id).expect("delete");
        assert_eq!(store.get_version(&a.id).expect_err("gone").kind(), ErrorKind::NotFound);
        assert_eq!(store.delete_version(&a.id).expect_err("gone").kind(), ErrorKind::NotFound);
        assert_eq!(store.get_versions("d1"), vec![b]);
    }

    #[test]
    fn test_empty_design_id_rejected() {
        let (store, _clock) = store_with_clock();
        let err = store.create_version(" ", doc(1.0), "x", None).expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let (store, clock) = store_with_clock();
        for n in 0..10 {
            store
                .create_version("d1", doc(1.0), &format!("v{n}"), None)
                .expect("create");
            clock.advance(Duration::seconds(1));
        }
        assert_eq!(store.cleanup_old_revisions("d1", 5), 5);
        let remaining: Vec<_> = store
            .get_versions("d1")
            .into_iter()
            .map(|v| v.description)
            .collect();
        assert_eq!(remaining, ["v9", "v8", "v7", "v6", "v5"]);
        assert_eq!(store.cleanup_old_revisions("d1", 5), 0);
    }

    #[test]
    fn test_cleanup_never_deletes_latest() {
        let (store, _clock) = store_with_clock();
        store.create_version("d1", doc(1.0), "old", None).expect("old");
        let latest = store.create_version("d1", doc(2.0), "new", None).expect("new");
        assert_eq!(store.cleanup_old_revisions("d1", 0), 1);
        assert_eq!(store.get_versions("d1"), vec![latest]);
    }

    #[test]
    fn test_restore_rewrites_live_document() {
        let (store, _clock) = store_with_clock();
        let repo = DesignRepository::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(FixedClock::new(Utc::now())),
        );
        repo.save(&DesignRecord::new("d1", "Card", doc(1.0), Utc::now()))
            .expect("save");

        let original = store.create_version("d1", doc(1.0), "original", None).expect("v1");
        repo.replace_document("d1", doc(2.0)).expect("edit");
        store.create_version("d1", doc(2.0), "edit", None).expect("v2");

        let restored = store
            .restore_version(&original.id, Some("9"), &repo)
            .expect("restore");
        assert!(restored.description.contains("Restored"));
        assert_eq!(restored.data, original.data);
        assert_eq!(repo.load_document("d1").expect("load"), original.data);
        assert_eq!(store.get_version_count("d1"), 3);
        assert_eq!(store.latest_version("d1"), Some(restored));
    }

    #[test]
    fn test_failed_restore_appends_nothing() {
        let (store, _clock) = store_with_clock();
        let repo = DesignRepository::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(FixedClock::new(Utc::now())),
        );
        let v = store.create_version("ghost", doc(1.0), "v", None).expect("v");
        let err = store.restore_version(&v.id, None, &repo).expect_err("no live doc");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(store.get_version_count("ghost"), 1);
    }

    #[test]
    fn test_compare_versions() {
        let (store, _clock) = store_with_clock();
        let base = doc(100.0)
            .with_element(Element::text("a").with_id("a"))
            .with_element(Element::text("b").with_id("b"));
        let mut edited = base.clone();
        edited.elements.remove(0);
        edited.elements[0] = Element::text("B!").with_id("b");
        edited.elements.push(Element::text("c").with_id("c"));
        edited.settings.bleed = 5.0;

        let v1 = store.create_version("d1", base, "base", None).expect("v1");
        let v2 = store.create_version("d1", edited, "edit", None).expect("v2");
        let diff = store.compare_versions(&v1.id, &v2.id).expect("diff");
        assert_eq!(
            diff,
            VersionDiff {
                added: 1,
                removed: 1,
                changed: 1,
                settings_changed: true
            }
        );
        assert!(store.compare_versions(&v1.id, &v1.id).expect("same").is_empty());
    }

    #[test]
    fn test_concurrent_writers_on_different_designs() {
        let (store, _clock) = store_with_clock();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for n in 0..25 {
                        store
                            .create_version(&format!("design-{t}"), doc(1.0), &format!("{n}"), None)
                            .expect("create");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        for t in 0..8 {
            let versions = store.get_versions(&format!("design-{t}"));
            assert_eq!(versions.len(), 25);
            assert_eq!(versions[0].description, "24");
        }
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(FixedClock::new(Utc::now()));
        {
            let store = VersionStore::with_data_dir(
                clock.clone(),
                Arc::new(SequentialIds::new("a")),
                dir.path(),
            );
            store.create_version("d/1", doc(1.0), "one", None).expect("one");
            store.create_version("d/1", doc(2.0), "two", None).expect("two");
        }

        let store = VersionStore::with_data_dir(clock, Arc::new(SequentialIds::new("b")), dir.path());
        assert_eq!(store.load_from_disk().expect("load"), 2);
        assert_eq!(store.get_version_count("d/1"), 2);

        let next = store.create_version("d/1", doc(3.0), "three", None).expect("three");
        assert_eq!(next.sequence, 3);
        assert_eq!(store.get_versions("d/1")[0].description, "three");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c..d"), "a_b_c__d");
        assert_eq!(sanitize_filename("design-1_x"), "design-1_x");
    }
}
