//! Document storage.
//!
//! [`DocumentStore`] is the key-value collaborator that owns the live design
//! JSON, keyed by opaque design ID. [`MemoryDocumentStore`] and
//! [`FileDocumentStore`] are the bundled implementations; [`DesignRepository`]
//! layers typed [`DesignRecord`] access on top of any store.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collaborator::Clock;
use crate::document::DesignDocument;
use crate::error::{DesignError, DesignResult};

/// Maximum length for design IDs accepted by the file store.
pub const MAX_DESIGN_ID_LEN: usize = 64;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The ID cannot be used as a storage key.
    #[error("Invalid design id: {0}")]
    InvalidId(String),
    /// An I/O error occurred during persistence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for DesignError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidId(id) => DesignError::invalid("id", format!("'{id}' is not a valid design id")),
            other => DesignError::Storage(other.to_string()),
        }
    }
}

/// Key-value storage of raw design JSON.
///
/// Implementations must make `put` a single write from the caller's point of view.
pub trait DocumentStore: Send + Sync {
    /// Raw JSON stored under `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing storage fails.
    fn get(&self, id: &str) -> Result<Option<String>, StoreError>;

    /// Store `raw` under `id`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing storage fails.
    fn put(&self, id: &str, raw: &str) -> Result<(), StoreError>;

    /// Remove `id`; returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing storage fails.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// All stored IDs.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing storage fails.
    fn ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Thread-safe in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryDocumentStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(&self, id: &str) -> Result<Option<String>, StoreError> {
        let documents = self
            .documents
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(documents.get(id).cloned())
    }

    fn put(&self, id: &str, raw: &str) -> Result<(), StoreError> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        documents.insert(id.to_string(), raw.to_string());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(documents.remove(id).is_some())
    }

    fn ids(&self) -> Result<Vec<String>, StoreError> {
        let documents = self
            .documents
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut ids: Vec<_> = documents.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Store that keeps one `<id>.json` file per design in a data directory.
///
/// IDs are restricted to 1-64 alphanumeric, `-` or `_` characters so they map
/// one-to-one onto file names.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    data_dir: PathBuf,
}

impl FileDocumentStore {
    /// Open a store rooted at `data_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_design_id(id)?;
        Ok(self.data_dir.join(format!("{id}.json")))
    }
}

impl DocumentStore for FileDocumentStore {
    fn get(&self, id: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(id)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, id: &str, raw: &str) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        // Write beside the target and rename so readers never see a torn file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let path = self.path_for(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Validate a design ID for use as a storage key.
///
/// # Errors
///
/// Returns [`StoreError::InvalidId`] if the ID is empty, longer than
/// [`MAX_DESIGN_ID_LEN`], or contains characters other than alphanumerics,
/// `-` and `_`.
pub fn validate_design_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_DESIGN_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

/// The stored unit: a design document plus its post-like metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignRecord {
    /// Design ID.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Publication status (`draft`, `publish`, ...).
    #[serde(default = "DesignRecord::default_status")]
    pub status: String,
    /// Owning user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
    /// Free-form host metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
    /// The live design.
    pub data: DesignDocument,
}

impl DesignRecord {
    fn default_status() -> String {
        "draft".to_string()
    }

    /// A new draft record stamped with `now`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        data: DesignDocument,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: Self::default_status(),
            author_id: None,
            created_at: now,
            modified_at: now,
            meta: BTreeMap::new(),
            data,
        }
    }
}

/// Typed access to [`DesignRecord`]s over any [`DocumentStore`].
#[derive(Clone)]
pub struct DesignRepository {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DesignRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesignRepository").finish_non_exhaustive()
    }
}

impl DesignRepository {
    /// Wrap a store; `clock` stamps modification times.
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The clock used for timestamps.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Load a record.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::NotFound`] for unknown IDs,
    /// [`DesignError::InvalidDocument`] if the stored JSON is not a record, and
    /// [`DesignError::Storage`] when the store fails.
    pub fn load(&self, id: &str) -> DesignResult<DesignRecord> {
        let raw = self
            .store
            .get(id)?
            .ok_or_else(|| DesignError::NotFound(format!("design {id}")))?;
        serde_json::from_str(&raw)
            .map_err(|e| DesignError::InvalidDocument(format!("stored design {id}: {e}")))
    }

    /// Load only the live document.
    ///
    /// # Errors
    ///
    /// See [`DesignRepository::load`].
    pub fn load_document(&self, id: &str) -> DesignResult<DesignDocument> {
        self.load(id).map(|record| record.data)
    }

    /// Whether a record exists under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::Storage`] when the store fails.
    pub fn exists(&self, id: &str) -> DesignResult<bool> {
        Ok(self.store.get(id)?.is_some())
    }

    /// Write a record as-is.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::Storage`] when serialization or the store fails.
    pub fn save(&self, record: &DesignRecord) -> DesignResult<()> {
        let raw = serde_json::to_string(record)
            .map_err(|e| DesignError::Storage(format!("serialize design {}: {e}", record.id)))?;
        self.store.put(&record.id, &raw)?;
        tracing::debug!(design_id = %record.id, "saved design record");
        Ok(())
    }

    /// Overwrite the live document of an existing record and bump its
    /// modification time.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::NotFound`] if the record does not exist, or a
    /// storage error.
    pub fn replace_document(&self, id: &str, data: DesignDocument) -> DesignResult<DesignRecord> {
        let mut record = self.load(id)?;
        record.data = data;
        record.modified_at = self.clock.now();
        self.save(&record)?;
        Ok(record)
    }

    /// Delete a record; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::Storage`] when the store fails.
    pub fn delete(&self, id: &str) -> DesignResult<bool> {
        Ok(self.store.delete(id)?)
    }

    /// All stored design IDs.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::Storage`] when the store fails.
    pub fn ids(&self) -> DesignResult<Vec<String>> {
        Ok(self.store.ids()?)
    }
}
