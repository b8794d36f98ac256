//! Durable key-value storage for the small amount of state the SDK keeps
//! across restarts: the authenticated-user marker, the device id and the
//! offline push-event queue.
//!
//! [`FileStore`] keeps every key in one JSON document. Writes take an
//! exclusive lock on a sibling lock file, go to a temp file first, are
//! synced, then renamed over the document.
//!
//! # Example
//!
//! ```no_run
//! use suprsend::storage::{FileStore, KeyValueStore};
//!
//! let store = FileStore::new("/var/lib/myapp/suprsend").unwrap();
//! store.set("ss_distinct_id", "user-1").unwrap();
//! assert_eq!(store.get("ss_distinct_id").unwrap().as_deref(), Some("user-1"));
//! ```

use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ErrorType, Result, SuprSendError};

/// Marker holding the last distinct id that completed `$identify`.
pub const AUTHENTICATED_DISTINCT_ID_KEY: &str = "ss_distinct_id";

pub const DEVICE_ID_KEY: &str = "ss_device_id";

/// Offline push-tracking queue, a JSON array of `{event, nid}`.
pub const PUSH_QUEUE_KEY: &str = "PushQueueItems";

const STORE_FILE_NAME: &str = "suprsend.json";
const LOCK_FILE_NAME: &str = "suprsend.lock";

/// String key-value storage. Implementations must be safe to share.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile store used when no storage path is configured, and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// File-backed store.
pub struct FileStore {
    file_path: PathBuf,
    lock_file_path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Opens (or creates) the store inside `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| {
            SuprSendError::with_source(
                ErrorType::Unknown,
                format!("Failed to create storage directory: {}", directory.display()),
                e,
            )
        })?;

        let file_path = directory.join(STORE_FILE_NAME);
        let lock_file_path = directory.join(LOCK_FILE_NAME);
        let values = Self::read_document(&file_path)?;

        tracing::debug!(
            "Opened file store at {:?} with {} keys",
            file_path,
            values.len()
        );

        Ok(Self {
            file_path,
            lock_file_path,
            cache: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn read_document(path: &Path) -> Result<HashMap<String, String>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(SuprSendError::with_source(
                    ErrorType::Unknown,
                    format!("Failed to read storage file: {}", path.display()),
                    e,
                ));
            }
        };

        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }

        match serde_json::from_str(&content) {
            Ok(values) => Ok(values),
            Err(e) => {
                tracing::warn!("Discarding corrupt storage file {:?}: {}", path, e);
                Ok(HashMap::new())
            }
        }
    }

    fn acquire_lock(&self) -> Result<File> {
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_file_path)
            .map_err(|e| {
                SuprSendError::with_source(ErrorType::Unknown, "Failed to open lock file", e)
            })?;

        lock_file.lock_exclusive().map_err(|e| {
            SuprSendError::with_source(ErrorType::Unknown, "Failed to acquire file lock", e)
        })?;

        Ok(lock_file)
    }

    fn write_document(&self, values: &HashMap<String, String>) -> Result<()> {
        let lock_file = self.acquire_lock()?;

        let content = serde_json::to_vec(values).map_err(|e| {
            SuprSendError::with_source(ErrorType::Unknown, "Failed to serialize storage", e)
        })?;

        let temp_path = self.file_path.with_extension("json.tmp");
        let mut file = File::create(&temp_path).map_err(|e| {
            SuprSendError::with_source(ErrorType::Unknown, "Failed to create storage file", e)
        })?;
        file.write_all(&content).map_err(|e| {
            SuprSendError::with_source(ErrorType::Unknown, "Failed to write storage file", e)
        })?;
        file.sync_all().map_err(|e| {
            SuprSendError::with_source(ErrorType::Unknown, "Failed to sync storage file", e)
        })?;
        fs::rename(&temp_path, &self.file_path).map_err(|e| {
            SuprSendError::with_source(ErrorType::Unknown, "Failed to replace storage file", e)
        })?;

        drop(lock_file);
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cache = self.cache.lock();
        cache.insert(key.to_string(), value.to_string());
        self.write_document(&cache)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.lock();
        if cache.remove(key).is_none() {
            return Ok(());
        }
        self.write_document(&cache)
    }
}
