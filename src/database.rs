/*!
 * On-disk key→JSON-document store.
 *
 * The whole table is loaded into memory at startup and flushed on every
 * mutation. Acceptable for the expected scale of a personal media library;
 * the value is crash-safety, not throughput.
 */

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Persistent key→document mapping backed by a single JSON file
pub struct Database {
    path: PathBuf,
    table: Mutex<HashMap<String, Value>>,
}

impl Database {
    /// Open (or create) a database file and load it fully into memory.
    /// Unparseable contents start an empty table rather than failing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Load a raw document by key.
    pub fn load(&self, key: &str) -> Option<Value> {
        self.table.lock().get(key).cloned()
    }

    /// Load and deserialize a document by key. Documents that no longer
    /// match the expected shape read as absent.
    pub fn load_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.load(key)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Store a document and flush the table to disk.
    pub fn store<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).context("Failed to serialize document")?;
        {
            let mut table = self.table.lock();
            table.insert(key.to_string(), value);
        }
        self.flush()
    }

    /// Remove a document, flushing if it existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let removed = self.table.lock().remove(key).is_some();
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }

    /// True when a document exists for the key.
    pub fn contains(&self, key: &str) -> bool {
        self.table.lock().contains_key(key)
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// True when no documents are stored
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    fn flush(&self) -> Result<()> {
        let serialized = {
            let table = self.table.lock();
            serde_json::to_string(&*table).context("Failed to serialize database")?
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for {:?}", self.path))?;
        }
        std::fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write database {:?}", self.path))?;
        Ok(())
    }
}
