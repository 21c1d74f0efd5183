//! Key-value persistence for gun profiles and calibration
//!
//! Values are JSON documents under short string keys. The on-disk store keeps
//! one `<key>.json` file per key; the memory store backs tests and hosts that
//! run without a writable data directory.
//!
//! Store failures never take the pipeline down: [`load_value`] and
//! [`save_value`] log and carry on with the in-memory state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Persisted slot assignments, button mappings and cursor flags
pub const KEY_GUN_PROFILES: &str = "gun-profiles";
/// Persisted calibration profiles keyed by device id
pub const KEY_GUN_CALIBRATION: &str = "gun-calibration";

/// A string-keyed JSON store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Type alias for a shared store
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Read and deserialize a value; missing or unreadable entries yield `None`
pub fn load_value<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let value = match store.get(key) {
        Ok(Some(value)) => value,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read {}: {}", key, e);
            return None;
        }
    };
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(source) => {
            warn!(
                "{}",
                StoreError::Json {
                    key: key.to_string(),
                    source
                }
            );
            None
        }
    }
}

/// Serialize and write a value; failures are logged, never returned
pub fn save_value<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) {
    let value = match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to serialize {}: {}", key, e);
            return;
        }
    };
    if let Err(e) = store.set(key, value) {
        warn!("Failed to persist {}: {}", key, e);
    }
}

/// Store backed by one JSON file per key
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default data directory (`<data_dir>/lightgun`)
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lightgun")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn io_error(key: &str, source: std::io::Error) -> StoreError {
        StoreError::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(key, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Json {
                key: key.to_string(),
                source,
            })
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(key, e))?;
        let content = serde_json::to_string_pretty(&value).map_err(|source| StoreError::Json {
            key: key.to_string(),
            source,
        })?;
        // Write then rename so a crash never leaves a truncated document
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| Self::io_error(key, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| Self::io_error(key, e))?;
        debug!("Saved {} to {}", key, path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(key, e)),
        }
    }
}

/// Volatile store
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_store_roundtrip_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));
        assert!(store.get(KEY_GUN_PROFILES).unwrap().is_none());

        store.set(KEY_GUN_PROFILES, json!([{"pointerId": 1}])).unwrap();
        assert_eq!(
            store.get(KEY_GUN_PROFILES).unwrap(),
            Some(json!([{"pointerId": 1}]))
        );
        assert!(dir.path().join("nested/gun-profiles.json").exists());

        store.remove(KEY_GUN_PROFILES).unwrap();
        store.remove(KEY_GUN_PROFILES).unwrap();
        assert!(store.get(KEY_GUN_PROFILES).unwrap().is_none());
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(
            store.set("../escape", json!(1)),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gun-calibration.json"), "{not json").unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(
            store.get(KEY_GUN_CALIBRATION),
            Err(StoreError::Json { .. })
        ));
        let loaded: Option<HashMap<String, f64>> = load_value(&store, KEY_GUN_CALIBRATION);
        assert!(loaded.is_none());
    }

    #[test]
    fn test_typed_helpers() {
        let store = MemoryStore::new();
        save_value(&store, "numbers", &vec![1u8, 2, 3]);
        let numbers: Option<Vec<u8>> = load_value(&store, "numbers");
        assert_eq!(numbers, Some(vec![1, 2, 3]));
        // Wrong shape is logged and ignored
        let wrong: Option<String> = load_value(&store, "numbers");
        assert!(wrong.is_none());
    }
}
