//! Durable property bag backing identity and super-property state.
//!
//! The store mirrors the browser `localStorage` layout: one JSON object per
//! client instance under a single storage key. Storage failures never reach
//! the caller; the in-memory bag stays authoritative for the session and the
//! failure is logged when debug mode is on.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use serde_json::{Map, Value};

use crate::error::{storage_error, MinipanelResult};

/// Abstraction over the durable key-value store hosting the persisted state.
///
/// Implementations may fail; failures must not crash the client, so the
/// [`Persistence`] wrapper swallows them.
pub trait PropertyStorage: Send + Sync {
    fn get(&self, key: &str) -> MinipanelResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> MinipanelResult<()>;
    fn remove(&self, key: &str) -> MinipanelResult<()>;
}

/// In-memory storage backend for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PropertyStorage for MemoryStorage {
    fn get(&self, key: &str) -> MinipanelResult<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> MinipanelResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> MinipanelResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// File-backed storage: one JSON file per storage key under a base directory.
#[derive(Clone, Debug)]
pub struct FileStorage {
    base_dir: Arc<PathBuf>,
}

impl FileStorage {
    pub fn new(base_dir: PathBuf) -> MinipanelResult<Self> {
        fs::create_dir_all(&base_dir).map_err(|err| {
            storage_error(format!(
                "failed to create storage directory '{}': {}",
                base_dir.display(),
                err
            ))
        })?;
        Ok(Self {
            base_dir: Arc::new(base_dir),
        })
    }

    pub fn default_dir() -> MinipanelResult<Self> {
        if let Ok(dir) = std::env::var("MINIPANEL_STORAGE_DIR") {
            return Self::new(PathBuf::from(dir));
        }

        let dir = std::env::current_dir()
            .map_err(|err| storage_error(format!("failed to obtain working directory: {err}")))?
            .join(".minipanel");
        Self::new(dir)
    }

    fn file_for(&self, key: &str) -> PathBuf {
        let encoded = percent_encode(key.as_bytes(), NON_ALPHANUMERIC).to_string();
        self.base_dir.join(format!("{encoded}.json"))
    }
}

impl PropertyStorage for FileStorage {
    fn get(&self, key: &str) -> MinipanelResult<Option<String>> {
        let path = self.file_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path).map(Some).map_err(|err| {
            storage_error(format!("failed to read '{}': {}", path.display(), err))
        })
    }

    fn set(&self, key: &str, value: &str) -> MinipanelResult<()> {
        let path = self.file_for(key);
        fs::write(&path, value)
            .map_err(|err| storage_error(format!("failed to write '{}': {}", path.display(), err)))
    }

    fn remove(&self, key: &str) -> MinipanelResult<()> {
        let path = self.file_for(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|err| {
                storage_error(format!("failed to delete '{}': {}", path.display(), err))
            })?;
        }
        Ok(())
    }
}

/// The persisted property bag: identity keys plus super-properties, saved as
/// one JSON object on every mutation.
pub struct Persistence {
    storage: Arc<dyn PropertyStorage>,
    key: String,
    debug: AtomicBool,
    props: Mutex<Map<String, Value>>,
}

impl Persistence {
    pub fn new(storage: Arc<dyn PropertyStorage>, key: impl Into<String>, debug: bool) -> Self {
        let persistence = Self {
            storage,
            key: key.into(),
            debug: AtomicBool::new(debug),
            props: Mutex::new(Map::new()),
        };
        persistence.load();
        persistence
    }

    pub(crate) fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::SeqCst);
    }

    /// Reads the storage entry. Missing or corrupt data leaves the bag empty.
    pub fn load(&self) {
        match self.storage.get(&self.key) {
            Ok(Some(raw)) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(parsed) => {
                    *self.props.lock().unwrap() = parsed;
                }
                Err(err) => self.log_failure("parse", &err.to_string()),
            },
            Ok(None) => {}
            Err(err) => self.log_failure("load", &err.to_string()),
        }
    }

    /// Writes the bag to storage. Failures are swallowed; the in-memory bag
    /// remains authoritative for the session.
    pub fn save(&self) {
        let serialized = {
            let props = self.props.lock().unwrap();
            serde_json::to_string(&*props)
        };
        match serialized {
            Ok(raw) => {
                if let Err(err) = self.storage.set(&self.key, &raw) {
                    self.log_failure("save", &err.to_string());
                }
            }
            Err(err) => self.log_failure("serialize", &err.to_string()),
        }
    }

    /// Returns a shallow copy of the bag. Mutating the copy does not touch
    /// the live store.
    pub fn properties(&self) -> Map<String, Value> {
        self.props.lock().unwrap().clone()
    }

    pub fn get(&self, prop: &str) -> Option<Value> {
        self.props.lock().unwrap().get(prop).cloned()
    }

    /// Merges `patch` into the bag, later values winning, then saves.
    pub fn register(&self, patch: Map<String, Value>) {
        {
            let mut props = self.props.lock().unwrap();
            for (key, value) in patch {
                props.insert(key, value);
            }
        }
        self.save();
    }

    /// Merges only keys absent from the bag. Skips the save entirely when
    /// nothing was added.
    pub fn register_once(&self, patch: Map<String, Value>) {
        let added = {
            let mut props = self.props.lock().unwrap();
            let mut added = false;
            for (key, value) in patch {
                if !props.contains_key(&key) {
                    props.insert(key, value);
                    added = true;
                }
            }
            added
        };
        if added {
            self.save();
        }
    }

    pub fn unregister(&self, prop: &str) {
        self.props.lock().unwrap().remove(prop);
        self.save();
    }

    /// Empties the bag and removes the storage entry. Removal failures are
    /// logged only.
    pub fn clear(&self) {
        self.props.lock().unwrap().clear();
        if let Err(err) = self.storage.remove(&self.key) {
            self.log_failure("clear", &err.to_string());
        }
    }

    fn log_failure(&self, operation: &str, detail: &str) {
        if self.debug.load(Ordering::SeqCst) {
            log::warn!(
                "persistence {} failed for '{}': {}",
                operation,
                self.key,
                detail
            );
        }
    }
}
