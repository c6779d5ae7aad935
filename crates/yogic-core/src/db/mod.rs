// ============================================================================
// StepDb: Local Durable Store (redb)
// ============================================================================
// Persistent key-value storage for the step snapshot and app flags.
// Default path: ~/.yogic/steps.redb (override via YOGIC_DB_PATH env var)
// ============================================================================

pub mod snapshot;

pub use snapshot::{
    has_shown_onboarding, load_snapshot, mark_onboarding_shown, save_snapshot, ONBOARDING_KEY,
    SNAPSHOT_KEY,
};

use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

// Table definitions
const KV: TableDefinition<&str, &str> = TableDefinition::new("kv");

/// Errors from the local store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Cannot determine home directory")]
    NoHomeDir,

    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Store error: {0}")]
    Backend(String),

    #[error("Failed to encode value: {0}")]
    Encode(String),
}

/// String key-value store used for durable local state.
/// Implementations must be safe to share between the reconciler and the
/// sync scheduler.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<bool, StoreError>;
}

/// File-backed store on the embedded redb database
pub struct StepDb {
    db: Database,
    path: PathBuf,
}

impl StepDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses YOGIC_DB_PATH env var or ~/.yogic/steps.redb
    pub fn open(path: Option<&str>) -> Result<Self, StoreError> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("YOGIC_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or(StoreError::NoHomeDir)?;
            let yogic_dir = home.join(".yogic");
            std::fs::create_dir_all(&yogic_dir)
                .map_err(|e| StoreError::Open(format!("Failed to create .yogic directory: {}", e)))?;
            yogic_dir.join("steps.redb")
        };

        info!("Opening step store at: {}", db_path.display());

        let db = Database::create(&db_path).map_err(|e| StoreError::Open(e.to_string()))?;

        // Ensure the table exists by doing a write transaction
        let write_txn = db.begin_write().map_err(backend)?;
        {
            let _ = write_txn.open_table(KV).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored keys, for export
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(KV).map_err(backend)?;

        let mut keys = Vec::new();
        for entry in table.range::<&str>(..).map_err(backend)? {
            let (key, _value) = entry.map_err(backend)?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

impl KeyValueStore for StepDb {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(KV).map_err(backend)?;

        let value = table.get(key).map_err(backend)?;
        Ok(value.map(|v| v.value().to_string()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = write_txn.open_table(KV).map_err(backend)?;
            table.insert(key, value).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;

        debug!("Stored key: {}", key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let write_txn = self.db.begin_write().map_err(backend)?;
        let removed;
        {
            let mut table = write_txn.open_table(KV).map_err(backend)?;
            removed = table.remove(key).map_err(backend)?.is_some();
        }
        write_txn.commit().map_err(backend)?;

        if removed {
            debug!("Removed key: {}", key);
        }
        Ok(removed)
    }
}

/// In-memory store for tests and guest sessions
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock().remove(key).is_some())
    }
}

fn backend<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("yogic-test-{}.redb", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_step_db_roundtrip_and_remove() {
        let path = temp_db_path();
        let db = StepDb::open(path.to_str()).unwrap();

        assert_eq!(db.get("missing").unwrap(), None);
        db.set("greeting", "namaste").unwrap();
        assert_eq!(db.get("greeting").unwrap().as_deref(), Some("namaste"));
        assert_eq!(db.keys().unwrap(), vec!["greeting".to_string()]);

        assert!(db.remove("greeting").unwrap());
        assert!(!db.remove("greeting").unwrap());
        assert_eq!(db.get("greeting").unwrap(), None);

        drop(db);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_step_db_survives_reopen() {
        let path = temp_db_path();
        {
            let db = StepDb::open(path.to_str()).unwrap();
            db.set("pending", "250").unwrap();
        }
        let db = StepDb::open(path.to_str()).unwrap();
        assert_eq!(db.get("pending").unwrap().as_deref(), Some("250"));
        assert_eq!(db.path(), path.as_path());

        drop(db);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        assert!(store.remove("a").unwrap());
        assert_eq!(store.get("a").unwrap(), None);
    }
}
