//! Persistence of committed entity definitions.

use crate::catalog::{registry_key, EntityDef};
use parking_lot::Mutex;
use sled::{Db, Tree};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Tree holding committed definitions.
const ENTITY_TREE: &str = "registry:entities";

/// Width of the registration sequence prefix on stored values.
const SEQ_LEN: usize = 8;

/// Persistence collaborator errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying sled failure.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// A stored record could not be decoded.
    #[error("corrupt record for '{key}': {reason}")]
    Corrupt {
        /// Record key.
        key: String,
        /// Decoder message.
        reason: String,
    },

    /// The store refused the write.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Receives committed definitions.
///
/// Called by the registry after a merge is computed and before it becomes
/// visible to readers; a failure rolls the commit back.
pub trait DefinitionStore: Send + Sync {
    /// Persist the committed definition (insert or replace).
    fn persist(&self, entity: &EntityDef) -> Result<(), StoreError>;

    /// Forget an entity removed by an operator.
    fn remove(&self, name: &str) -> Result<(), StoreError>;

    /// Load every stored definition in registration order.
    fn load_all(&self) -> Result<Vec<EntityDef>, StoreError>;
}

/// In-memory store, the default for registries without persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: Mutex<Vec<EntityDef>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored definitions.
    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entities.lock().is_empty()
    }
}

impl DefinitionStore for MemoryStore {
    fn persist(&self, entity: &EntityDef) -> Result<(), StoreError> {
        let mut entities = self.entities.lock();
        let key = entity.key();
        match entities.iter_mut().find(|e| e.key() == key) {
            Some(slot) => *slot = entity.clone(),
            None => entities.push(entity.clone()),
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        let key = registry_key(name);
        self.entities.lock().retain(|e| e.key() != key);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<EntityDef>, StoreError> {
        Ok(self.entities.lock().clone())
    }
}

/// Configuration for the sled-backed store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the database directory.
    pub path: PathBuf,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Flush to disk after every commit.
    pub flush_on_commit: bool,

    /// Temporary database (deleted on drop).
    pub temporary: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./mdschema_data"),
            cache_capacity: 64 * 1024 * 1024, // 64MB
            flush_on_commit: true,
            temporary: false,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a temporary configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::from(""),
            temporary: true,
            flush_on_commit: false,
            ..Default::default()
        }
    }

    /// Set whether every commit is flushed.
    pub fn flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }

    fn to_sled_config(&self) -> sled::Config {
        let config = sled::Config::new().cache_capacity(self.cache_capacity);
        if self.temporary {
            config.temporary(true)
        } else {
            config.path(&self.path)
        }
    }
}

/// Sled-backed store.
///
/// Each value is the registration sequence number (big-endian) followed by
/// the rkyv-encoded definition, so a single insert commits both.
pub struct SledStore {
    db: Db,
    entities: Tree,
    flush_on_commit: bool,
}

impl SledStore {
    /// Open or create a store.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let db = config.to_sled_config().open()?;
        Self::with_db(db, config.flush_on_commit)
    }

    /// Use an already-open sled database.
    pub fn with_db(db: Db, flush_on_commit: bool) -> Result<Self, StoreError> {
        let entities = db.open_tree(ENTITY_TREE)?;
        Ok(Self {
            db,
            entities,
            flush_on_commit,
        })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.entities.flush()?;
        Ok(())
    }

    fn decode(key: &[u8], value: &[u8]) -> Result<(u64, EntityDef), StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: String::from_utf8_lossy(key).into_owned(),
            reason,
        };
        if value.len() < SEQ_LEN {
            return Err(corrupt("truncated value".into()));
        }
        let (seq, body) = value.split_at(SEQ_LEN);
        let mut buf = [0u8; SEQ_LEN];
        buf.copy_from_slice(seq);
        let entity = EntityDef::from_bytes(body).map_err(|e| corrupt(e.to_string()))?;
        Ok((u64::from_be_bytes(buf), entity))
    }
}

impl DefinitionStore for SledStore {
    fn persist(&self, entity: &EntityDef) -> Result<(), StoreError> {
        let key = entity.key();
        let seq = match self.entities.get(key.as_bytes())? {
            Some(existing) if existing.len() >= SEQ_LEN => {
                let mut buf = [0u8; SEQ_LEN];
                buf.copy_from_slice(&existing[..SEQ_LEN]);
                u64::from_be_bytes(buf)
            }
            _ => self.db.generate_id()?,
        };

        let body = entity
            .to_bytes()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let mut value = Vec::with_capacity(SEQ_LEN + body.len());
        value.extend_from_slice(&seq.to_be_bytes());
        value.extend_from_slice(&body);

        self.entities.insert(key.as_bytes(), value)?;
        if self.flush_on_commit {
            self.entities.flush()?;
        }

        debug!(entity = %entity.name, version = entity.schema_version, seq, "persisted definition");
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.entities.remove(registry_key(name).as_bytes())?;
        if self.flush_on_commit {
            self.entities.flush()?;
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<EntityDef>, StoreError> {
        let mut loaded = Vec::new();
        for result in self.entities.iter() {
            let (key, value) = result?;
            loaded.push(Self::decode(&key, &value)?);
        }
        loaded.sort_by_key(|(seq, _)| *seq);
        Ok(loaded.into_iter().map(|(_, entity)| entity).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, FieldType};

    fn entity(name: &str, version: u64) -> EntityDef {
        EntityDef {
            schema_version: version,
            ..EntityDef::new(name, "m").with_field(FieldDef::new("x", FieldType::Int))
        }
    }

    #[test]
    fn test_memory_store_upserts_in_order() {
        let store = MemoryStore::new();
        store.persist(&entity("B", 1)).unwrap();
        store.persist(&entity("A", 1)).unwrap();
        store.persist(&entity("b", 2)).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "b");
        assert_eq!(loaded[0].schema_version, 2);

        store.remove("B").unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sled_store_preserves_registration_order() {
        let store = SledStore::open(&StoreConfig::temporary()).unwrap();
        store.persist(&entity("Zebra", 1)).unwrap();
        store.persist(&entity("Apple", 1)).unwrap();
        store.persist(&entity("Zebra", 2)).unwrap();

        let loaded = store.load_all().unwrap();
        let names: Vec<_> = loaded.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Zebra", "Apple"]);
        assert_eq!(loaded[0].schema_version, 2);
    }

    #[test]
    fn test_sled_store_remove() {
        let store = SledStore::open(&StoreConfig::temporary()).unwrap();
        store.persist(&entity("A", 1)).unwrap();
        store.remove("a").unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_sled_store_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path());

        {
            let store = SledStore::open(&config).unwrap();
            store.persist(&entity("Patient", 3)).unwrap();
            store.flush().unwrap();
        }

        let store = SledStore::open(&config).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].schema_version, 3);
    }

    #[test]
    fn test_sled_store_reports_corruption() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        db.open_tree(ENTITY_TREE)
            .unwrap()
            .insert("broken", &b"xy"[..])
            .unwrap();

        let store = SledStore::with_db(db, false).unwrap();
        assert!(matches!(
            store.load_all(),
            Err(StoreError::Corrupt { ref key, .. }) if key == "broken"
        ));
    }
}
