//! # LedgerDB: Persistent Storage
//!
//! Ledger state that must survive a restart is written here, on top of
//! sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree        | Key            | Value                  |
//! |-------------|----------------|------------------------|
//! | `snapshots` | name (UTF-8)   | `bincode(T)`           |
//! | `metadata`  | key (UTF-8)    | raw bytes              |
//!
//! A snapshot is a whole serializable state object (a source ledger's
//! persisted fields, a full devnet) stored under a well-known name. Each
//! write replaces the previous snapshot in one insert, so readers never see
//! half of an update.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Metadata key holding the number of snapshot writes so far.
const META_WRITE_COUNT: &[u8] = b"snapshot_write_count";

// ---------------------------------------------------------------------------
// LedgerDB
// ---------------------------------------------------------------------------

/// Persistent snapshot store.
///
/// Cheap to clone; sled handles are reference counted and safe to share
/// across threads.
#[derive(Debug, Clone)]
pub struct LedgerDB {
    db: Db,
    snapshots: Tree,
    metadata: Tree,
}

impl LedgerDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let snapshots = db.open_tree("snapshots")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            snapshots,
            metadata,
        })
    }

    /// Stores `value` under `name`, replacing any previous snapshot, and
    /// flushes to disk.
    pub fn put_snapshot<T: Serialize>(&self, name: &str, value: &T) -> DbResult<()> {
        let bytes =
            bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.snapshots.insert(name.as_bytes(), bytes)?;

        let count = self.write_count()?.saturating_add(1);
        self.metadata.insert(META_WRITE_COUNT, &count.to_be_bytes())?;

        self.db.flush()?;
        Ok(())
    }

    /// Loads the snapshot stored under `name`, if any.
    pub fn get_snapshot<T: DeserializeOwned>(&self, name: &str) -> DbResult<Option<T>> {
        match self.snapshots.get(name.as_bytes())? {
            Some(bytes) => {
                let value: T = bincode::deserialize(&bytes)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Like [`get_snapshot`](Self::get_snapshot), but a missing snapshot is an error.
    pub fn require_snapshot<T: DeserializeOwned>(&self, name: &str) -> DbResult<T> {
        self.get_snapshot(name)?
            .ok_or_else(|| DbError::NotFound(name.to_string()))
    }

    /// Removes the snapshot stored under `name`. Returns whether one existed.
    pub fn delete_snapshot(&self, name: &str) -> DbResult<bool> {
        Ok(self.snapshots.remove(name.as_bytes())?.is_some())
    }

    /// Number of stored snapshots.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Total snapshot writes since the database was created.
    pub fn write_count(&self) -> DbResult<u64> {
        match self.metadata.get(META_WRITE_COUNT)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| DbError::Serialization("invalid write count bytes".to_string()))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
