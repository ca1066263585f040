//! LMDB-backed observation lists.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep observation lists in
//! a memory-mapped key-value store that survives restarts.
//!
//! # Record Format
//!
//! Each key maps to one record:
//! - Bytes 0-7: deadline as unix millis (i64 LE), `i64::MAX` for none
//! - Then, repeated: value length (u32 LE) followed by the value bytes,
//!   front of the list first
//!
//! LMDB has no native expiry, so a passed deadline is treated as absent on
//! read and overwritten on the next push. [`LmdbObservationBackend::purge_expired`]
//! reclaims the space.

use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use scriptsource_core::{AttributionError, AttributionResult, StorageError, Timestamp};

use super::ObservationBackend;
use crate::key::ObservationKey;

const NO_DEADLINE: i64 = i64::MAX;
const DEADLINE_LEN: usize = 8;
const LENGTH_LEN: usize = 4;

/// Error type for LMDB observation operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbObservationError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A stored record is truncated or otherwise malformed.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbObservationError> for AttributionError {
    fn from(e: LmdbObservationError) -> Self {
        match e {
            LmdbObservationError::Corrupt(reason) => {
                AttributionError::Storage(StorageError::Codec { reason })
            }
            other => AttributionError::Storage(StorageError::Unavailable {
                reason: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct StoredRecord {
    deadline: Option<i64>,
    values: Vec<Vec<u8>>,
}

impl StoredRecord {
    fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.deadline, Some(deadline) if deadline <= now.timestamp_millis())
    }

    fn encode(&self) -> Vec<u8> {
        let payload: usize = self.values.iter().map(|v| LENGTH_LEN + v.len()).sum();
        let mut bytes = Vec::with_capacity(DEADLINE_LEN + payload);
        bytes.extend_from_slice(&self.deadline.unwrap_or(NO_DEADLINE).to_le_bytes());
        for value in &self.values {
            bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
            bytes.extend_from_slice(value);
        }
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<Self, LmdbObservationError> {
        let (head, mut rest) = split_checked(bytes, DEADLINE_LEN)
            .ok_or_else(|| LmdbObservationError::Corrupt("missing deadline".into()))?;
        let deadline_bytes: [u8; DEADLINE_LEN] = head
            .try_into()
            .map_err(|_| LmdbObservationError::Corrupt("invalid deadline".into()))?;
        let deadline = match i64::from_le_bytes(deadline_bytes) {
            NO_DEADLINE => None,
            millis => Some(millis),
        };

        let mut values = Vec::new();
        while !rest.is_empty() {
            let (len_bytes, tail) = split_checked(rest, LENGTH_LEN)
                .ok_or_else(|| LmdbObservationError::Corrupt("truncated length".into()))?;
            let len_bytes: [u8; LENGTH_LEN] = len_bytes
                .try_into()
                .map_err(|_| LmdbObservationError::Corrupt("invalid length".into()))?;
            let len = u32::from_le_bytes(len_bytes) as usize;
            let (value, tail) = split_checked(tail, len)
                .ok_or_else(|| LmdbObservationError::Corrupt("truncated value".into()))?;
            values.push(value.to_vec());
            rest = tail;
        }

        Ok(Self { deadline, values })
    }
}

fn split_checked(bytes: &[u8], at: usize) -> Option<(&[u8], &[u8])> {
    (bytes.len() >= at).then(|| bytes.split_at(at))
}

/// LMDB-backed observation backend.
///
/// # Example
///
/// ```ignore
/// use scriptsource_storage::{LmdbObservationBackend, ObservationStore};
///
/// let backend = Arc::new(LmdbObservationBackend::new("/var/lib/scriptsource", 256)?);
/// let store = ObservationStore::new(backend, &AttributionConfig::from_env())?;
/// ```
pub struct LmdbObservationBackend {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
}

impl LmdbObservationBackend {
    /// Open (or create) an LMDB observation backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbObservationError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbObservationError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbObservationError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    /// Delete every record whose deadline has passed. Returns how many were removed.
    pub fn purge_expired(&self, now: Timestamp) -> Result<u64, LmdbObservationError> {
        let expired = {
            let rtxn = self
                .env
                .read_txn()
                .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;
            let iter = self
                .db
                .iter(&rtxn)
                .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

            let mut expired = Vec::new();
            for result in iter {
                let (key, bytes) =
                    result.map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;
                // Corrupt records are left for an operator to inspect.
                if let Ok(record) = StoredRecord::decode(bytes) {
                    if record.is_expired(now) {
                        expired.push(key.to_vec());
                    }
                }
            }
            expired
        };

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

        let mut deleted = 0u64;
        for key in &expired {
            if self
                .db
                .delete(&mut wtxn, key)
                .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?
            {
                deleted += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

        Ok(deleted)
    }

    /// Deadline stored for `key`, if any.
    pub fn deadline(&self, key: &ObservationKey) -> Result<Option<Timestamp>, LmdbObservationError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;
        let bytes = self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;
        match bytes {
            Some(bytes) => Ok(StoredRecord::decode(bytes)?
                .deadline
                .and_then(DateTime::from_timestamp_millis)),
            None => Ok(None),
        }
    }

    /// Number of records stored, expired or not.
    pub fn key_count(&self) -> Result<u64, LmdbObservationError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;
        self.db
            .len(&rtxn)
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))
    }
}

#[async_trait]
impl ObservationBackend for LmdbObservationBackend {
    async fn push_front(
        &self,
        key: &ObservationKey,
        value: Vec<u8>,
        now: Timestamp,
        deadline: Timestamp,
    ) -> AttributionResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

        let existing = self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?
            .map(|bytes| bytes.to_vec());

        let mut record = match existing {
            Some(bytes) => StoredRecord::decode(&bytes)?,
            None => StoredRecord::default(),
        };
        if record.is_expired(now) {
            record = StoredRecord::default();
        }
        record.values.insert(0, value);
        record.deadline = Some(deadline.timestamp_millis());

        self.db
            .put(&mut wtxn, key.as_bytes(), &record.encode())
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

        Ok(())
    }

    async fn range(&self, key: &ObservationKey, now: Timestamp) -> AttributionResult<Vec<Vec<u8>>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

        let bytes = self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

        let record = match bytes {
            Some(bytes) => StoredRecord::decode(bytes)?,
            None => return Ok(Vec::new()),
        };

        if record.is_expired(now) {
            Ok(Vec::new())
        } else {
            Ok(record.values)
        }
    }

    async fn expire_at(&self, key: &ObservationKey, deadline: Timestamp) -> AttributionResult<bool> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

        let existing = self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?
            .map(|bytes| bytes.to_vec());

        let Some(bytes) = existing else {
            return Ok(false);
        };

        let mut record = StoredRecord::decode(&bytes)?;
        record.deadline = Some(deadline.timestamp_millis());

        self.db
            .put(&mut wtxn, key.as_bytes(), &record.encode())
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbObservationError::Transaction(e.to_string()))?;

        Ok(true)
    }
}
