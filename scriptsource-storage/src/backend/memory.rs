//! In-memory observation backend.
//!
//! Keeps lists in a `HashMap` behind a `RwLock`. Expired keys are dropped
//! lazily when touched, or in bulk via [`InMemoryObservationBackend::purge_expired`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use scriptsource_core::{AttributionResult, StorageError, Timestamp};

use super::ObservationBackend;
use crate::key::ObservationKey;

#[derive(Debug, Default)]
struct StoredList {
    values: VecDeque<Vec<u8>>,
    expires_at: Option<Timestamp>,
}

impl StoredList {
    fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// In-memory backend for tests and single-process deployments.
#[derive(Debug, Default, Clone)]
pub struct InMemoryObservationBackend {
    lists: Arc<RwLock<HashMap<String, StoredList>>>,
}

impl InMemoryObservationBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held, expired or not.
    pub fn key_count(&self) -> usize {
        self.lists.read().map(|lists| lists.len()).unwrap_or(0)
    }

    /// Current deadline of `key`, if it exists and has one.
    pub fn deadline(&self, key: &ObservationKey) -> Option<Timestamp> {
        self.lists
            .read()
            .ok()
            .and_then(|lists| lists.get(key.as_str()).and_then(|list| list.expires_at))
    }

    /// Drop every key whose deadline has passed. Returns how many were removed.
    pub fn purge_expired(&self, now: Timestamp) -> AttributionResult<u64> {
        let mut lists = self.lists.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = lists.len();
        lists.retain(|_, list| !list.is_expired(now));
        Ok((before - lists.len()) as u64)
    }

    /// Remove all stored data.
    pub fn clear(&self) {
        if let Ok(mut lists) = self.lists.write() {
            lists.clear();
        }
    }
}

#[async_trait]
impl ObservationBackend for InMemoryObservationBackend {
    async fn push_front(
        &self,
        key: &ObservationKey,
        value: Vec<u8>,
        now: Timestamp,
        deadline: Timestamp,
    ) -> AttributionResult<()> {
        let mut lists = self.lists.write().map_err(|_| StorageError::LockPoisoned)?;
        let list = lists.entry(key.as_str().to_string()).or_default();
        if list.is_expired(now) {
            *list = StoredList::default();
        }
        list.values.push_front(value);
        list.expires_at = Some(deadline);
        Ok(())
    }

    async fn range(&self, key: &ObservationKey, now: Timestamp) -> AttributionResult<Vec<Vec<u8>>> {
        {
            let lists = self.lists.read().map_err(|_| StorageError::LockPoisoned)?;
            match lists.get(key.as_str()) {
                None => return Ok(Vec::new()),
                Some(list) if !list.is_expired(now) => {
                    return Ok(list.values.iter().cloned().collect());
                }
                Some(_) => {}
            }
        }

        let mut lists = self.lists.write().map_err(|_| StorageError::LockPoisoned)?;
        if lists.get(key.as_str()).is_some_and(|list| list.is_expired(now)) {
            lists.remove(key.as_str());
        }
        Ok(Vec::new())
    }

    async fn expire_at(&self, key: &ObservationKey, deadline: Timestamp) -> AttributionResult<bool> {
        let mut lists = self.lists.write().map_err(|_| StorageError::LockPoisoned)?;
        match lists.get_mut(key.as_str()) {
            Some(list) => {
                list.expires_at = Some(deadline);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
