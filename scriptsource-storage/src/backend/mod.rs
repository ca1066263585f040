//! Key-value backends for observation lists.
//!
//! The store needs exactly three primitives from its backend: push a value
//! to the front of a list, read a whole list, and set a key's deadline.
//! Nothing else (transactions, scripting, pub/sub) is assumed.

pub mod lmdb;
pub mod memory;

pub use lmdb::{LmdbObservationBackend, LmdbObservationError};
pub use memory::InMemoryObservationBackend;

use async_trait::async_trait;
use scriptsource_core::{AttributionResult, Timestamp};
use std::sync::Arc;

use crate::key::ObservationKey;

/// Backend trait for pluggable observation list storage.
///
/// Implementations must be thread-safe. Expiry is per key: once `now` has
/// passed a key's deadline the key behaves as if it was never written, for
/// reads and for subsequent pushes alike.
///
/// `push_front` writes the value and the key's new deadline together, so a
/// stored observation always has a deadline.
#[async_trait]
pub trait ObservationBackend: Send + Sync {
    /// Prepend `value` to the list at `key` and set the key's deadline to
    /// `deadline`, as one atomic write.
    ///
    /// A key that is absent or expired at `now` starts a fresh list.
    async fn push_front(
        &self,
        key: &ObservationKey,
        value: Vec<u8>,
        now: Timestamp,
        deadline: Timestamp,
    ) -> AttributionResult<()>;

    /// Read the full list at `key`, front first.
    ///
    /// Returns an empty list if the key is absent or expired at `now`.
    async fn range(&self, key: &ObservationKey, now: Timestamp) -> AttributionResult<Vec<Vec<u8>>>;

    /// Set the deadline of `key`, replacing any previous one.
    ///
    /// Returns `false` if the key does not exist.
    async fn expire_at(&self, key: &ObservationKey, deadline: Timestamp) -> AttributionResult<bool>;
}

#[async_trait]
impl<T: ObservationBackend + ?Sized> ObservationBackend for Arc<T> {
    async fn push_front(
        &self,
        key: &ObservationKey,
        value: Vec<u8>,
        now: Timestamp,
        deadline: Timestamp,
    ) -> AttributionResult<()> {
        (**self).push_front(key, value, now, deadline).await
    }

    async fn range(&self, key: &ObservationKey, now: Timestamp) -> AttributionResult<Vec<Vec<u8>>> {
        (**self).range(key, now).await
    }

    async fn expire_at(&self, key: &ObservationKey, deadline: Timestamp) -> AttributionResult<bool> {
        (**self).expire_at(key, deadline).await
    }
}
