//! Scriptsource Test Utilities
//!
//! Centralized test infrastructure for the workspace:
//! - Proptest generators for ids, observations and scripts
//! - Mock backends that fail or stall on demand
//! - Fixtures for populating a store
//! - Custom assertions for resolver output

// Re-export core types for convenience
pub use scriptsource_core::{
    ArtifactId, ArtifactRef, AttributionConfig, AttributionError, AttributionResult, Observation,
    ProjectId, ResolvedScript, RuntimeScript, ScriptDescriptor, StorageError, Timestamp,
    TrackedScript, ValidationError,
};
pub use scriptsource_storage::{
    InMemoryObservationBackend, ObservationBackend, ObservationKey, ObservationStore,
};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// MOCK BACKENDS
// ============================================================================

fn unavailable(reason: &str) -> AttributionError {
    StorageError::Unavailable {
        reason: reason.to_string(),
    }
    .into()
}

/// Backend that fails every operation, as if the store were down.
#[derive(Debug, Default)]
pub struct FailingBackend {
    calls: AtomicU64,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations attempted against this backend.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObservationBackend for FailingBackend {
    async fn push_front(
        &self,
        _key: &ObservationKey,
        _value: Vec<u8>,
        _now: Timestamp,
        _deadline: Timestamp,
    ) -> AttributionResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(unavailable("backend down"))
    }

    async fn range(&self, _key: &ObservationKey, _now: Timestamp) -> AttributionResult<Vec<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(unavailable("backend down"))
    }

    async fn expire_at(&self, _key: &ObservationKey, _deadline: Timestamp) -> AttributionResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(unavailable("backend down"))
    }
}

/// In-memory backend that fails every operation touching selected hashes.
#[derive(Debug, Default)]
pub struct FlakyBackend {
    inner: InMemoryObservationBackend,
    broken: HashSet<String>,
}

impl FlakyBackend {
    pub fn new<I, T>(broken_hashes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            inner: InMemoryObservationBackend::new(),
            broken: broken_hashes.into_iter().map(Into::into).collect(),
        }
    }

    /// The healthy backend behind the failures.
    pub fn inner(&self) -> &InMemoryObservationBackend {
        &self.inner
    }

    fn check(&self, key: &ObservationKey) -> AttributionResult<()> {
        if self.broken.contains(key.hash()) {
            Err(unavailable("connection reset"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObservationBackend for FlakyBackend {
    async fn push_front(
        &self,
        key: &ObservationKey,
        value: Vec<u8>,
        now: Timestamp,
        deadline: Timestamp,
    ) -> AttributionResult<()> {
        self.check(key)?;
        self.inner.push_front(key, value, now, deadline).await
    }

    async fn range(&self, key: &ObservationKey, now: Timestamp) -> AttributionResult<Vec<Vec<u8>>> {
        self.check(key)?;
        self.inner.range(key, now).await
    }

    async fn expire_at(&self, key: &ObservationKey, deadline: Timestamp) -> AttributionResult<bool> {
        self.check(key)?;
        self.inner.expire_at(key, deadline).await
    }
}

/// In-memory backend whose reads stall for a per-hash delay.
///
/// Used to make concurrent queries complete out of submission order.
#[derive(Debug, Default)]
pub struct SlowBackend {
    inner: InMemoryObservationBackend,
    delays: HashMap<String, Duration>,
}

impl SlowBackend {
    pub fn new(delays: HashMap<String, Duration>) -> Self {
        Self {
            inner: InMemoryObservationBackend::new(),
            delays,
        }
    }
}

#[async_trait]
impl ObservationBackend for SlowBackend {
    async fn push_front(
        &self,
        key: &ObservationKey,
        value: Vec<u8>,
        now: Timestamp,
        deadline: Timestamp,
    ) -> AttributionResult<()> {
        self.inner.push_front(key, value, now, deadline).await
    }

    async fn range(&self, key: &ObservationKey, now: Timestamp) -> AttributionResult<Vec<Vec<u8>>> {
        if let Some(delay) = self.delays.get(key.hash()) {
            tokio::time::sleep(*delay).await;
        }
        self.inner.range(key, now).await
    }

    async fn expire_at(&self, key: &ObservationKey, deadline: Timestamp) -> AttributionResult<bool> {
        self.inner.expire_at(key, deadline).await
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made stores and recording helpers.

    use super::*;

    /// Project id used by fixtures.
    pub const PROJECT: ProjectId = ProjectId(1);

    /// Store over a fresh in-memory backend, default configuration.
    pub fn memory_store() -> Arc<ObservationStore<InMemoryObservationBackend>> {
        store_over(InMemoryObservationBackend::new())
    }

    /// Store over `backend`, default configuration.
    pub fn store_over<B: ObservationBackend>(backend: B) -> Arc<ObservationStore<B>> {
        match ObservationStore::with_defaults(Arc::new(backend)) {
            Ok(store) => Arc::new(store),
            Err(e) => panic!("default config must validate: {}", e),
        }
    }

    /// Record one observation per `(artifact_id, artifact_name, hash, file_path)`
    /// row, in order, all at `now`.
    pub async fn record_rows<B: ObservationBackend>(
        store: &ObservationStore<B>,
        project_id: ProjectId,
        rows: &[(i64, &str, &str, &str)],
        now: Timestamp,
    ) {
        for &(id, name, hash, path) in rows {
            if let Err(e) = store
                .record_at(project_id, ArtifactId(id), name, &[TrackedScript::new(hash, path)], now)
                .await
            {
                panic!("fixture record of {}/{} failed: {}", name, hash, e);
            }
        }
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating attribution types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a ProjectId.
    pub fn arb_project_id() -> impl Strategy<Value = ProjectId> {
        (1i64..10_000).prop_map(ProjectId)
    }

    /// Generate an ArtifactId from a small range so ids collide often.
    pub fn arb_artifact_id() -> impl Strategy<Value = ArtifactId> {
        (1i64..8).prop_map(ArtifactId)
    }

    /// Generate an artifact name from a small pool.
    pub fn arb_artifact_name() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["main", "vendor", "worker", "admin"]).prop_map(String::from)
    }

    /// Generate a hex content hash.
    pub fn arb_hash() -> impl Strategy<Value = String> {
        "[0-9a-f]{16}"
    }

    /// Generate a bundle-relative file path.
    pub fn arb_file_path() -> impl Strategy<Value = String> {
        "(static|dist)/[a-z]{1,8}\\.js"
    }

    /// Generate an Observation.
    pub fn arb_observation() -> impl Strategy<Value = Observation> {
        (arb_artifact_id(), arb_artifact_name(), arb_file_path())
            .prop_map(|(id, name, path)| Observation::new(id, name, path))
    }

    /// Generate a TrackedScript.
    pub fn arb_tracked_script() -> impl Strategy<Value = TrackedScript> {
        (arb_hash(), arb_file_path()).prop_map(|(hash, path)| TrackedScript::new(hash, path))
    }

    /// Generate a RuntimeScript.
    pub fn arb_runtime_script() -> impl Strategy<Value = RuntimeScript> {
        ("https://cdn\\.example\\.com/[a-z]{1,8}\\.js", arb_hash())
            .prop_map(|(url, hash)| RuntimeScript::new(url, hash))
    }

    /// Generate a config that passes validation.
    pub fn arb_valid_config() -> impl Strategy<Value = AttributionConfig> {
        (1u64..365, 1usize..64).prop_map(|(days, concurrency)| {
            AttributionConfig::new()
                .with_retention(Duration::from_secs(days * 86_400))
                .with_query_concurrency(concurrency)
        })
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for resolver output.

    use super::*;

    /// Assert that `resolved` was attributed to exactly this artifact.
    pub fn assert_resolved_to<S>(resolved: &ResolvedScript<S>, id: i64, name: &str, file_path: &str) {
        let expected = ArtifactRef {
            id: ArtifactId(id),
            name: name.to_string(),
            file_path: file_path.to_string(),
        };
        assert_eq!(resolved.artifact.as_ref(), Some(&expected));
    }

    /// Assert that `resolved` has no artifact.
    pub fn assert_unresolved<S>(resolved: &ResolvedScript<S>) {
        assert!(
            resolved.artifact.is_none(),
            "expected unresolved, got {:?}",
            resolved.artifact
        );
    }
}
