//! Observation store: record which artifact produced which script hash, and
//! read that history back.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use scriptsource_core::{
    decode_observation, encode_observation, ArtifactId, AttributionConfig, AttributionError,
    AttributionResult, ConfigError, Observation, ProjectId, StorageError, Timestamp, TrackedScript,
    ValidationError,
};

use crate::backend::ObservationBackend;
use crate::key::ObservationKey;

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Observations successfully appended.
    pub records: u64,
    /// Queries issued.
    pub queries: u64,
    /// Queries that returned at least one observation.
    pub hits: u64,
    /// Queries that returned nothing (absent or expired key).
    pub misses: u64,
    /// Backend or codec failures, on either path.
    pub failures: u64,
}

impl StoreStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// One script of a `record` call that could not be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub hash: String,
    pub error: AttributionError,
}

/// Outcome of a `record` call.
///
/// Recording is not transactional across scripts: earlier appends stay in
/// place when a later one fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordReport {
    /// Scripts appended with their key expiry refreshed.
    pub recorded: usize,
    pub failures: Vec<RecordFailure>,
}

impl RecordReport {
    /// True when every script was recorded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Per-project, per-hash observation lists with a sliding expiry.
///
/// The backend handle is shared and outlives the store; the store only
/// holds an `Arc` to it.
pub struct ObservationStore<B: ObservationBackend> {
    backend: Arc<B>,
    key_prefix: String,
    retention: chrono::Duration,
    stats: Arc<RwLock<StoreStats>>,
}

impl<B: ObservationBackend> ObservationStore<B> {
    /// Create a store over `backend`.
    ///
    /// Fails if `config` does not validate.
    pub fn new(backend: Arc<B>, config: &AttributionConfig) -> AttributionResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            key_prefix: config.key_prefix.clone(),
            retention: config.retention_delta()?,
            stats: Arc::new(RwLock::new(StoreStats::default())),
        })
    }

    /// Create a store with default configuration.
    pub fn with_defaults(backend: Arc<B>) -> AttributionResult<Self> {
        Self::new(backend, &AttributionConfig::default())
    }

    /// Get a reference to the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Key under which observations for `(project_id, hash)` live.
    pub fn key(&self, project_id: ProjectId, hash: &str) -> ObservationKey {
        ObservationKey::new(&self.key_prefix, project_id, hash)
    }

    /// Snapshot of usage counters.
    pub fn stats(&self) -> StoreStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Record that `artifact_id`/`artifact_name` produced every script in `scripts`.
    pub async fn record(
        &self,
        project_id: ProjectId,
        artifact_id: ArtifactId,
        artifact_name: &str,
        scripts: &[TrackedScript],
    ) -> AttributionResult<RecordReport> {
        self.record_at(project_id, artifact_id, artifact_name, scripts, Utc::now())
            .await
    }

    /// [`record`](Self::record) with an explicit clock.
    ///
    /// Each script is appended to the front of its key's list and the key's
    /// expiry is reset to `now + retention` in the same backend write. A failure is logged and reported
    /// per script; the call only fails as a whole when every script failed,
    /// or when the input is invalid (nothing is written in that case).
    pub async fn record_at(
        &self,
        project_id: ProjectId,
        artifact_id: ArtifactId,
        artifact_name: &str,
        scripts: &[TrackedScript],
        now: Timestamp,
    ) -> AttributionResult<RecordReport> {
        if artifact_name.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "artifact_name".to_string(),
            }
            .into());
        }
        if let Some(index) = scripts.iter().position(|s| s.hash.is_empty()) {
            return Err(ValidationError::RequiredFieldMissing {
                field: format!("scripts[{}].hash", index),
            }
            .into());
        }

        let deadline = now.checked_add_signed(self.retention).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "retention".to_string(),
                value: self.retention.to_string(),
                reason: format!("deadline overflows when recording at {}", now),
            }
        })?;
        let mut report = RecordReport::default();

        for script in scripts {
            let key = self.key(project_id, &script.hash);
            let observation = Observation::new(artifact_id, artifact_name, script.file_path.as_str());

            match self.append(&key, &observation, now, deadline).await {
                Ok(()) => {
                    report.recorded += 1;
                    self.bump(|s| s.records += 1);
                }
                Err(e) => {
                    tracing::warn!(
                        project_id = %project_id,
                        artifact_id = %artifact_id,
                        hash = %script.hash,
                        error = %e,
                        "Failed to record script observation"
                    );
                    self.bump(|s| s.failures += 1);
                    report.failures.push(RecordFailure {
                        hash: script.hash.clone(),
                        error: e,
                    });
                }
            }
        }

        if !scripts.is_empty() && report.recorded == 0 {
            let reason = report
                .failures
                .last()
                .map(|f| f.error.to_string())
                .unwrap_or_default();
            return Err(StorageError::Unavailable {
                reason: format!("all {} script observations failed: {}", scripts.len(), reason),
            }
            .into());
        }

        tracing::debug!(
            project_id = %project_id,
            artifact_id = %artifact_id,
            recorded = report.recorded,
            failed = report.failures.len(),
            "Recorded artifact script observations"
        );

        Ok(report)
    }

    async fn append(
        &self,
        key: &ObservationKey,
        observation: &Observation,
        now: Timestamp,
        deadline: Timestamp,
    ) -> AttributionResult<()> {
        let bytes = encode_observation(observation)?;
        self.backend.push_front(key, bytes, now, deadline).await
    }

    /// All observations for `(project_id, hash)`, most recent first.
    ///
    /// An absent or expired key yields an empty list. Backend failures are
    /// returned as errors, never as an empty list.
    pub async fn query(&self, project_id: ProjectId, hash: &str) -> AttributionResult<Vec<Observation>> {
        self.query_at(project_id, hash, Utc::now()).await
    }

    /// [`query`](Self::query) with an explicit clock.
    pub async fn query_at(
        &self,
        project_id: ProjectId,
        hash: &str,
        now: Timestamp,
    ) -> AttributionResult<Vec<Observation>> {
        self.bump(|s| s.queries += 1);

        let key = self.key(project_id, hash);
        let result = match self.backend.range(&key, now).await {
            Ok(entries) => entries
                .iter()
                .map(|bytes| decode_observation(bytes))
                .collect::<AttributionResult<Vec<_>>>(),
            Err(e) => Err(e),
        };

        match &result {
            Ok(observations) if observations.is_empty() => self.bump(|s| s.misses += 1),
            Ok(_) => self.bump(|s| s.hits += 1),
            Err(_) => self.bump(|s| s.failures += 1),
        }

        result
    }

    fn bump(&self, update: impl FnOnce(&mut StoreStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryObservationBackend;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use std::time::Duration as StdDuration;

    fn store() -> ObservationStore<InMemoryObservationBackend> {
        ObservationStore::with_defaults(Arc::new(InMemoryObservationBackend::new()))
            .expect("default config should validate")
    }

    /// Backend that fails every access to hashes starting with "bad", and
    /// every `expire_at`.
    struct PickyBackend {
        inner: InMemoryObservationBackend,
    }

    #[async_trait]
    impl ObservationBackend for PickyBackend {
        async fn push_front(
            &self,
            key: &ObservationKey,
            value: Vec<u8>,
            now: Timestamp,
            deadline: Timestamp,
        ) -> AttributionResult<()> {
            if key.hash().starts_with("bad") {
                return Err(StorageError::Unavailable {
                    reason: "connection reset".to_string(),
                }
                .into());
            }
            self.inner.push_front(key, value, now, deadline).await
        }

        async fn range(
            &self,
            key: &ObservationKey,
            now: Timestamp,
        ) -> AttributionResult<Vec<Vec<u8>>> {
            if key.hash().starts_with("bad") {
                return Err(StorageError::Unavailable {
                    reason: "connection reset".to_string(),
                }
                .into());
            }
            self.inner.range(key, now).await
        }

        async fn expire_at(
            &self,
            _key: &ObservationKey,
            _deadline: Timestamp,
        ) -> AttributionResult<bool> {
            Err(StorageError::Unavailable {
                reason: "expire timed out".to_string(),
            }
            .into())
        }
    }

    fn picky_store() -> ObservationStore<PickyBackend> {
        ObservationStore::with_defaults(Arc::new(PickyBackend {
            inner: InMemoryObservationBackend::new(),
        }))
        .expect("default config should validate")
    }

    #[tokio::test]
    async fn test_query_returns_most_recent_first() {
        let store = store();
        let project = ProjectId(1);

        store
            .record(project, ArtifactId(1), "main", &[TrackedScript::new("h", "one.js")])
            .await
            .expect("record should succeed");
        store
            .record(project, ArtifactId(2), "main", &[TrackedScript::new("h", "two.js")])
            .await
            .expect("record should succeed");

        let observations = store.query(project, "h").await.expect("query should succeed");
        assert_eq!(
            observations,
            vec![
                Observation::new(ArtifactId(2), "main", "two.js"),
                Observation::new(ArtifactId(1), "main", "one.js"),
            ]
        );
    }

    #[tokio::test]
    async fn test_query_unknown_hash_is_empty() {
        let store = store();
        let observations = store
            .query(ProjectId(1), "never-written")
            .await
            .expect("query should succeed");
        assert!(observations.is_empty());
    }

    #[tokio::test]
    async fn test_projects_are_isolated() {
        let store = store();
        store
            .record(ProjectId(1), ArtifactId(1), "main", &[TrackedScript::new("h", "a.js")])
            .await
            .expect("record should succeed");

        let other = store.query(ProjectId(2), "h").await.expect("query should succeed");
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_key_expires_sixty_days_after_last_write() {
        let store = store();
        let project = ProjectId(1);
        let t0 = Utc::now();

        store
            .record_at(project, ArtifactId(1), "main", &[TrackedScript::new("h", "a.js")], t0)
            .await
            .expect("record should succeed");

        let day_59 = t0 + Duration::days(59);
        assert_eq!(store.query_at(project, "h", day_59).await.expect("query").len(), 1);

        let day_61 = t0 + Duration::days(61);
        assert!(store.query_at(project, "h", day_61).await.expect("query").is_empty());
    }

    #[tokio::test]
    async fn test_new_write_refreshes_whole_key() {
        let store = store();
        let project = ProjectId(1);
        let t0 = Utc::now();

        store
            .record_at(project, ArtifactId(1), "main", &[TrackedScript::new("h", "a.js")], t0)
            .await
            .expect("record should succeed");
        let t1 = t0 + Duration::days(50);
        store
            .record_at(project, ArtifactId(2), "main", &[TrackedScript::new("h", "b.js")], t1)
            .await
            .expect("record should succeed");

        // 70 days after the first write, both entries are still alive.
        let t2 = t0 + Duration::days(70);
        assert_eq!(store.query_at(project, "h", t2).await.expect("query").len(), 2);

        let deadline = store.backend().deadline(&store.key(project, "h"));
        assert_eq!(deadline, Some(t1 + Duration::days(60)));
    }

    #[tokio::test]
    async fn test_custom_retention() {
        let config = AttributionConfig::new().with_retention(StdDuration::from_secs(3600));
        let store = ObservationStore::new(Arc::new(InMemoryObservationBackend::new()), &config)
            .expect("config should validate");
        let t0 = Utc::now();

        store
            .record_at(ProjectId(1), ArtifactId(1), "main", &[TrackedScript::new("h", "a.js")], t0)
            .await
            .expect("record should succeed");

        assert!(store
            .query_at(ProjectId(1), "h", t0 + Duration::hours(2))
            .await
            .expect("query")
            .is_empty());
    }

    #[tokio::test]
    async fn test_record_rejects_missing_hash_before_writing() {
        let store = store();
        let scripts = [TrackedScript::new("ok", "a.js"), TrackedScript::new("", "b.js")];

        let err = store
            .record(ProjectId(1), ArtifactId(1), "main", &scripts)
            .await
            .expect_err("missing hash should be rejected");
        assert_eq!(
            err,
            AttributionError::Validation(ValidationError::RequiredFieldMissing {
                field: "scripts[1].hash".to_string()
            })
        );
        assert_eq!(store.backend().key_count(), 0);
    }

    #[tokio::test]
    async fn test_record_rejects_empty_artifact_name() {
        let store = store();
        let result = store
            .record(ProjectId(1), ArtifactId(1), "", &[TrackedScript::new("h", "a.js")])
            .await;
        assert!(matches!(result, Err(AttributionError::Validation(_))));
    }

    #[tokio::test]
    async fn test_record_empty_manifest_is_noop() {
        let store = store();
        let report = store
            .record(ProjectId(1), ArtifactId(1), "main", &[])
            .await
            .expect("empty manifest should succeed");
        assert_eq!(report.recorded, 0);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_record_partial_failure_keeps_earlier_appends() {
        let store = picky_store();
        let scripts = [
            TrackedScript::new("good-1", "a.js"),
            TrackedScript::new("bad-1", "b.js"),
            TrackedScript::new("good-2", "c.js"),
        ];

        let report = store
            .record(ProjectId(1), ArtifactId(9), "main", &scripts)
            .await
            .expect("partial success should not be an error");

        assert_eq!(report.recorded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].hash, "bad-1");
        assert!(report.failures[0].error.is_unavailable());
        assert_eq!(store.backend().inner.key_count(), 2);
        assert_eq!(store.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_record_total_failure_is_an_error() {
        let store = picky_store();
        let scripts = [TrackedScript::new("bad-1", "a.js"), TrackedScript::new("bad-2", "b.js")];

        let err = store
            .record(ProjectId(1), ArtifactId(9), "main", &scripts)
            .await
            .expect_err("every append failed");
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_recorded_entry_expires_without_expire_call() {
        let store = picky_store();
        let project = ProjectId(1);
        let t0 = Utc::now();

        let report = store
            .record_at(project, ArtifactId(4), "main", &[TrackedScript::new("h", "a.js")], t0)
            .await
            .expect("record should succeed");
        assert!(report.is_complete());
        assert_eq!(
            store.backend().inner.deadline(&store.key(project, "h")),
            Some(t0 + Duration::days(60))
        );

        assert_eq!(store.query_at(project, "h", t0).await.expect("query").len(), 1);
        assert!(store
            .query_at(project, "h", t0 + Duration::days(400))
            .await
            .expect("query")
            .is_empty());
    }

    #[tokio::test]
    async fn test_deadline_overflow_is_an_error_not_a_panic() {
        let store = store();
        let near_end_of_time = DateTime::<Utc>::MAX_UTC - Duration::days(1);

        let scripts = [TrackedScript::new("h", "a.js")];

        let err = store
            .record_at(ProjectId(1), ArtifactId(1), "main", &scripts, near_end_of_time)
            .await
            .expect_err("deadline past the representable range");
        assert!(matches!(err, AttributionError::Config(_)));
        assert_eq!(store.backend().key_count(), 0);
    }

    #[tokio::test]
    async fn test_query_failure_is_not_empty_result() {
        let store = picky_store();
        let result = store.query(ProjectId(1), "bad-hash").await;
        assert!(matches!(result, Err(ref e) if e.is_unavailable()));
        assert_eq!(store.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_surfaces_codec_error() {
        let backend = Arc::new(InMemoryObservationBackend::new());
        let store = ObservationStore::with_defaults(Arc::clone(&backend))
            .expect("default config should validate");
        let key = store.key(ProjectId(1), "h");
        let now = Utc::now();
        backend
            .push_front(&key, b"{broken".to_vec(), now, now + Duration::days(1))
            .await
            .expect("push should succeed");

        let result = store.query(ProjectId(1), "h").await;
        assert!(matches!(
            result,
            Err(AttributionError::Storage(StorageError::Codec { .. }))
        ));
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let store = store();
        store
            .record(ProjectId(1), ArtifactId(1), "main", &[TrackedScript::new("h", "a.js")])
            .await
            .expect("record should succeed");

        let _ = store.query(ProjectId(1), "h").await;
        let _ = store.query(ProjectId(1), "h").await;
        let _ = store.query(ProjectId(1), "other").await;

        let stats = store.stats();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.queries, 3);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AttributionConfig::new().with_key_prefix("");
        let result = ObservationStore::new(Arc::new(InMemoryObservationBackend::new()), &config);
        assert!(matches!(result, Err(AttributionError::Config(_))));
    }
}
