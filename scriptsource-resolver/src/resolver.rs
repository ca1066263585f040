//! Batch resolution of runtime scripts against recorded observations.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use scriptsource_core::{
    ArtifactId, AttributionConfig, AttributionResult, Observation, ProjectId, ResolvedScript,
    ScriptDescriptor, StorageError, Timestamp, ValidationError,
};
use scriptsource_storage::{ObservationBackend, ObservationStore};

use crate::tally::attribute;

/// Result of one `resolve` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<S> {
    /// One entry per input script, in input order.
    pub scripts: Vec<ResolvedScript<S>>,
    /// Scripts whose store query failed; they are reported unresolved.
    pub failed_queries: usize,
}

impl<S> Resolution<S> {
    fn empty() -> Self {
        Self {
            scripts: Vec::new(),
            failed_queries: 0,
        }
    }

    /// Distinct resolved artifact ids, in first-seen order.
    pub fn artifact_ids(&self) -> Vec<ArtifactId> {
        let mut seen = HashSet::new();
        self.scripts
            .iter()
            .filter_map(|s| s.artifact.as_ref())
            .map(|artifact| artifact.id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    pub fn resolved_count(&self) -> usize {
        self.scripts.iter().filter(|s| s.is_resolved()).count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.scripts.len() - self.resolved_count()
    }

    pub fn into_scripts(self) -> Vec<ResolvedScript<S>> {
        self.scripts
    }
}

/// Attributes batches of scripts to the build artifacts that most likely
/// produced them.
///
/// The resolver only reads from the store.
pub struct Resolver<B: ObservationBackend> {
    store: Arc<ObservationStore<B>>,
    query_concurrency: usize,
}

impl<B: ObservationBackend> Resolver<B> {
    /// Create a resolver reading from `store`.
    pub fn new(store: Arc<ObservationStore<B>>, config: &AttributionConfig) -> AttributionResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            query_concurrency: config.query_concurrency,
        })
    }

    /// Create a resolver with default configuration.
    pub fn with_defaults(store: Arc<ObservationStore<B>>) -> AttributionResult<Self> {
        Self::new(store, &AttributionConfig::default())
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &ObservationStore<B> {
        &self.store
    }

    /// Resolve `scripts` for `project_id`.
    pub async fn resolve<S: ScriptDescriptor>(
        &self,
        project_id: ProjectId,
        scripts: Vec<S>,
    ) -> AttributionResult<Resolution<S>> {
        self.resolve_at(project_id, scripts, Utc::now()).await
    }

    /// [`resolve`](Self::resolve) with an explicit clock for expiry checks.
    ///
    /// A script with an empty hash fails the whole call before any store
    /// access. A failed store query leaves its script unresolved; the call
    /// only fails as a whole if every query failed.
    pub async fn resolve_at<S: ScriptDescriptor>(
        &self,
        project_id: ProjectId,
        scripts: Vec<S>,
        now: Timestamp,
    ) -> AttributionResult<Resolution<S>> {
        if let Some(index) = scripts.iter().position(|s| s.hash().is_empty()) {
            return Err(ValidationError::RequiredFieldMissing {
                field: format!("scripts[{}].hash", index),
            }
            .into());
        }

        if scripts.is_empty() {
            return Ok(Resolution::empty());
        }

        // buffered() yields in submission order, whatever order queries finish in
        let results: Vec<AttributionResult<Vec<Observation>>> = stream::iter(
            scripts
                .iter()
                .map(|script| self.store.query_at(project_id, script.hash(), now)),
        )
        .buffered(self.query_concurrency)
        .collect()
        .await;

        let mut failed_queries = 0;
        let mut last_error = None;
        let mut ballots = Vec::with_capacity(results.len());
        for (script, result) in scripts.iter().zip(results) {
            match result {
                Ok(ballot) => ballots.push(ballot),
                Err(e) => {
                    tracing::warn!(
                        project_id = %project_id,
                        hash = %script.hash(),
                        error = %e,
                        "Observation query failed, script left unresolved"
                    );
                    failed_queries += 1;
                    last_error = Some(e);
                    ballots.push(Vec::new());
                }
            }
        }

        if failed_queries == scripts.len() {
            let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(StorageError::Unavailable {
                reason: format!("all {} observation queries failed: {}", failed_queries, reason),
            }
            .into());
        }

        let resolution = Resolution {
            scripts: attribute(scripts, &ballots),
            failed_queries,
        };

        tracing::debug!(
            project_id = %project_id,
            scripts = resolution.scripts.len(),
            resolved = resolution.resolved_count(),
            failed_queries,
            "Resolved script batch"
        );

        Ok(resolution)
    }
}
