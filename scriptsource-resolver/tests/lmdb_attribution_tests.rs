//! End-to-end attribution over the LMDB backend.

use std::sync::Arc;

use chrono::{Duration, Utc};
use scriptsource_core::{ArtifactId, AttributionConfig, ProjectId, RuntimeScript, TrackedScript};
use scriptsource_resolver::Resolver;
use scriptsource_storage::{LmdbObservationBackend, ObservationStore};
use scriptsource_test_utils::assertions::{assert_resolved_to, assert_unresolved};
use tempfile::TempDir;

const PROJECT: ProjectId = ProjectId(42);

fn open_store(dir: &TempDir) -> Arc<ObservationStore<LmdbObservationBackend>> {
    let config = AttributionConfig::default();
    let backend = LmdbObservationBackend::new(dir.path(), config.lmdb_max_size_mb)
        .expect("failed to open LMDB environment");
    Arc::new(ObservationStore::new(Arc::new(backend), &config).expect("config should validate"))
}

#[tokio::test]
async fn test_deploy_then_resolve_over_lmdb() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let store = open_store(&dir);
    let now = Utc::now();

    let manifest = vec![
        TrackedScript::new("h-app", "static/app.js"),
        TrackedScript::new("h-vendor", "static/vendor.js"),
    ];
    let report = store
        .record_at(PROJECT, ArtifactId(7), "web", &manifest, now)
        .await
        .expect("record should succeed");
    assert!(report.is_complete());
    assert_eq!(report.recorded, 2);

    let resolver = Resolver::with_defaults(Arc::clone(&store)).expect("config should validate");
    let resolution = resolver
        .resolve_at(
            PROJECT,
            vec![
                RuntimeScript::new("https://cdn.test/app.js", "h-app"),
                RuntimeScript::new("https://cdn.test/vendor.js", "h-vendor"),
                RuntimeScript::new("https://cdn.test/ext.js", "h-extension"),
            ],
            now,
        )
        .await
        .expect("resolve should succeed");

    assert_resolved_to(&resolution.scripts[0], 7, "web", "static/app.js");
    assert_resolved_to(&resolution.scripts[1], 7, "web", "static/vendor.js");
    assert_unresolved(&resolution.scripts[2]);
    assert_eq!(resolution.artifact_ids(), vec![ArtifactId(7)]);
}

#[tokio::test]
async fn test_redeploy_moves_attribution_to_newer_build() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let store = open_store(&dir);
    let t0 = Utc::now();
    let t1 = t0 + Duration::hours(1);

    store
        .record_at(PROJECT, ArtifactId(10), "main", &[TrackedScript::new("h1", "a.js")], t0)
        .await
        .expect("record should succeed");
    store
        .record_at(PROJECT, ArtifactId(11), "main", &[TrackedScript::new("h1", "b.js")], t1)
        .await
        .expect("record should succeed");

    let resolver = Resolver::with_defaults(store).expect("config should validate");
    let resolution = resolver
        .resolve_at(PROJECT, vec!["h1"], t1)
        .await
        .expect("resolve should succeed");
    assert_resolved_to(&resolution.scripts[0], 11, "main", "b.js");
}

#[tokio::test]
async fn test_observations_survive_reopen_and_still_expire() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let t0 = Utc::now();
    {
        let store = open_store(&dir);
        store
            .record_at(PROJECT, ArtifactId(3), "main", &[TrackedScript::new("h1", "a.js")], t0)
            .await
            .expect("record should succeed");
    }

    let resolver = Resolver::with_defaults(open_store(&dir)).expect("config should validate");

    let before = resolver
        .resolve_at(PROJECT, vec!["h1"], t0 + Duration::days(30))
        .await
        .expect("resolve should succeed");
    assert_resolved_to(&before.scripts[0], 3, "main", "a.js");

    let after = resolver
        .resolve_at(PROJECT, vec!["h1"], t0 + Duration::days(60))
        .await
        .expect("resolve should succeed");
    assert_unresolved(&after.scripts[0]);
}
