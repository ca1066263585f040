//! Scriptsource Storage - Observation Store
//!
//! Append-only, project-scoped lists of "which artifact produced this script
//! hash" observations, with a sliding expiry refreshed on every write.
//!
//! # Tenant Isolation
//!
//! Every backend access goes through an [`ObservationKey`], which can only be
//! built from a project id and a hash. Two projects never share a key.
//!
//! # Example
//!
//! ```ignore
//! let store = ObservationStore::with_defaults(Arc::new(InMemoryObservationBackend::new()))?;
//!
//! store.record(project, ArtifactId(10), "main", &[TrackedScript::new("h1", "a.js")]).await?;
//! let ballot = store.query(project, "h1").await?;
//! ```

pub mod backend;
pub mod key;
pub mod store;

pub use backend::{
    InMemoryObservationBackend, LmdbObservationBackend, LmdbObservationError, ObservationBackend,
};
pub use key::ObservationKey;
pub use store::{ObservationStore, RecordFailure, RecordReport, StoreStats};
