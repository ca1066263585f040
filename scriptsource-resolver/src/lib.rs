//! Scriptsource Resolver
//!
//! Attributes runtime scripts to the build artifacts that produced them, using
//! the observations recorded in an [`ObservationStore`](scriptsource_storage::ObservationStore).
//!
//! Resolution is batch-wide: every observation for every script in the batch
//! votes, so scripts from the same deploy reinforce one another.

pub mod resolver;
pub mod tally;

pub use resolver::{Resolution, Resolver};
pub use tally::{attribute, RankedArtifact, VoteTally};
