//! Scriptsource Core - Attribution Types
//!
//! Pure data structures shared by the observation store and the resolver.
//! This crate contains no I/O: identifiers, observations, errors,
//! configuration and the observation wire encoding.

pub mod config;
pub mod encoding;
pub mod entities;
pub mod error;
pub mod identity;

pub use config::AttributionConfig;
pub use encoding::{decode_observation, encode_observation, ENCODING_VERSION};
pub use entities::{
    ArtifactRef, Observation, ResolvedScript, RuntimeScript, ScriptDescriptor, TrackedScript,
};
pub use error::{
    AttributionError, AttributionResult, ConfigError, StorageError, ValidationError,
};
pub use identity::{ArtifactId, ProjectId, Timestamp};
