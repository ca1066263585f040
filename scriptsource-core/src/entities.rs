//! Core entity structures

use crate::ArtifactId;
use serde::{Deserialize, Serialize};

/// A recorded fact: a build artifact produced a script with a given content
/// hash, at a given path inside the artifact.
///
/// Observations are immutable. The key they are stored under carries the
/// project and hash; the observation itself only holds the artifact side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observation {
    pub artifact_id: ArtifactId,
    pub artifact_name: String,
    pub file_path: String,
}

impl Observation {
    pub fn new(
        artifact_id: ArtifactId,
        artifact_name: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            artifact_id,
            artifact_name: artifact_name.into(),
            file_path: file_path.into(),
        }
    }

    /// Convert this observation into the artifact reference the resolver emits.
    pub fn to_artifact_ref(&self) -> ArtifactRef {
        ArtifactRef {
            id: self.artifact_id,
            name: self.artifact_name.clone(),
            file_path: self.file_path.clone(),
        }
    }
}

/// Candidate production source for a script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: ArtifactId,
    pub name: String,
    pub file_path: String,
}

/// One entry of an artifact's script-hash manifest, as passed to `record`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedScript {
    pub hash: String,
    pub file_path: String,
}

impl TrackedScript {
    pub fn new(hash: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            file_path: file_path.into(),
        }
    }
}

/// A script captured from a runtime trace: where it was loaded from and the
/// hash of its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeScript {
    pub url: String,
    pub hash: String,
}

impl RuntimeScript {
    pub fn new(url: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            hash: hash.into(),
        }
    }
}

/// Anything the resolver can attribute: an opaque payload carrying a content hash.
///
/// The resolver hands the payload back untouched, so callers can attach
/// whatever context they need (urls, frame ids, ...).
pub trait ScriptDescriptor {
    /// Content hash of the script. An empty hash is invalid input.
    fn hash(&self) -> &str;
}

impl ScriptDescriptor for String {
    fn hash(&self) -> &str {
        self
    }
}

impl ScriptDescriptor for str {
    fn hash(&self) -> &str {
        self
    }
}

impl<T: ScriptDescriptor + ?Sized> ScriptDescriptor for &T {
    fn hash(&self) -> &str {
        (**self).hash()
    }
}

impl ScriptDescriptor for RuntimeScript {
    fn hash(&self) -> &str {
        &self.hash
    }
}

impl ScriptDescriptor for TrackedScript {
    fn hash(&self) -> &str {
        &self.hash
    }
}

/// Resolver output for one input script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedScript<S> {
    pub script: S,
    /// `None` when no ranked artifact is backed by this script's own history.
    pub artifact: Option<ArtifactRef>,
}

impl<S> ResolvedScript<S> {
    pub fn resolved(script: S, artifact: ArtifactRef) -> Self {
        Self {
            script,
            artifact: Some(artifact),
        }
    }

    pub fn unresolved(script: S) -> Self {
        Self {
            script,
            artifact: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.artifact.is_some()
    }
}
