//! Project-scoped observation keys.
//!
//! An `ObservationKey` can only be built from a `ProjectId` and a script
//! hash, so every backend access is namespaced by project by construction.

use scriptsource_core::ProjectId;

/// Separator between the project id and the script hash.
const SEPARATOR: char = ':';

/// Backend key for the observation list of one `(project, hash)` pair.
///
/// # Format
///
/// `{prefix}{project_id}:{hash}`, e.g. `SM:42:9f2c...`. The prefix comes
/// from configuration and keeps observation keys apart from anything else
/// sharing the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObservationKey {
    inner: KeyInner,
}

/// Private inner struct - prevents external construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KeyInner {
    project_id: ProjectId,
    hash: String,
    rendered: String,
}

impl ObservationKey {
    /// Create the key for `hash` within `project_id`.
    pub fn new(prefix: &str, project_id: ProjectId, hash: &str) -> Self {
        let rendered = format!("{}{}{}{}", prefix, project_id, SEPARATOR, hash);
        Self {
            inner: KeyInner {
                project_id,
                hash: hash.to_string(),
                rendered,
            },
        }
    }

    /// Project this key is scoped to.
    pub fn project_id(&self) -> ProjectId {
        self.inner.project_id
    }

    /// Script content hash.
    pub fn hash(&self) -> &str {
        &self.inner.hash
    }

    /// Full backend key.
    pub fn as_str(&self) -> &str {
        &self.inner.rendered
    }

    /// Backend key as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.rendered.as_bytes()
    }
}

impl std::fmt::Display for ObservationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
