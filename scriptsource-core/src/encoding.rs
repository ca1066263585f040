//! Observation wire encoding.
//!
//! Observations are stored as small JSON objects:
//!
//! ```text
//! {"v":1,"aId":10,"aName":"main","path":"dist/main.js"}
//! ```
//!
//! Entries written before the version field existed carry no `v` and are
//! read as version 1.

use crate::{ArtifactId, AttributionResult, Observation, StorageError};
use serde::{Deserialize, Serialize};

/// Current encoding version written by [`encode_observation`].
pub const ENCODING_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct WireObservation {
    #[serde(default = "legacy_version")]
    v: u32,
    #[serde(rename = "aId")]
    artifact_id: i64,
    #[serde(rename = "aName")]
    artifact_name: String,
    path: String,
}

fn legacy_version() -> u32 {
    1
}

/// Encode an observation for storage.
pub fn encode_observation(observation: &Observation) -> AttributionResult<Vec<u8>> {
    let wire = WireObservation {
        v: ENCODING_VERSION,
        artifact_id: observation.artifact_id.as_i64(),
        artifact_name: observation.artifact_name.clone(),
        path: observation.file_path.clone(),
    };
    serde_json::to_vec(&wire).map_err(|e| {
        StorageError::Codec {
            reason: e.to_string(),
        }
        .into()
    })
}

/// Decode a stored observation.
///
/// Fails with [`StorageError::Codec`] on malformed bytes or an unknown version.
pub fn decode_observation(bytes: &[u8]) -> AttributionResult<Observation> {
    let wire: WireObservation = serde_json::from_slice(bytes).map_err(|e| StorageError::Codec {
        reason: e.to_string(),
    })?;

    if wire.v != ENCODING_VERSION {
        return Err(StorageError::Codec {
            reason: format!("unsupported observation encoding version {}", wire.v),
        }
        .into());
    }

    Ok(Observation {
        artifact_id: ArtifactId(wire.artifact_id),
        artifact_name: wire.artifact_name,
        file_path: wire.path,
    })
}
