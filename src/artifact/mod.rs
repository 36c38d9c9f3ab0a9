//! Typed, versioned artifacts and the per-run store that holds them.

pub mod manifest;
pub mod persist;
pub mod store;

pub use manifest::{ManifestEntry, RunManifest};
pub use persist::{read_manifest, run_dir, write_run};
pub use store::ArtifactStore;

use appforge_common::ArtifactType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A document produced by one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_type: ArtifactType,
    pub data: Value,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Starts at 1 and increases by one on every overwrite.
    pub version: u32,
}

impl Artifact {
    pub fn new(artifact_type: ArtifactType, data: Value, created_by: &str) -> Self {
        let now = Utc::now();
        Self {
            artifact_type,
            data,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Hex SHA-256 of the payload's compact JSON encoding.
    pub fn digest(&self) -> String {
        payload_digest(&self.data)
    }
}

/// Hex SHA-256 of a JSON payload.
///
/// Object keys serialize in sorted order, so equal payloads hash equally.
pub fn payload_digest(data: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
