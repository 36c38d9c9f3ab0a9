use appforge_common::{ArtifactType, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One stored artifact as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub artifact_type: ArtifactType,
    pub version: u32,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub digest: String,
}

/// Summary record of a run's artifact set and outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub artifacts: Vec<ManifestEntry>,
}

impl RunManifest {
    pub fn with_project_name(mut self, name: &str) -> Self {
        self.project_name = Some(name.to_string());
        self
    }

    pub fn artifact_types(&self) -> Vec<ArtifactType> {
        self.artifacts.iter().map(|e| e.artifact_type).collect()
    }

    pub fn entry(&self, artifact_type: ArtifactType) -> Option<&ManifestEntry> {
        self.artifacts
            .iter()
            .find(|e| e.artifact_type == artifact_type)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
