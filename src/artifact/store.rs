use appforge_common::{ArtifactType, OwnershipLevel, RunStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::Artifact;
use super::manifest::{ManifestEntry, RunManifest};
use crate::contract::ContractRegistry;

/// In-memory artifact storage for a single run, keyed by artifact type.
///
/// At most one artifact per type exists at a time. The store never rejects a
/// write; callers check contracts before calling [`ArtifactStore::put`].
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    run_id: String,
    created_at: DateTime<Utc>,
    registry: Arc<ContractRegistry>,
    artifacts: BTreeMap<ArtifactType, Artifact>,
}

impl ArtifactStore {
    pub fn new(run_id: &str, registry: Arc<ContractRegistry>) -> Self {
        Self {
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            registry,
            artifacts: BTreeMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Store `data` as the current `artifact_type` artifact.
    ///
    /// An existing artifact is replaced wholesale with its version bumped;
    /// otherwise a new artifact starts at version 1.
    pub fn put(&mut self, artifact_type: ArtifactType, data: Value, created_by: &str) -> &Artifact {
        let artifact = match self.artifacts.remove(&artifact_type) {
            Some(previous) => Artifact {
                artifact_type,
                data,
                created_by: created_by.to_string(),
                created_at: previous.created_at,
                updated_at: Utc::now(),
                version: previous.version + 1,
            },
            None => Artifact::new(artifact_type, data, created_by),
        };

        tracing::debug!(
            run_id = %self.run_id,
            artifact = %artifact_type,
            version = artifact.version,
            created_by,
            "stored artifact"
        );

        self.artifacts.entry(artifact_type).or_insert(artifact)
    }

    pub fn get(&self, artifact_type: ArtifactType) -> Option<&Value> {
        self.artifacts.get(&artifact_type).map(|a| &a.data)
    }

    pub fn artifact(&self, artifact_type: ArtifactType) -> Option<&Artifact> {
        self.artifacts.get(&artifact_type)
    }

    pub fn has(&self, artifact_type: ArtifactType) -> bool {
        self.artifacts.contains_key(&artifact_type)
    }

    /// The agent's ownership level for `artifact_type` from the contract
    /// registry, `ReadOnly` when undeclared.
    pub fn get_access(&self, agent_id: &str, artifact_type: ArtifactType) -> OwnershipLevel {
        self.registry.access(agent_id, artifact_type)
    }

    /// Stored artifact types, in pipeline order.
    pub fn types(&self) -> Vec<ArtifactType> {
        self.artifacts.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Copy of every stored payload.
    pub fn snapshot(&self) -> BTreeMap<ArtifactType, Value> {
        self.artifacts
            .iter()
            .map(|(t, a)| (*t, a.data.clone()))
            .collect()
    }

    /// Summarize the stored artifacts under `status`.
    ///
    /// Terminal statuses are stamped with a finish time.
    pub fn build_manifest(&self, status: RunStatus) -> RunManifest {
        let artifacts = self
            .artifacts
            .values()
            .map(|a| ManifestEntry {
                artifact_type: a.artifact_type,
                version: a.version,
                created_by: a.created_by.clone(),
                updated_at: a.updated_at,
                digest: a.digest(),
            })
            .collect();

        RunManifest {
            run_id: self.run_id.clone(),
            project_name: None,
            status,
            created_at: self.created_at,
            finished_at: status.is_terminal().then(Utc::now),
            artifacts,
        }
    }

    /// Drop every artifact of the run.
    pub fn reset(&mut self) {
        tracing::debug!(run_id = %self.run_id, count = self.artifacts.len(), "reset artifact store");
        self.artifacts.clear();
    }

    pub fn into_data(self) -> BTreeMap<ArtifactType, Value> {
        self.artifacts
            .into_iter()
            .map(|(t, a)| (t, a.data))
            .collect()
    }
}
