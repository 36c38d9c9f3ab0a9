use appforge_common::{ArtifactType, OwnershipLevel};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::registry::ContractRegistry;
use super::schema::json_kind;
use crate::artifact::ArtifactStore;
use crate::errors::ContractViolationError;

/// Gatekeeper consulted before any artifact is persisted.
///
/// Creation is deliberately less strict than overwrite: any agent whose
/// contract mentions the artifact type may produce it the first time, but
/// replacing existing work requires `owner`.
#[derive(Debug, Clone)]
pub struct ContractEnforcer {
    registry: Arc<ContractRegistry>,
}

impl ContractEnforcer {
    pub fn new(registry: Arc<ContractRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Reject payloads that are not JSON objects or do not match the
    /// registered schema for `artifact_type`.
    pub fn validate_artifact(
        &self,
        artifact_type: ArtifactType,
        data: &Value,
    ) -> Result<(), ContractViolationError> {
        if !data.is_object() {
            return Err(ContractViolationError::NotAnObject {
                artifact_type,
                found: json_kind(data),
            });
        }

        if let Some(schema) = self.registry.schema(artifact_type) {
            let problems = schema.problems(data);
            if !problems.is_empty() {
                return Err(ContractViolationError::SchemaMismatch {
                    artifact_type,
                    problems,
                });
            }
        }

        Ok(())
    }

    pub fn has_ownership(&self, agent_id: &str, artifact_type: ArtifactType) -> bool {
        self.get_ownership_level(agent_id, artifact_type)
            .is_some_and(|level| level.is_owner())
    }

    pub fn get_ownership_level(
        &self,
        agent_id: &str,
        artifact_type: ArtifactType,
    ) -> Option<OwnershipLevel> {
        self.registry.ownership_level(agent_id, artifact_type)
    }

    /// Check that `agent_id` may write `artifact_type`.
    ///
    /// Overwrites require `owner`. First writes require only that the agent's
    /// contract declares some ownership level for the type.
    pub fn enforce_ownership(
        &self,
        agent_id: &str,
        artifact_type: ArtifactType,
        is_overwrite: bool,
    ) -> Result<(), ContractViolationError> {
        let level = self.get_ownership_level(agent_id, artifact_type);

        if is_overwrite {
            if level.is_some_and(|l| l.is_owner()) {
                return Ok(());
            }
            return Err(ContractViolationError::OverwriteWithoutOwnership {
                agent_id: agent_id.to_string(),
                artifact_type,
                level: level.unwrap_or_default(),
            });
        }

        match level {
            Some(_) => Ok(()),
            None => Err(ContractViolationError::NoDeclaredAccess {
                agent_id: agent_id.to_string(),
                artifact_type,
            }),
        }
    }

    /// Collect the inputs `agent_id` is allowed to read from `store`.
    ///
    /// Only artifact types listed in the agent's contract are included, and a
    /// missing required input is a violation.
    pub fn collect_inputs(
        &self,
        agent_id: &str,
        store: &ArtifactStore,
    ) -> Result<BTreeMap<ArtifactType, Value>, ContractViolationError> {
        let contract =
            self.registry
                .contract(agent_id)
                .ok_or_else(|| ContractViolationError::UnknownAgent {
                    agent_id: agent_id.to_string(),
                })?;

        let mut inputs = BTreeMap::new();
        for requirement in &contract.inputs {
            match store.get(requirement.artifact_type) {
                Some(data) => {
                    inputs.insert(requirement.artifact_type, data.clone());
                }
                None if requirement.required => {
                    return Err(ContractViolationError::MissingRequiredInput {
                        agent_id: agent_id.to_string(),
                        artifact_type: requirement.artifact_type,
                    });
                }
                None => {}
            }
        }
        Ok(inputs)
    }
}
