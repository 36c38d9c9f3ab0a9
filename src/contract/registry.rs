//! Static table of agent contracts.
//!
//! Each persona declares which artifact types it may read, which it produces,
//! and its ownership level per type. The built-in registry is initialised once
//! and never mutated afterwards, so it is shared freely across concurrent runs.

use appforge_common::{ArtifactType, OwnershipLevel};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use super::schema::{ArtifactSchema, builtin_schemas};

/// Agent identifiers of the built-in personas.
pub mod agent_ids {
    pub const PRODUCT_MANAGER: &str = "alex_pm";
    pub const ARCHITECT: &str = "sam_architect";
    pub const DESIGNER: &str = "jordan_designer";
    pub const BACKEND_ENGINEER: &str = "riley_backend";
    pub const FRONTEND_ENGINEER: &str = "casey_frontend";
    pub const SECURITY_ENGINEER: &str = "taylor_security";
    pub const QA_ENGINEER: &str = "quinn_qa";
    /// The pipeline itself, which records verification results and the manifest.
    pub const ORCHESTRATOR: &str = "orchestrator";
}

/// An artifact type an agent reads or writes, and whether it must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArtifactRequirement {
    pub artifact_type: ArtifactType,
    pub required: bool,
}

/// Static declaration of what one agent may do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentContract {
    pub agent_id: String,
    pub role: String,
    pub inputs: Vec<ArtifactRequirement>,
    pub outputs: Vec<ArtifactRequirement>,
    /// Documentation only; not mechanically checked.
    pub invariants: Vec<String>,
    /// Documentation only; not mechanically checked.
    pub forbidden_actions: Vec<String>,
    pub ownership: Vec<(ArtifactType, OwnershipLevel)>,
}

impl AgentContract {
    pub fn new(agent_id: &str, role: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            role: role.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            invariants: Vec::new(),
            forbidden_actions: Vec::new(),
            ownership: Vec::new(),
        }
    }

    pub fn reads(mut self, artifact_type: ArtifactType) -> Self {
        self.inputs.push(ArtifactRequirement {
            artifact_type,
            required: true,
        });
        self
    }

    pub fn reads_optional(mut self, artifact_type: ArtifactType) -> Self {
        self.inputs.push(ArtifactRequirement {
            artifact_type,
            required: false,
        });
        self
    }

    pub fn produces(mut self, artifact_type: ArtifactType) -> Self {
        self.outputs.push(ArtifactRequirement {
            artifact_type,
            required: true,
        });
        self
    }

    pub fn owns(mut self, artifact_type: ArtifactType, level: OwnershipLevel) -> Self {
        self.ownership.push((artifact_type, level));
        self
    }

    pub fn invariant(mut self, text: &str) -> Self {
        self.invariants.push(text.to_string());
        self
    }

    pub fn forbids(mut self, text: &str) -> Self {
        self.forbidden_actions.push(text.to_string());
        self
    }

    pub fn ownership_level(&self, artifact_type: ArtifactType) -> Option<OwnershipLevel> {
        self.ownership
            .iter()
            .find(|(t, _)| *t == artifact_type)
            .map(|(_, level)| *level)
    }
}

/// Read-only lookup of agent contracts and artifact schemas.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: BTreeMap<String, AgentContract>,
    schemas: BTreeMap<ArtifactType, ArtifactSchema>,
}

static BUILTIN: LazyLock<Arc<ContractRegistry>> =
    LazyLock::new(|| Arc::new(ContractRegistry::with_builtin_contracts()));

impl ContractRegistry {
    /// An empty registry, for assembling custom contract tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide built-in registry.
    pub fn builtin() -> Arc<ContractRegistry> {
        Arc::clone(&BUILTIN)
    }

    pub fn with_contract(mut self, contract: AgentContract) -> Self {
        self.contracts.insert(contract.agent_id.clone(), contract);
        self
    }

    pub fn with_schema(mut self, schema: ArtifactSchema) -> Self {
        self.schemas.insert(schema.artifact_type, schema);
        self
    }

    pub fn contract(&self, agent_id: &str) -> Option<&AgentContract> {
        self.contracts.get(agent_id)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &AgentContract> {
        self.contracts.values()
    }

    pub fn schema(&self, artifact_type: ArtifactType) -> Option<&ArtifactSchema> {
        self.schemas.get(&artifact_type)
    }

    /// The agent's declared ownership level for `artifact_type`, if any.
    pub fn ownership_level(
        &self,
        agent_id: &str,
        artifact_type: ArtifactType,
    ) -> Option<OwnershipLevel> {
        self.contract(agent_id)?.ownership_level(artifact_type)
    }

    /// Like [`Self::ownership_level`], but absent agents or mappings read as
    /// `ReadOnly`.
    pub fn access(&self, agent_id: &str, artifact_type: ArtifactType) -> OwnershipLevel {
        self.ownership_level(agent_id, artifact_type)
            .unwrap_or_default()
    }

    /// Agents that own `artifact_type`.
    pub fn owners_of(&self, artifact_type: ArtifactType) -> Vec<&str> {
        self.contracts
            .values()
            .filter(|c| c.ownership_level(artifact_type) == Some(OwnershipLevel::Owner))
            .map(|c| c.agent_id.as_str())
            .collect()
    }

    fn with_builtin_contracts() -> Self {
        use ArtifactType::*;
        use OwnershipLevel::*;
        use agent_ids::*;

        let mut registry = Self::new();
        for schema in builtin_schemas() {
            registry = registry.with_schema(schema);
        }

        registry
            .with_contract(
                AgentContract::new(PRODUCT_MANAGER, "Product Manager")
                    .produces(Prd)
                    .owns(Prd, Owner)
                    .owns(Architecture, ReadOnly)
                    .owns(UiSpec, ReadOnly)
                    .owns(TestPlan, ReadOnly)
                    .invariant("Every user-facing feature in the prompt appears in the PRD")
                    .forbids("Choosing frameworks or infrastructure"),
            )
            .with_contract(
                AgentContract::new(ARCHITECT, "Software Architect")
                    .reads(Prd)
                    .produces(Architecture)
                    .produces(ApiContract)
                    .owns(Architecture, Owner)
                    .owns(ApiContract, Owner)
                    .owns(Prd, ReadOnly)
                    .invariant("Every PRD feature maps to at least one component")
                    .invariant("Every endpoint in the API contract has a method and a path")
                    .forbids("Changing product scope"),
            )
            .with_contract(
                AgentContract::new(DESIGNER, "Product Designer")
                    .reads(Prd)
                    .reads(Architecture)
                    .reads_optional(ApiContract)
                    .produces(UiSpec)
                    .owns(UiSpec, Owner)
                    .owns(Prd, ReadOnly)
                    .owns(ApiContract, ReadOnly)
                    .invariant("Every screen names the data it displays")
                    .forbids("Adding endpoints to the API contract"),
            )
            .with_contract(
                AgentContract::new(BACKEND_ENGINEER, "Backend Engineer")
                    .reads_optional(Prd)
                    .reads(Architecture)
                    .reads(ApiContract)
                    .produces(BackendSpec)
                    .owns(BackendSpec, Owner)
                    .owns(ApiContract, ProposeOnly)
                    .owns(Architecture, ReadOnly)
                    .invariant("Every API endpoint is served by a service")
                    .forbids("Overwriting the API contract"),
            )
            .with_contract(
                AgentContract::new(FRONTEND_ENGINEER, "Frontend Engineer")
                    .reads_optional(Prd)
                    .reads(UiSpec)
                    .reads(ApiContract)
                    .reads_optional(BackendSpec)
                    .produces(MobileSpec)
                    .owns(MobileSpec, Owner)
                    .owns(UiSpec, ProposeOnly)
                    .owns(ApiContract, ReadOnly)
                    .invariant("Mobile screens are a subset of the UI spec screens")
                    .forbids("Calling endpoints absent from the API contract"),
            )
            .with_contract(
                AgentContract::new(SECURITY_ENGINEER, "Security Engineer")
                    .reads(Architecture)
                    .reads(ApiContract)
                    .reads_optional(BackendSpec)
                    .reads_optional(MobileSpec)
                    .produces(SecurityReport)
                    .owns(SecurityReport, Owner)
                    .owns(ApiContract, ReadOnly)
                    .owns(VerificationResult, ReadOnly)
                    .invariant("Every authenticated endpoint is listed with its auth scheme")
                    .forbids("Suppressing findings"),
            )
            .with_contract(
                AgentContract::new(QA_ENGINEER, "QA Engineer")
                    .reads(Prd)
                    .reads(ApiContract)
                    .reads_optional(UiSpec)
                    .reads_optional(BackendSpec)
                    .reads_optional(SecurityReport)
                    .reads_optional(VerificationResult)
                    .produces(TestPlan)
                    .owns(TestPlan, Owner)
                    .owns(VerificationResult, ProposeOnly)
                    .invariant("Every PRD feature has at least one test case")
                    .forbids("Marking failing checks as passed"),
            )
            .with_contract(
                AgentContract::new(ORCHESTRATOR, "Pipeline Orchestrator")
                    .reads_optional(Prd)
                    .reads_optional(Architecture)
                    .reads_optional(ApiContract)
                    .reads_optional(UiSpec)
                    .reads_optional(BackendSpec)
                    .reads_optional(MobileSpec)
                    .reads_optional(SecurityReport)
                    .reads_optional(TestPlan)
                    .produces(VerificationResult)
                    .produces(RunManifest)
                    .owns(VerificationResult, Owner)
                    .owns(RunManifest, Owner),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::agent_ids::*;
    use super::*;

    #[test]
    fn test_builtin_contracts_present() {
        let registry = ContractRegistry::builtin();
        for id in [
            PRODUCT_MANAGER,
            ARCHITECT,
            DESIGNER,
            BACKEND_ENGINEER,
            FRONTEND_ENGINEER,
            SECURITY_ENGINEER,
            QA_ENGINEER,
            ORCHESTRATOR,
        ] {
            assert!(registry.contract(id).is_some(), "missing contract {}", id);
        }
    }

    #[test]
    fn test_every_artifact_type_has_exactly_one_owner() {
        let registry = ContractRegistry::builtin();
        for t in ArtifactType::ALL {
            assert_eq!(registry.owners_of(t).len(), 1, "owners of {}", t);
        }
    }

    #[test]
    fn test_every_output_is_declared_in_ownership() {
        let registry = ContractRegistry::builtin();
        for contract in registry.contracts() {
            for output in &contract.outputs {
                assert_eq!(
                    contract.ownership_level(output.artifact_type),
                    Some(OwnershipLevel::Owner),
                    "{} produces {} without owning it",
                    contract.agent_id,
                    output.artifact_type
                );
            }
        }
    }

    #[test]
    fn test_access_defaults_to_read_only() {
        let registry = ContractRegistry::builtin();
        assert_eq!(
            registry.access(PRODUCT_MANAGER, ArtifactType::Prd),
            OwnershipLevel::Owner
        );
        assert_eq!(
            registry.access(PRODUCT_MANAGER, ArtifactType::SecurityReport),
            OwnershipLevel::ReadOnly
        );
        assert_eq!(
            registry.access("nobody", ArtifactType::Prd),
            OwnershipLevel::ReadOnly
        );
        assert_eq!(registry.ownership_level("nobody", ArtifactType::Prd), None);
    }

    #[test]
    fn test_builtin_is_shared() {
        let a = ContractRegistry::builtin();
        let b = ContractRegistry::builtin();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_custom_registry() {
        let registry = ContractRegistry::new().with_contract(
            AgentContract::new("solo", "Solo")
                .reads_optional(ArtifactType::Prd)
                .owns(ArtifactType::UiSpec, OwnershipLevel::ProposeOnly),
        );
        let contract = registry.contract("solo").unwrap();
        assert_eq!(contract.inputs.len(), 1);
        assert_eq!(contract.inputs[0].artifact_type, ArtifactType::Prd);
        assert!(!contract.inputs[0].required);
        assert_eq!(
            registry.ownership_level("solo", ArtifactType::UiSpec),
            Some(OwnershipLevel::ProposeOnly)
        );
        assert!(registry.schema(ArtifactType::Prd).is_none());
    }
}
