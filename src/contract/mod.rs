//! Agent contracts and their enforcement.
//!
//! - [`registry`]: the static table of per-agent inputs, outputs and ownership
//! - [`schema`]: required payload shape per artifact type
//! - [`enforcer`]: validation and ownership checks applied before every write
//!
//! ## Example
//!
//! ```
//! use appforge::contract::{ContractEnforcer, ContractRegistry, agent_ids};
//! use appforge_common::ArtifactType;
//!
//! let enforcer = ContractEnforcer::new(ContractRegistry::builtin());
//!
//! // Only the owner may overwrite an existing PRD.
//! assert!(enforcer.enforce_ownership(agent_ids::PRODUCT_MANAGER, ArtifactType::Prd, true).is_ok());
//! assert!(enforcer.enforce_ownership(agent_ids::ARCHITECT, ArtifactType::Prd, true).is_err());
//! ```

pub mod enforcer;
pub mod registry;
pub mod schema;

pub use enforcer::ContractEnforcer;
pub use registry::{AgentContract, ArtifactRequirement, ContractRegistry, agent_ids};
pub use schema::{ArtifactSchema, FieldKind, FieldSpec};
