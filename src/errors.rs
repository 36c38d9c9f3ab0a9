//! Typed error hierarchy for the appforge pipeline.
//!
//! Three enums cover the three failure surfaces:
//! - `ContractViolationError`: artifact shape or ownership rules broken
//! - `VerificationError`: misuse of the verification orchestrator
//! - `PipelineError`: anything that aborts a run

use std::time::Duration;

use appforge_common::{ArtifactType, CheckKind, Issue, OwnershipLevel, VerificationResult};
use thiserror::Error;

use crate::pipeline::Stage;

/// A write or read that the agent contracts do not allow.
///
/// Always fatal to the stage that triggered it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractViolationError {
    #[error("Contract violation: {artifact_type} payload must be a JSON object, got {found}")]
    NotAnObject {
        artifact_type: ArtifactType,
        found: &'static str,
    },

    #[error(
        "Contract violation: {artifact_type} payload does not match its schema: {}",
        .problems.join("; ")
    )]
    SchemaMismatch {
        artifact_type: ArtifactType,
        problems: Vec<String>,
    },

    #[error(
        "Contract violation: agent '{agent_id}' cannot overwrite {artifact_type} (ownership: {level}, requires owner)"
    )]
    OverwriteWithoutOwnership {
        agent_id: String,
        artifact_type: ArtifactType,
        level: OwnershipLevel,
    },

    #[error("Contract violation: agent '{agent_id}' has no declared access to {artifact_type}")]
    NoDeclaredAccess {
        agent_id: String,
        artifact_type: ArtifactType,
    },

    #[error("Contract violation: agent '{agent_id}' requires {artifact_type}, which has not been produced")]
    MissingRequiredInput {
        agent_id: String,
        artifact_type: ArtifactType,
    },

    #[error("Contract violation: no contract registered for agent '{agent_id}'")]
    UnknownAgent { agent_id: String },
}

impl ContractViolationError {
    /// The artifact type involved, when the violation concerns one.
    pub fn artifact_type(&self) -> Option<ArtifactType> {
        match self {
            Self::NotAnObject { artifact_type, .. }
            | Self::SchemaMismatch { artifact_type, .. }
            | Self::OverwriteWithoutOwnership { artifact_type, .. }
            | Self::NoDeclaredAccess { artifact_type, .. }
            | Self::MissingRequiredInput { artifact_type, .. } => Some(*artifact_type),
            Self::UnknownAgent { .. } => None,
        }
    }
}

/// Errors from the verification orchestrator itself (not check failures,
/// which are data).
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("No verification check registered for '{check}'")]
    UnknownCheck { check: CheckKind },
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Contract(#[from] ContractViolationError),

    #[error("Stage {stage} failed: {source}")]
    Agent {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("Stage {stage} timed out after {}s", .timeout.as_secs())]
    StageTimeout { stage: Stage, timeout: Duration },

    #[error("Run cancelled during stage {stage}")]
    Cancelled { stage: Stage },

    #[error(
        "Verification gate still failing after {attempts} repair attempt(s); blocking issues: {}",
        format_issues(.blocking)
    )]
    RepairEscalated {
        attempts: u32,
        blocking: Vec<Issue>,
        /// The verification the last gate decision was made on.
        verification: Box<VerificationResult>,
    },

    #[error("Verification gate failed after {attempts} repair attempt(s): {message}")]
    GateFailed { attempts: u32, message: String },

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

fn format_issues(issues: &[Issue]) -> String {
    if issues.is_empty() {
        return "none recorded".to_string();
    }
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
