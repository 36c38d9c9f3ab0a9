//! Shared domain types for the appforge pipeline.
//!
//! These types cross the boundary between the orchestration core and its
//! collaborators (agents, verification checks, CLI), so they live in their own
//! crate with no behaviour beyond small helpers.

pub mod artifact;
pub mod ownership;
pub mod run;
pub mod verification;

pub use artifact::ArtifactType;
pub use ownership::OwnershipLevel;
pub use run::RunStatus;
pub use verification::{
    CheckKind, CheckResult, CheckStatus, Issue, Severity, VerificationResult, VerificationSummary,
};

use thiserror::Error;

/// Failure to parse one of the string-backed enums in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind} '{value}'")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
