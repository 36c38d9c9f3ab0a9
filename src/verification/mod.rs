//! Verification of a generated project.
//!
//! The [`VerificationOrchestrator`] runs a fixed, ordered set of
//! [`VerificationCheck`]s and aggregates their results. Checks are
//! independent: a failing or timed-out check is recorded and the remaining
//! checks still run, so one pass produces a complete report.
//!
//! ## Components
//!
//! - [`checks`]: built-in checks (shell commands, API contract, secret scan)
//! - [`orchestrator`]: sequencing, timeouts and aggregation

pub mod checks;
pub mod orchestrator;

pub use checks::{ApiSchemaCheck, CommandCheck, SecretScanCheck};
pub use orchestrator::VerificationOrchestrator;

use anyhow::Result;
use appforge_common::{ArtifactType, CheckKind, CheckResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// What a check can see of the run it verifies.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub run_id: String,
    /// Directory holding the generated project.
    pub output_dir: PathBuf,
    /// Snapshot of the run's artifacts at verification time.
    pub artifacts: BTreeMap<ArtifactType, Value>,
    pub cancel: CancellationToken,
}

impl CheckContext {
    pub fn new(run_id: &str, output_dir: PathBuf) -> Self {
        Self {
            run_id: run_id.to_string(),
            output_dir,
            artifacts: BTreeMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: BTreeMap<ArtifactType, Value>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One verification dimension.
///
/// Returning `Err` means the check itself could not run; the orchestrator
/// records that as a failed check rather than aborting verification.
#[async_trait]
pub trait VerificationCheck: Send + Sync {
    fn kind(&self) -> CheckKind;

    async fn run(&self, ctx: &CheckContext) -> Result<CheckResult>;
}
