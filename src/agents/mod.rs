//! Collaborator seams for the agents that do the actual work.
//!
//! The pipeline never looks inside an agent. It hands an [`AgentContext`]
//! holding the artifacts the agent's contract allows it to read, and gets a
//! JSON payload back. Anything can sit behind these traits: an LLM-backed
//! persona, a template engine, or the deterministic [`OfflineAgents`].

pub mod offline;

pub use offline::OfflineAgents;

use anyhow::Result;
use appforge_common::{ArtifactType, Issue};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Everything an agent gets to see for one stage.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub run_id: String,
    pub prompt: String,
    pub project_name: String,
    pub output_dir: PathBuf,
    /// Artifacts the agent's contract lets it read, as stored so far.
    pub inputs: BTreeMap<ArtifactType, Value>,
    /// Cancelled when the run is aborted; long-running agents should watch it.
    pub cancel: CancellationToken,
}

impl AgentContext {
    pub fn input(&self, artifact_type: ArtifactType) -> Option<&Value> {
        self.inputs.get(&artifact_type)
    }
}

/// Produces artifact payloads.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Produce the `artifact_type` payload on behalf of `agent_id`.
    async fn run_agent_to_artifact(
        &self,
        agent_id: &str,
        artifact_type: ArtifactType,
        ctx: &AgentContext,
    ) -> Result<Value>;
}

/// Writes source files for the stored specs into the output directory.
#[async_trait]
pub trait ImplementationAgents: Send + Sync {
    async fn run_implementation_agents(&self, ctx: &AgentContext) -> Result<()>;

    /// Rework the generated sources to address `issues`.
    ///
    /// Defaults to a full re-run of the implementation agents.
    async fn repair(&self, ctx: &AgentContext, issues: &[Issue]) -> Result<()> {
        tracing::debug!(
            run_id = %ctx.run_id,
            issues = issues.len(),
            "repair falls back to re-running implementation"
        );
        self.run_implementation_agents(ctx).await
    }
}
