use appforge_common::{ArtifactType, RunStatus, VerificationResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::Stage;
use super::events::{EventSender, PipelineEvent, emit};
use crate::agents::{AgentContext, AgentInvoker, ImplementationAgents};
use crate::appforge_config::VerificationSection;
use crate::artifact::{ArtifactStore, RunManifest};
use crate::contract::{ContractEnforcer, ContractRegistry, agent_ids};
use crate::errors::PipelineError;
use crate::gates::gate_from_verification;
use crate::repair::{DEFAULT_MAX_RETRIES, ReimplementAndRecheck, RepairController, RepairStrategy};
use crate::verification::{CheckContext, VerificationOrchestrator};

/// Inputs required to start a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub prompt: String,
    pub project_name: String,
    pub output_dir: PathBuf,
    /// Repair attempts after a failing gate; defaults to 3.
    pub max_repair_attempts: Option<u32>,
}

impl PipelineConfig {
    pub fn new(prompt: &str, project_name: &str, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.to_string(),
            project_name: project_name.to_string(),
            output_dir: output_dir.into(),
            max_repair_attempts: None,
        }
    }

    pub fn with_max_repair_attempts(mut self, attempts: u32) -> Self {
        self.max_repair_attempts = Some(attempts);
        self
    }
}

/// Behaviour knobs not part of the run's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Raise an escalation error when repair is exhausted. Otherwise the run
    /// still fails, but with a plain gate failure.
    pub escalate_on_failure: bool,
    /// Limit on each agent call. `None` waits indefinitely.
    pub stage_timeout: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            escalate_on_failure: true,
            stage_timeout: None,
        }
    }
}

/// Outcome of a run, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    pub run_id: String,
    /// Every artifact stored during the run, including partial results.
    pub artifacts: BTreeMap<ArtifactType, Value>,
    pub manifest: Option<RunManifest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn status(&self) -> RunStatus {
        if self.success {
            RunStatus::Complete
        } else {
            RunStatus::Failed
        }
    }
}

enum RepairMode {
    /// Re-run implementation and the failed checks.
    Reimplement,
    Custom(Arc<dyn RepairStrategy>),
    Disabled,
}

/// Sequences the stages of a run.
///
/// One orchestrator can drive any number of runs, concurrently or not; each
/// run gets its own store and repair controller.
pub struct PipelineOrchestrator {
    registry: Arc<ContractRegistry>,
    enforcer: ContractEnforcer,
    agents: Arc<dyn AgentInvoker>,
    implementation: Arc<dyn ImplementationAgents>,
    verifier: Arc<VerificationOrchestrator>,
    repair: RepairMode,
    options: PipelineOptions,
    event_tx: Option<EventSender>,
}

impl PipelineOrchestrator {
    pub fn new(agents: Arc<dyn AgentInvoker>, implementation: Arc<dyn ImplementationAgents>) -> Self {
        let registry = ContractRegistry::builtin();
        Self {
            enforcer: ContractEnforcer::new(Arc::clone(&registry)),
            registry,
            agents,
            implementation,
            verifier: Arc::new(VerificationOrchestrator::builtin(&VerificationSection::default())),
            repair: RepairMode::Reimplement,
            options: PipelineOptions::default(),
            event_tx: None,
        }
    }

    pub fn with_verifier(mut self, verifier: VerificationOrchestrator) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the default re-implement-and-recheck repair.
    pub fn with_repair_strategy(mut self, strategy: Arc<dyn RepairStrategy>) -> Self {
        self.repair = RepairMode::Custom(strategy);
        self
    }

    /// Run with no repair: a failing gate goes straight to exhaustion.
    pub fn without_repair(mut self) -> Self {
        self.repair = RepairMode::Disabled;
        self
    }

    pub fn with_event_channel(mut self, tx: EventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Execute one run. Never returns an error: failures are reported in the
    /// result together with the artifacts produced so far.
    pub async fn run(&self, config: PipelineConfig, cancel: CancellationToken) -> PipelineResult {
        let run_id = Uuid::new_v4().to_string();
        let mut store = ArtifactStore::new(&run_id, Arc::clone(&self.registry));

        tracing::info!(
            run_id = %run_id,
            project = %config.project_name,
            output_dir = %config.output_dir.display(),
            "pipeline run started"
        );
        emit(
            &self.event_tx,
            PipelineEvent::RunStarted {
                run_id: run_id.clone(),
                project_name: config.project_name.clone(),
            },
        )
        .await;

        let outcome = self.execute(&config, &mut store, &cancel).await;

        let (success, manifest, error) = match outcome {
            Ok(manifest) => {
                tracing::info!(run_id = %run_id, artifacts = store.len(), "pipeline run complete");
                (true, manifest, None)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(
                    run_id = %run_id,
                    error = %message,
                    artifacts = store.len(),
                    "pipeline run failed"
                );
                let manifest = store
                    .build_manifest(RunStatus::Failed)
                    .with_project_name(&config.project_name);
                (false, manifest, Some(message))
            }
        };

        emit(
            &self.event_tx,
            PipelineEvent::RunFinished {
                run_id: run_id.clone(),
                status: manifest.status,
                error: error.clone(),
            },
        )
        .await;

        PipelineResult {
            success,
            run_id,
            artifacts: store.into_data(),
            manifest: Some(manifest),
            error,
        }
    }

    async fn execute(
        &self,
        config: &PipelineConfig,
        store: &mut ArtifactStore,
        cancel: &CancellationToken,
    ) -> Result<RunManifest, PipelineError> {
        for stage in Stage::SPEC_STAGES {
            self.run_spec_stage(stage, config, store, cancel).await?;
        }

        // Implementation
        let started = self.begin_stage(Stage::Implementation, cancel).await?;
        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create output directory {}: {}",
                    config.output_dir.display(),
                    e
                )
            })?;
        let impl_ctx = self.implementation_context(config, store, cancel)?;
        self.guarded(
            Stage::Implementation,
            cancel,
            self.implementation.run_implementation_agents(&impl_ctx),
        )
        .await?;
        self.end_stage(Stage::Implementation, started).await;

        // Verification, gate and repair
        let started = self.begin_stage(Stage::Verification, cancel).await?;
        let check_ctx = CheckContext::new(store.run_id(), config.output_dir.clone())
            .with_artifacts(store.snapshot())
            .with_cancel(cancel.child_token());
        let verification = self.verifier.run_all(&check_ctx).await;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: Stage::Verification,
            });
        }
        emit(
            &self.event_tx,
            PipelineEvent::VerificationCompleted {
                status: verification.status,
                passed: verification.summary.passed,
                failed: verification.summary.failed,
                skipped: verification.summary.skipped,
            },
        )
        .await;

        let gate = gate_from_verification(&verification);
        tracing::info!(run_id = %store.run_id(), status = %gate.status, "{}", gate.message);
        emit(
            &self.event_tx,
            PipelineEvent::GateEvaluated {
                status: gate.status,
                blocking: gate.blocking.len(),
            },
        )
        .await;

        let strategy: Option<Arc<dyn RepairStrategy>> = match &self.repair {
            RepairMode::Reimplement => Some(Arc::new(ReimplementAndRecheck::new(
                Arc::clone(&self.implementation),
                Arc::clone(&self.verifier),
                impl_ctx,
                check_ctx,
            ))),
            RepairMode::Custom(strategy) => Some(Arc::clone(strategy)),
            RepairMode::Disabled => None,
        };
        let mut controller = RepairController::new(
            config.max_repair_attempts.unwrap_or(DEFAULT_MAX_RETRIES),
        )
        .with_escalate_on_failure(self.options.escalate_on_failure);
        if let Some(tx) = &self.event_tx {
            controller = controller.with_event_channel(tx.clone());
        }

        let outcome = match controller
            .repair_until_pass_or_escalate(&gate, &verification, strategy.as_deref(), cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(PipelineError::RepairEscalated {
                attempts,
                blocking,
                verification,
            }) => {
                // The failed run keeps the result the escalation was decided on.
                self.store_verification(&verification, store).await?;
                return Err(PipelineError::RepairEscalated {
                    attempts,
                    blocking,
                    verification,
                });
            }
            Err(e) => return Err(e),
        };

        self.store_verification(&outcome.verification, store).await?;

        if !outcome.success {
            return Err(PipelineError::GateFailed {
                attempts: outcome.attempts,
                message: outcome.gate.message,
            });
        }
        self.end_stage(Stage::Verification, started).await;

        // Manifest
        let started = self.begin_stage(Stage::Manifest, cancel).await?;
        let manifest = store
            .build_manifest(RunStatus::Complete)
            .with_project_name(&config.project_name);
        let manifest_payload = manifest.to_value().map_err(anyhow::Error::from)?;
        self.store_artifact(
            agent_ids::ORCHESTRATOR,
            ArtifactType::RunManifest,
            manifest_payload,
            store,
        )
        .await?;
        self.end_stage(Stage::Manifest, started).await;

        Ok(manifest)
    }

    async fn run_spec_stage(
        &self,
        stage: Stage,
        config: &PipelineConfig,
        store: &mut ArtifactStore,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let started = self.begin_stage(stage, cancel).await?;
        let agent = stage.agent();

        let ctx = AgentContext {
            run_id: store.run_id().to_string(),
            prompt: config.prompt.clone(),
            project_name: config.project_name.clone(),
            output_dir: config.output_dir.clone(),
            inputs: self.enforcer.collect_inputs(agent, store)?,
            cancel: cancel.child_token(),
        };

        for artifact_type in stage.outputs() {
            let data = self
                .guarded(
                    stage,
                    cancel,
                    self.agents.run_agent_to_artifact(agent, *artifact_type, &ctx),
                )
                .await?;
            self.store_artifact(agent, *artifact_type, data, store).await?;
        }

        self.end_stage(stage, started).await;
        Ok(())
    }

    /// Inputs of every implementation agent, merged.
    fn implementation_context(
        &self,
        config: &PipelineConfig,
        store: &ArtifactStore,
        cancel: &CancellationToken,
    ) -> Result<AgentContext, PipelineError> {
        let mut inputs = BTreeMap::new();
        for agent in Stage::Implementation.agents() {
            inputs.extend(self.enforcer.collect_inputs(agent, store)?);
        }
        Ok(AgentContext {
            run_id: store.run_id().to_string(),
            prompt: config.prompt.clone(),
            project_name: config.project_name.clone(),
            output_dir: config.output_dir.clone(),
            inputs,
            cancel: cancel.child_token(),
        })
    }

    async fn store_verification(
        &self,
        verification: &VerificationResult,
        store: &mut ArtifactStore,
    ) -> Result<(), PipelineError> {
        let payload = serde_json::to_value(verification).map_err(anyhow::Error::from)?;
        self.store_artifact(
            agent_ids::ORCHESTRATOR,
            ArtifactType::VerificationResult,
            payload,
            store,
        )
        .await
    }

    /// Validate, check ownership, then persist.
    async fn store_artifact(
        &self,
        agent_id: &str,
        artifact_type: ArtifactType,
        data: Value,
        store: &mut ArtifactStore,
    ) -> Result<(), PipelineError> {
        self.enforcer.validate_artifact(artifact_type, &data)?;
        let is_overwrite = store.has(artifact_type);
        self.enforcer
            .enforce_ownership(agent_id, artifact_type, is_overwrite)?;

        let version = store.put(artifact_type, data, agent_id).version;
        tracing::info!(
            run_id = %store.run_id(),
            agent = agent_id,
            artifact = %artifact_type,
            version,
            "artifact stored"
        );
        emit(
            &self.event_tx,
            PipelineEvent::ArtifactStored {
                artifact_type,
                version,
                created_by: agent_id.to_string(),
            },
        )
        .await;
        Ok(())
    }

    /// Await `work` under the run's cancellation token and the stage timeout.
    async fn guarded<T>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        work: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, PipelineError> {
        let limited = async {
            match self.options.stage_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, work).await {
                    Ok(result) => result.map_err(|source| PipelineError::Agent { stage, source }),
                    Err(_) => Err(PipelineError::StageTimeout { stage, timeout }),
                },
                None => work
                    .await
                    .map_err(|source| PipelineError::Agent { stage, source }),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled { stage }),
            result = limited => result,
        }
    }

    async fn begin_stage(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
    ) -> Result<Instant, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { stage });
        }
        tracing::info!(stage = %stage, number = stage.number(), "stage started");
        emit(&self.event_tx, PipelineEvent::StageStarted { stage }).await;
        Ok(Instant::now())
    }

    async fn end_stage(&self, stage: Stage, started: Instant) {
        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(stage = %stage, duration_ms, "stage completed");
        emit(
            &self.event_tx,
            PipelineEvent::StageCompleted { stage, duration_ms },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::OfflineAgents;
    use crate::repair::FnRepair;
    use anyhow::Result;
    use appforge_common::{CheckKind, CheckResult, Issue, VerificationResult};
    use async_trait::async_trait;
    use futures::FutureExt;
    use tempfile::tempdir;

    struct FixedCheck(CheckKind, Vec<Issue>);

    #[async_trait]
    impl crate::verification::VerificationCheck for FixedCheck {
        fn kind(&self) -> CheckKind {
            self.0
        }

        async fn run(&self, _ctx: &CheckContext) -> Result<CheckResult> {
            Ok(CheckResult::from_issues(self.0, self.1.clone()))
        }
    }

    fn offline() -> PipelineOrchestrator {
        let agents = Arc::new(OfflineAgents::new());
        PipelineOrchestrator::new(agents.clone(), agents)
    }

    #[tokio::test]
    async fn test_offline_run_completes_with_all_artifacts() {
        let dir = tempdir().unwrap();
        let result = offline()
            .run(
                PipelineConfig::new("Track tasks, share lists", "todo", dir.path()),
                CancellationToken::new(),
            )
            .await;

        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.artifacts.len(), ArtifactType::ALL.len());
        let manifest = result.manifest.unwrap();
        assert_eq!(manifest.status, RunStatus::Complete);
        assert_eq!(manifest.project_name.as_deref(), Some("todo"));
        assert_eq!(manifest.artifacts.len(), 9);
        assert_eq!(result.artifacts[&ArtifactType::RunManifest]["status"], "complete");
        assert!(dir.path().join("README.md").exists());
    }

    #[tokio::test]
    async fn test_gate_failure_without_escalation_fails_run() {
        let dir = tempdir().unwrap();
        let orchestrator = offline()
            .with_verifier(
                VerificationOrchestrator::default()
                    .with_check(FixedCheck(CheckKind::Build, vec![Issue::high("broken")])),
            )
            .with_options(PipelineOptions {
                escalate_on_failure: false,
                stage_timeout: None,
            })
            .without_repair();

        let result = orchestrator
            .run(
                PipelineConfig::new("x", "p", dir.path()),
                CancellationToken::new(),
            )
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("after 0 repair attempt(s)"));
        assert!(result.artifacts.contains_key(&ArtifactType::VerificationResult));
        assert!(!result.artifacts.contains_key(&ArtifactType::RunManifest));
        assert_eq!(result.manifest.unwrap().status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_escalated_run_keeps_verification_result() {
        let dir = tempdir().unwrap();
        let orchestrator = offline()
            .with_verifier(
                VerificationOrchestrator::default()
                    .with_check(FixedCheck(CheckKind::Build, vec![Issue::high("tsc: 3 errors")])),
            )
            .without_repair();

        let result = orchestrator
            .run(
                PipelineConfig::new("x", "p", dir.path()),
                CancellationToken::new(),
            )
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("still failing after 0 repair attempt(s)"));
        let stored = &result.artifacts[&ArtifactType::VerificationResult];
        assert_eq!(stored["status"], "fail");
        assert_eq!(stored["checks"][0]["issues"][0]["message"], "tsc: 3 errors");
        let manifest = result.manifest.unwrap();
        assert_eq!(manifest.status, RunStatus::Failed);
        assert!(manifest.entry(ArtifactType::VerificationResult).is_some());
    }

    #[tokio::test]
    async fn test_custom_repair_strategy_recovers() {
        let dir = tempdir().unwrap();
        let strategy = FnRepair::new(|_request| {
            async {
                Ok::<_, anyhow::Error>(VerificationResult::from_checks(vec![CheckResult::pass(
                    CheckKind::Build,
                )]))
            }
            .boxed()
        });
        let orchestrator = offline()
            .with_verifier(
                VerificationOrchestrator::default()
                    .with_check(FixedCheck(CheckKind::Build, vec![Issue::critical("leak")])),
            )
            .with_repair_strategy(Arc::new(strategy));

        let result = orchestrator
            .run(
                PipelineConfig::new("x", "p", dir.path()).with_max_repair_attempts(1),
                CancellationToken::new(),
            )
            .await;

        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(
            result.artifacts[&ArtifactType::VerificationResult]["status"],
            "pass"
        );
    }

    #[tokio::test]
    async fn test_events_cover_every_stage() {
        let dir = tempdir().unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::channel(256);
        let result = offline()
            .with_verifier(VerificationOrchestrator::default())
            .with_event_channel(tx)
            .run(
                PipelineConfig::new("x", "p", dir.path()),
                CancellationToken::new(),
            )
            .await;
        assert!(result.success);

        let mut started = Vec::new();
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::StageStarted { stage } = &event {
                started.push(*stage);
            }
            last = Some(event);
        }
        assert_eq!(started, Stage::ALL.to_vec());
        assert!(matches!(
            last,
            Some(PipelineEvent::RunFinished {
                status: RunStatus::Complete,
                ..
            })
        ));
    }
}
