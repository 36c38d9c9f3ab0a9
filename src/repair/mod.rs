//! Bounded repair loop run after a failing verification gate.
//!
//! The [`RepairController`] does not know how to fix anything. It drives a
//! [`RepairStrategy`] up to `max_retries` times, re-gating each returned
//! verification, and escalates once the budget is spent.
//!
//! ```text
//! idle ──gate fails──▶ repairing(1) ─▶ … ─▶ repairing(N) ──▶ escalated
//!   │                        │
//!   └─gate passes─▶ repaired ◀─ gate passes
//! ```

use anyhow::Result;
use appforge_common::{CheckKind, Issue, VerificationResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::agents::{AgentContext, ImplementationAgents};
use crate::errors::PipelineError;
use crate::gates::{GateResult, gate_from_verification};
use crate::pipeline::Stage;
use crate::pipeline::events::{EventSender, PipelineEvent, emit};
use crate::verification::{CheckContext, VerificationOrchestrator};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// What a strategy gets for one attempt.
#[derive(Debug, Clone)]
pub struct RepairRequest {
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Issues the gate blocked on after the previous attempt.
    pub blocking: Vec<Issue>,
    /// Latest verification result.
    pub verification: VerificationResult,
    pub cancel: CancellationToken,
}

/// One way of remediating a failing project and re-verifying it.
#[async_trait]
pub trait RepairStrategy: Send + Sync {
    async fn attempt_repair(&self, request: &RepairRequest) -> Result<VerificationResult>;
}

type RepairFn = dyn Fn(RepairRequest) -> BoxFuture<'static, Result<VerificationResult>> + Send + Sync;

/// Adapts a closure into a [`RepairStrategy`].
pub struct FnRepair {
    f: Box<RepairFn>,
}

impl FnRepair {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(RepairRequest) -> BoxFuture<'static, Result<VerificationResult>> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

impl fmt::Debug for FnRepair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnRepair")
    }
}

#[async_trait]
impl RepairStrategy for FnRepair {
    async fn attempt_repair(&self, request: &RepairRequest) -> Result<VerificationResult> {
        (self.f)(request.clone()).await
    }
}

/// Re-runs the implementation agents with the blocking issues, then re-runs
/// the checks that failed, plus the security scan, and merges their results
/// into the previous verification.
pub struct ReimplementAndRecheck {
    agents: Arc<dyn ImplementationAgents>,
    verifier: Arc<VerificationOrchestrator>,
    agent_ctx: AgentContext,
    check_ctx: CheckContext,
}

impl ReimplementAndRecheck {
    pub fn new(
        agents: Arc<dyn ImplementationAgents>,
        verifier: Arc<VerificationOrchestrator>,
        agent_ctx: AgentContext,
        check_ctx: CheckContext,
    ) -> Self {
        Self {
            agents,
            verifier,
            agent_ctx,
            check_ctx,
        }
    }
}

#[async_trait]
impl RepairStrategy for ReimplementAndRecheck {
    async fn attempt_repair(&self, request: &RepairRequest) -> Result<VerificationResult> {
        let mut agent_ctx = self.agent_ctx.clone();
        agent_ctx.cancel = request.cancel.clone();
        self.agents.repair(&agent_ctx, &request.blocking).await?;

        let check_ctx = self.check_ctx.clone().with_cancel(request.cancel.clone());
        let mut recheck: Vec<CheckKind> = request.verification.failed_checks();
        // Rewritten sources can introduce secrets even where the scan passed.
        if self.verifier.kinds().contains(&CheckKind::SecurityScan)
            && !recheck.contains(&CheckKind::SecurityScan)
        {
            recheck.push(CheckKind::SecurityScan);
        }
        let mut merged = request.verification.clone();
        for kind in recheck {
            let result = self.verifier.run_check(kind, &check_ctx).await?;
            tracing::debug!(check = %kind, status = %result.status, "re-ran check after repair");
            merged = merged.merge_check(result);
        }
        Ok(merged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RepairState {
    #[default]
    Idle,
    Repairing {
        attempt: u32,
    },
    Repaired {
        attempts: u32,
    },
    Escalated {
        attempts: u32,
    },
}

impl RepairState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Repaired { .. } | Self::Escalated { .. })
    }
}

/// Result of a repair loop that did not escalate.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub success: bool,
    /// Strategy invocations made.
    pub attempts: u32,
    /// The verification the decision was made on.
    pub verification: VerificationResult,
    pub gate: GateResult,
}

#[derive(Debug, Clone)]
pub struct RepairController {
    max_retries: u32,
    escalate_on_failure: bool,
    state: RepairState,
    event_tx: Option<EventSender>,
}

impl Default for RepairController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RepairController {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            escalate_on_failure: true,
            state: RepairState::Idle,
            event_tx: None,
        }
    }

    pub fn with_escalate_on_failure(mut self, escalate: bool) -> Self {
        self.escalate_on_failure = escalate;
        self
    }

    pub fn with_event_channel(mut self, tx: EventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn state(&self) -> RepairState {
        self.state
    }

    /// Drive `strategy` until the gate passes or retries run out.
    ///
    /// A passing `gate` returns immediately without touching the strategy.
    /// Strategy errors are logged and count as a failed attempt. Without a
    /// strategy no attempt is made and the loop goes straight to exhaustion.
    pub async fn repair_until_pass_or_escalate(
        &mut self,
        gate: &GateResult,
        verification: &VerificationResult,
        strategy: Option<&dyn RepairStrategy>,
        cancel: &CancellationToken,
    ) -> Result<RepairOutcome, PipelineError> {
        if gate.is_pass() {
            self.state = RepairState::Repaired { attempts: 0 };
            return Ok(RepairOutcome {
                success: true,
                attempts: 0,
                verification: verification.clone(),
                gate: gate.clone(),
            });
        }

        let mut current_verification = verification.clone();
        let mut current_gate = gate.clone();
        let mut attempts = 0;

        match strategy {
            Some(strategy) => {
                for attempt in 1..=self.max_retries {
                    if cancel.is_cancelled() {
                        return Err(PipelineError::Cancelled {
                            stage: Stage::Verification,
                        });
                    }

                    self.state = RepairState::Repairing { attempt };
                    attempts = attempt;
                    tracing::info!(
                        attempt,
                        max_attempts = self.max_retries,
                        blocking = current_gate.blocking.len(),
                        "attempting repair"
                    );
                    emit(
                        &self.event_tx,
                        PipelineEvent::RepairAttempt {
                            attempt,
                            max_attempts: self.max_retries,
                        },
                    )
                    .await;

                    let request = RepairRequest {
                        attempt,
                        max_attempts: self.max_retries,
                        blocking: current_gate.blocking.clone(),
                        verification: current_verification.clone(),
                        cancel: cancel.child_token(),
                    };

                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(PipelineError::Cancelled { stage: Stage::Verification });
                        }
                        outcome = strategy.attempt_repair(&request) => outcome,
                    };

                    let reason = match outcome {
                        Ok(result) => {
                            let next_gate = gate_from_verification(&result);
                            current_verification = result;
                            if next_gate.is_pass() {
                                tracing::info!(attempt, "repair succeeded");
                                self.state = RepairState::Repaired { attempts: attempt };
                                return Ok(RepairOutcome {
                                    success: true,
                                    attempts: attempt,
                                    verification: current_verification,
                                    gate: next_gate,
                                });
                            }
                            let reason = next_gate.message.clone();
                            current_gate = next_gate;
                            reason
                        }
                        Err(e) => {
                            tracing::warn!(attempt, error = %e, "repair attempt errored");
                            format!("{:#}", e)
                        }
                    };
                    emit(
                        &self.event_tx,
                        PipelineEvent::RepairAttemptFailed { attempt, reason },
                    )
                    .await;
                }
            }
            None => {
                tracing::warn!("gate failed and no repair strategy is configured");
            }
        }

        self.state = RepairState::Escalated { attempts };
        if self.escalate_on_failure {
            tracing::error!(
                attempts,
                blocking = current_gate.blocking.len(),
                "repair exhausted, escalating"
            );
            return Err(PipelineError::RepairEscalated {
                attempts,
                blocking: current_gate.blocking,
                verification: Box::new(current_verification),
            });
        }

        tracing::warn!(attempts, "repair exhausted");
        Ok(RepairOutcome {
            success: false,
            attempts,
            verification: current_verification,
            gate: current_gate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_common::{CheckResult, CheckStatus};
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failing() -> VerificationResult {
        VerificationResult::from_checks(vec![CheckResult::fail(
            CheckKind::Build,
            vec![Issue::high("tsc: 3 errors")],
        )])
    }

    fn passing() -> VerificationResult {
        VerificationResult::from_checks(vec![CheckResult::pass(CheckKind::Build)])
    }

    /// Fails until the `succeed_on`-th call (0 = never).
    struct Counting {
        calls: Arc<AtomicU32>,
        succeed_on: u32,
    }

    impl Counting {
        fn new(succeed_on: u32) -> Self {
            Self {
                calls: Arc::new(AtomicU32::new(0)),
                succeed_on,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RepairStrategy for Counting {
        async fn attempt_repair(&self, _request: &RepairRequest) -> Result<VerificationResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.succeed_on {
                Ok(passing())
            } else {
                Ok(failing())
            }
        }
    }

    #[tokio::test]
    async fn test_passing_gate_is_noop() {
        let strategy = Counting::new(1);
        let verification = passing();
        let gate = gate_from_verification(&verification);
        let mut controller = RepairController::default();

        let outcome = controller
            .repair_until_pass_or_escalate(
                &gate,
                &verification,
                Some(&strategy),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(strategy.calls(), 0);
        assert_eq!(controller.state(), RepairState::Repaired { attempts: 0 });
    }

    #[tokio::test]
    async fn test_always_failing_strategy_runs_exactly_max_retries() {
        for max in [1, 3, 5] {
            let strategy = Counting::new(0);
            let verification = failing();
            let gate = gate_from_verification(&verification);
            let mut controller = RepairController::new(max);

            let err = controller
                .repair_until_pass_or_escalate(
                    &gate,
                    &verification,
                    Some(&strategy),
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err();

            assert_eq!(strategy.calls(), max);
            match err {
                PipelineError::RepairEscalated {
                    attempts,
                    blocking,
                    verification,
                } => {
                    assert_eq!(attempts, max);
                    assert!(!verification.is_pass());
                    assert_eq!(blocking.len(), 1);
                    assert_eq!(blocking[0].message, "tsc: 3 errors");
                }
                other => panic!("expected escalation, got {other:?}"),
            }
            assert_eq!(controller.state(), RepairState::Escalated { attempts: max });
        }
    }

    #[tokio::test]
    async fn test_success_on_second_attempt() {
        let strategy = Counting::new(2);
        let verification = failing();
        let gate = gate_from_verification(&verification);
        let mut controller = RepairController::new(3);

        let outcome = controller
            .repair_until_pass_or_escalate(
                &gate,
                &verification,
                Some(&strategy),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.gate.is_pass());
        assert_eq!(strategy.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_escalation_returns_failure() {
        let strategy = Counting::new(0);
        let verification = failing();
        let gate = gate_from_verification(&verification);
        let mut controller = RepairController::new(2).with_escalate_on_failure(false);

        let outcome = controller
            .repair_until_pass_or_escalate(
                &gate,
                &verification,
                Some(&strategy),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert!(!outcome.gate.is_pass());
        assert_eq!(controller.state(), RepairState::Escalated { attempts: 2 });
    }

    #[tokio::test]
    async fn test_missing_strategy_exhausts_with_zero_attempts() {
        let verification = failing();
        let gate = gate_from_verification(&verification);

        let err = RepairController::default()
            .repair_until_pass_or_escalate(&gate, &verification, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RepairEscalated { attempts: 0, .. }));

        let outcome = RepairController::default()
            .with_escalate_on_failure(false)
            .repair_until_pass_or_escalate(&gate, &verification, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 0);
    }

    #[tokio::test]
    async fn test_strategy_errors_count_as_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let strategy = FnRepair::new(move |_request| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("agent crashed");
                }
                Ok(passing())
            }
            .boxed()
        });
        let verification = failing();
        let gate = gate_from_verification(&verification);

        let outcome = RepairController::new(3)
            .repair_until_pass_or_escalate(
                &gate,
                &verification,
                Some(&strategy),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_low_issues_after_repair_count_as_success() {
        let strategy = FnRepair::new(|_request| {
            async {
                Ok::<_, anyhow::Error>(VerificationResult::from_checks(vec![CheckResult::fail(
                    CheckKind::Lint,
                    vec![Issue::low("trailing whitespace")],
                )]))
            }
            .boxed()
        });
        let verification = failing();
        let gate = gate_from_verification(&verification);
        let outcome = RepairController::new(1)
            .repair_until_pass_or_escalate(
                &gate,
                &verification,
                Some(&strategy),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_loop() {
        let strategy = Counting::new(0);
        let verification = failing();
        let gate = gate_from_verification(&verification);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = RepairController::new(3)
            .repair_until_pass_or_escalate(&gate, &verification, Some(&strategy), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(strategy.calls(), 0);
    }

    #[tokio::test]
    async fn test_events_emitted_per_attempt() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let strategy = Counting::new(2);
        let verification = failing();
        let gate = gate_from_verification(&verification);

        RepairController::new(3)
            .with_event_channel(tx)
            .repair_until_pass_or_escalate(
                &gate,
                &verification,
                Some(&strategy),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], PipelineEvent::RepairAttempt { attempt: 1, .. }));
        assert!(matches!(events[1], PipelineEvent::RepairAttemptFailed { attempt: 1, .. }));
        assert!(matches!(events[2], PipelineEvent::RepairAttempt { attempt: 2, .. }));
    }

    struct RecordingAgents {
        repairs: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ImplementationAgents for RecordingAgents {
        async fn run_implementation_agents(&self, _ctx: &AgentContext) -> Result<()> {
            Ok(())
        }

        async fn repair(&self, _ctx: &AgentContext, issues: &[Issue]) -> Result<()> {
            assert!(!issues.is_empty());
            self.repairs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FixedBuild;

    #[async_trait]
    impl crate::verification::VerificationCheck for FixedBuild {
        fn kind(&self) -> CheckKind {
            CheckKind::Build
        }

        async fn run(&self, _ctx: &CheckContext) -> Result<CheckResult> {
            Ok(CheckResult::pass(CheckKind::Build))
        }
    }

    #[tokio::test]
    async fn test_reimplement_and_recheck_reruns_only_failed_checks() {
        let repairs = Arc::new(AtomicU32::new(0));
        let agents = Arc::new(RecordingAgents {
            repairs: Arc::clone(&repairs),
        });
        let verifier = Arc::new(VerificationOrchestrator::default().with_check(FixedBuild));
        let agent_ctx = AgentContext {
            run_id: "run-r".into(),
            prompt: "p".into(),
            project_name: "n".into(),
            output_dir: std::env::temp_dir(),
            inputs: Default::default(),
            cancel: CancellationToken::new(),
        };
        let check_ctx = CheckContext::new("run-r", std::env::temp_dir());
        let strategy = ReimplementAndRecheck::new(agents, verifier, agent_ctx, check_ctx);

        let previous = VerificationResult::from_checks(vec![
            CheckResult::fail(CheckKind::Build, vec![Issue::high("broken")]),
            CheckResult::skip(CheckKind::Lint),
        ]);
        let request = RepairRequest {
            attempt: 1,
            max_attempts: 3,
            blocking: vec![Issue::high("broken")],
            verification: previous,
            cancel: CancellationToken::new(),
        };

        let result = strategy.attempt_repair(&request).await.unwrap();
        assert_eq!(repairs.load(Ordering::SeqCst), 1);
        assert!(result.is_pass());
        assert_eq!(result.checks.len(), 2);
        assert_eq!(result.summary.skipped, 1);
    }

    struct LeakyScan;

    #[async_trait]
    impl crate::verification::VerificationCheck for LeakyScan {
        fn kind(&self) -> CheckKind {
            CheckKind::SecurityScan
        }

        async fn run(&self, _ctx: &CheckContext) -> Result<CheckResult> {
            Ok(CheckResult::fail(
                CheckKind::SecurityScan,
                vec![Issue::critical("AWS access key id").with_file("src/config.ts")],
            ))
        }
    }

    #[tokio::test]
    async fn test_reimplement_and_recheck_rescans_for_secrets() {
        let agents = Arc::new(RecordingAgents {
            repairs: Arc::new(AtomicU32::new(0)),
        });
        let verifier = Arc::new(
            VerificationOrchestrator::default()
                .with_check(FixedBuild)
                .with_check(LeakyScan),
        );
        let agent_ctx = AgentContext {
            run_id: "run-s".into(),
            prompt: "p".into(),
            project_name: "n".into(),
            output_dir: std::env::temp_dir(),
            inputs: Default::default(),
            cancel: CancellationToken::new(),
        };
        let check_ctx = CheckContext::new("run-s", std::env::temp_dir());
        let strategy = ReimplementAndRecheck::new(agents, verifier, agent_ctx, check_ctx);

        let previous = VerificationResult::from_checks(vec![
            CheckResult::fail(CheckKind::Build, vec![Issue::high("broken")]),
            CheckResult::pass(CheckKind::SecurityScan),
        ]);
        let request = RepairRequest {
            attempt: 1,
            max_attempts: 3,
            blocking: vec![Issue::high("broken")],
            verification: previous,
            cancel: CancellationToken::new(),
        };

        let result = strategy.attempt_repair(&request).await.unwrap();
        assert_eq!(result.check(CheckKind::Build).unwrap().status, CheckStatus::Pass);
        assert_eq!(
            result.check(CheckKind::SecurityScan).unwrap().status,
            CheckStatus::Fail
        );
        assert!(!gate_from_verification(&result).is_pass());
    }
}
