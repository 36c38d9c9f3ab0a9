use appforge_common::{CheckKind, CheckResult, Issue, VerificationResult};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::checks::{ApiSchemaCheck, CommandCheck, SecretScanCheck};
use super::{CheckContext, VerificationCheck};
use crate::appforge_config::VerificationSection;
use crate::errors::VerificationError;

/// Default per-check timeout.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs registered checks in order and aggregates their results.
#[derive(Clone)]
pub struct VerificationOrchestrator {
    checks: Vec<Arc<dyn VerificationCheck>>,
    check_timeout: Duration,
}

impl std::fmt::Debug for VerificationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationOrchestrator")
            .field("checks", &self.kinds())
            .field("check_timeout", &self.check_timeout)
            .finish()
    }
}

impl Default for VerificationOrchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_TIMEOUT)
    }
}

impl VerificationOrchestrator {
    /// An orchestrator with no checks registered.
    pub fn new(check_timeout: Duration) -> Self {
        Self {
            checks: Vec::new(),
            check_timeout,
        }
    }

    /// The built-in check set, one per [`CheckKind`], in execution order.
    pub fn builtin(settings: &VerificationSection) -> Self {
        let commands = &settings.commands;
        Self::new(settings.check_timeout())
            .with_check(CommandCheck::new(CheckKind::Build, commands.build.clone()))
            .with_check(CommandCheck::new(CheckKind::Lint, commands.lint.clone()))
            .with_check(CommandCheck::new(CheckKind::UnitTests, commands.tests.clone()))
            .with_check(ApiSchemaCheck)
            .with_check(SecretScanCheck::default())
    }

    /// Register a check. A check of an already registered kind replaces it in
    /// place, keeping the execution order.
    pub fn with_check(mut self, check: impl VerificationCheck + 'static) -> Self {
        let check: Arc<dyn VerificationCheck> = Arc::new(check);
        match self.checks.iter_mut().find(|c| c.kind() == check.kind()) {
            Some(existing) => *existing = check,
            None => self.checks.push(check),
        }
        self
    }

    pub fn kinds(&self) -> Vec<CheckKind> {
        self.checks.iter().map(|c| c.kind()).collect()
    }

    /// Run every registered check and aggregate.
    pub async fn run_all(&self, ctx: &CheckContext) -> VerificationResult {
        let mut results = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            results.push(self.execute(check.as_ref(), ctx).await);
        }

        let result = VerificationResult::from_checks(results);
        tracing::info!(
            run_id = %ctx.run_id,
            status = %result.status,
            passed = result.summary.passed,
            failed = result.summary.failed,
            skipped = result.summary.skipped,
            "verification complete"
        );
        result
    }

    /// Run a single check in isolation.
    pub async fn run_check(
        &self,
        kind: CheckKind,
        ctx: &CheckContext,
    ) -> Result<CheckResult, VerificationError> {
        let check = self
            .checks
            .iter()
            .find(|c| c.kind() == kind)
            .ok_or(VerificationError::UnknownCheck { check: kind })?;
        Ok(self.execute(check.as_ref(), ctx).await)
    }

    async fn execute(&self, check: &dyn VerificationCheck, ctx: &CheckContext) -> CheckResult {
        let kind = check.kind();
        let started = Instant::now();
        tracing::debug!(run_id = %ctx.run_id, check = %kind, "running check");

        let mut result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                CheckResult::fail(kind, vec![Issue::high(format!("{} check cancelled", kind))])
            }
            outcome = tokio::time::timeout(self.check_timeout, check.run(ctx)) => match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    tracing::warn!(run_id = %ctx.run_id, check = %kind, error = %e, "check errored");
                    CheckResult::fail(kind, vec![Issue::high(format!("{} check errored: {:#}", kind, e))])
                }
                Err(_) => {
                    tracing::warn!(run_id = %ctx.run_id, check = %kind, "check timed out");
                    CheckResult::fail(
                        kind,
                        vec![Issue::high(format!(
                            "{} check timed out after {}s",
                            kind,
                            self.check_timeout.as_secs()
                        ))],
                    )
                }
            },
        };

        result.name = kind;
        result.duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            run_id = %ctx.run_id,
            check = %kind,
            status = %result.status,
            issues = result.issues.len(),
            "check finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use appforge_common::{CheckStatus, Severity};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    struct FixedCheck {
        kind: CheckKind,
        result: fn(CheckKind) -> Result<CheckResult>,
        runs: Arc<AtomicUsize>,
    }

    impl FixedCheck {
        fn new(kind: CheckKind, result: fn(CheckKind) -> Result<CheckResult>) -> Self {
            Self {
                kind,
                result,
                runs: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl VerificationCheck for FixedCheck {
        fn kind(&self) -> CheckKind {
            self.kind
        }

        async fn run(&self, _ctx: &CheckContext) -> Result<CheckResult> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            (self.result)(self.kind)
        }
    }

    struct SlowCheck;

    #[async_trait]
    impl VerificationCheck for SlowCheck {
        fn kind(&self) -> CheckKind {
            CheckKind::UnitTests
        }

        async fn run(&self, _ctx: &CheckContext) -> Result<CheckResult> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(CheckResult::pass(CheckKind::UnitTests))
        }
    }

    fn ctx() -> CheckContext {
        CheckContext::new("run-1", std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_run_all_passes_when_every_check_passes() {
        let orchestrator = VerificationOrchestrator::default()
            .with_check(FixedCheck::new(CheckKind::Build, |k| Ok(CheckResult::pass(k))))
            .with_check(FixedCheck::new(CheckKind::Lint, |k| Ok(CheckResult::pass(k))));
        let result = orchestrator.run_all(&ctx()).await;
        assert!(result.is_pass());
        assert_eq!(result.summary.total, 2);
        assert_eq!(result.summary.passed, 2);
    }

    #[tokio::test]
    async fn test_failing_check_does_not_stop_later_checks() {
        let lint = FixedCheck::new(CheckKind::Lint, |k| Ok(CheckResult::pass(k)));
        let lint_runs = Arc::clone(&lint.runs);
        let orchestrator = VerificationOrchestrator::default()
            .with_check(FixedCheck::new(CheckKind::Build, |_| {
                anyhow::bail!("tsc not installed")
            }))
            .with_check(lint);

        let result = orchestrator.run_all(&ctx()).await;
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(lint_runs.load(Ordering::SeqCst), 1);

        let build = result.check(CheckKind::Build).unwrap();
        assert_eq!(build.status, CheckStatus::Fail);
        assert_eq!(build.issues[0].severity, Severity::High);
        assert!(build.issues[0].message.contains("tsc not installed"));
        assert_eq!(result.check(CheckKind::Lint).unwrap().status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn test_results_keep_registration_order() {
        let orchestrator = VerificationOrchestrator::default()
            .with_check(FixedCheck::new(CheckKind::SecurityScan, |k| Ok(CheckResult::pass(k))))
            .with_check(FixedCheck::new(CheckKind::Build, |k| Ok(CheckResult::skip(k))));
        let result = orchestrator.run_all(&ctx()).await;
        let names: Vec<CheckKind> = result.checks.iter().map(|c| c.name).collect();
        assert_eq!(names, vec![CheckKind::SecurityScan, CheckKind::Build]);
        assert!(result.is_pass());
        assert_eq!(result.summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_same_kind_replaces_existing_check() {
        let orchestrator = VerificationOrchestrator::default()
            .with_check(FixedCheck::new(CheckKind::Build, |k| Ok(CheckResult::pass(k))))
            .with_check(FixedCheck::new(CheckKind::Lint, |k| Ok(CheckResult::pass(k))))
            .with_check(FixedCheck::new(CheckKind::Build, |k| Ok(CheckResult::skip(k))));
        assert_eq!(orchestrator.kinds(), vec![CheckKind::Build, CheckKind::Lint]);
        let result = orchestrator.run_all(&ctx()).await;
        assert_eq!(result.checks[0].status, CheckStatus::Skip);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_check_fails_with_high_issue() {
        let orchestrator = VerificationOrchestrator::new(Duration::from_secs(5)).with_check(SlowCheck);
        let result = orchestrator.run_all(&ctx()).await;
        let check = result.check(CheckKind::UnitTests).unwrap();
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.issues[0].message.contains("timed out after 5s"));
        assert!(check.issues[0].is_blocking());
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_checks() {
        let orchestrator = VerificationOrchestrator::default().with_check(SlowCheck);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = orchestrator.run_all(&ctx().with_cancel(cancel)).await;
        assert!(!result.is_pass());
        assert!(result.checks[0].issues[0].message.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_run_check_single_and_unknown() {
        let orchestrator = VerificationOrchestrator::default().with_check(FixedCheck::new(
            CheckKind::ApiSchema,
            |k| Ok(CheckResult::fail(k, vec![Issue::medium("duplicate endpoint")])),
        ));
        let result = orchestrator
            .run_check(CheckKind::ApiSchema, &ctx())
            .await
            .unwrap();
        assert_eq!(result.name, CheckKind::ApiSchema);
        assert_eq!(result.status, CheckStatus::Fail);

        let err = orchestrator
            .run_check(CheckKind::Lint, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::UnknownCheck { check: CheckKind::Lint }));
    }

    #[test]
    fn test_builtin_registers_every_kind_in_order() {
        let orchestrator = VerificationOrchestrator::builtin(&VerificationSection::default());
        assert_eq!(orchestrator.kinds(), CheckKind::ALL.to_vec());
    }
}
