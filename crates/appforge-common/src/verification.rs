//! Verification result types.
//!
//! A [`VerificationResult`] aggregates one [`CheckResult`] per [`CheckKind`].
//! Each check carries the [`Issue`]s it found; the gate later decides from
//! issue severities whether the run may proceed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParseError;

/// Severity of a single verification issue, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High and critical issues block the gate.
    ///
    /// ```
    /// use appforge_common::Severity;
    ///
    /// assert!(Severity::Critical.is_blocking());
    /// assert!(!Severity::Medium.is_blocking());
    /// ```
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One problem reported by a verification check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl Issue {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    pub fn low(message: impl Into<String>) -> Self {
        Self::new(Severity::Low, message)
    }

    pub fn medium(message: impl Into<String>) -> Self {
        Self::new(Severity::Medium, message)
    }

    pub fn high(message: impl Into<String>) -> Self {
        Self::new(Severity::High, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, message)
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Set the 1-based line and column of the issue.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity.is_blocking()
    }

    /// `file:line:column` when known.
    pub fn location(&self) -> Option<String> {
        let file = self.file.as_deref()?;
        Some(match (self.line, self.column) {
            (Some(line), Some(col)) => format!("{}:{}:{}", file, line, col),
            (Some(line), None) => format!("{}:{}", file, line),
            _ => file.to_string(),
        })
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location() {
            Some(loc) => write!(f, "[{}] {} ({})", self.severity, self.message, loc),
            None => write!(f, "[{}] {}", self.severity, self.message),
        }
    }
}

/// The fixed set of verification checks, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Type check / build of the generated project.
    Build,
    Lint,
    UnitTests,
    /// Validation of the API contract document.
    ApiSchema,
    SecurityScan,
}

impl CheckKind {
    pub const ALL: [CheckKind; 5] = [
        CheckKind::Build,
        CheckKind::Lint,
        CheckKind::UnitTests,
        CheckKind::ApiSchema,
        CheckKind::SecurityScan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Lint => "lint",
            Self::UnitTests => "unit_tests",
            Self::ApiSchema => "api_schema",
            Self::SecurityScan => "security_scan",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "tests" | "test" => return Ok(Self::UnitTests),
            "typescript" | "typecheck" => return Ok(Self::Build),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| ParseError::new("check", s))
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    #[default]
    Pass,
    Fail,
    Skip,
}

impl CheckStatus {
    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// Result of running one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: CheckKind,
    pub status: CheckStatus,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl CheckResult {
    pub fn pass(name: CheckKind) -> Self {
        Self {
            name,
            status: CheckStatus::Pass,
            issues: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn fail(name: CheckKind, issues: Vec<Issue>) -> Self {
        Self {
            name,
            status: CheckStatus::Fail,
            issues,
            duration_ms: 0,
        }
    }

    pub fn skip(name: CheckKind) -> Self {
        Self {
            name,
            status: CheckStatus::Skip,
            issues: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Build a result from the issues a check found: any issue fails the check.
    pub fn from_issues(name: CheckKind, issues: Vec<Issue>) -> Self {
        if issues.is_empty() {
            Self::pass(name)
        } else {
            Self::fail(name, issues)
        }
    }

    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn blocking_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.is_blocking())
    }
}

/// Pass/fail/skip counts over a set of checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Aggregate of all check results for one verification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// `Fail` if any check failed, otherwise `Pass`. Never `Skip`.
    pub status: CheckStatus,
    pub checks: Vec<CheckResult>,
    pub summary: VerificationSummary,
    pub timestamp: DateTime<Utc>,
}

impl VerificationResult {
    pub fn from_checks(checks: Vec<CheckResult>) -> Self {
        let summary = Self::summarize(&checks);
        let status = if summary.failed > 0 {
            CheckStatus::Fail
        } else {
            CheckStatus::Pass
        };
        Self {
            status,
            checks,
            summary,
            timestamp: Utc::now(),
        }
    }

    fn summarize(checks: &[CheckResult]) -> VerificationSummary {
        let mut summary = VerificationSummary {
            total: checks.len(),
            ..Default::default()
        };
        for check in checks {
            match check.status {
                CheckStatus::Pass => summary.passed += 1,
                CheckStatus::Fail => summary.failed += 1,
                CheckStatus::Skip => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn is_pass(&self) -> bool {
        self.status == CheckStatus::Pass
    }

    pub fn check(&self, kind: CheckKind) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == kind)
    }

    /// Kinds of the checks whose status is `Fail`, in execution order.
    pub fn failed_checks(&self) -> Vec<CheckKind> {
        self.checks
            .iter()
            .filter(|c| c.status.is_fail())
            .map(|c| c.name)
            .collect()
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.checks.iter().flat_map(|c| c.issues.iter())
    }

    /// Replace the result for `result.name` (or append it) and recompute the
    /// aggregate status and summary.
    pub fn merge_check(mut self, result: CheckResult) -> Self {
        let mut checks = std::mem::take(&mut self.checks);
        match checks.iter_mut().find(|c| c.name == result.name) {
            Some(existing) => *existing = result,
            None => checks.push(result),
        }
        Self::from_checks(checks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert!(Severity::High.is_blocking());
        assert!(!Severity::Low.is_blocking());
    }

    #[test]
    fn test_issue_location() {
        let issue = Issue::high("hard-coded secret").with_file("src/config.ts").at(12, 5);
        assert_eq!(issue.location().as_deref(), Some("src/config.ts:12:5"));
        assert!(issue.to_string().contains("[high]"));
        assert_eq!(Issue::low("x").location(), None);
    }

    #[test]
    fn test_check_kind_aliases() {
        assert_eq!("tests".parse::<CheckKind>().unwrap(), CheckKind::UnitTests);
        assert_eq!("typescript".parse::<CheckKind>().unwrap(), CheckKind::Build);
        assert_eq!("security-scan".parse::<CheckKind>().unwrap(), CheckKind::SecurityScan);
        assert!("fuzz".parse::<CheckKind>().is_err());
    }

    #[test]
    fn test_aggregate_fails_if_any_check_fails() {
        let result = VerificationResult::from_checks(vec![
            CheckResult::pass(CheckKind::Build),
            CheckResult::fail(CheckKind::Lint, vec![Issue::low("unused import")]),
            CheckResult::skip(CheckKind::UnitTests),
        ]);
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(
            result.summary,
            VerificationSummary {
                total: 3,
                passed: 1,
                failed: 1,
                skipped: 1
            }
        );
        assert_eq!(result.failed_checks(), vec![CheckKind::Lint]);
    }

    #[test]
    fn test_skipped_checks_do_not_fail_aggregate() {
        let result = VerificationResult::from_checks(vec![
            CheckResult::pass(CheckKind::Build),
            CheckResult::skip(CheckKind::Lint),
        ]);
        assert!(result.is_pass());
    }

    #[test]
    fn test_merge_check_replaces_and_recomputes() {
        let result = VerificationResult::from_checks(vec![
            CheckResult::pass(CheckKind::Build),
            CheckResult::fail(CheckKind::SecurityScan, vec![Issue::critical("private key")]),
        ]);
        assert!(!result.is_pass());

        let merged = result.merge_check(CheckResult::pass(CheckKind::SecurityScan));
        assert!(merged.is_pass());
        assert_eq!(merged.checks.len(), 2);
        assert_eq!(merged.summary.passed, 2);
    }

    #[test]
    fn test_from_issues() {
        assert_eq!(
            CheckResult::from_issues(CheckKind::ApiSchema, vec![]).status,
            CheckStatus::Pass
        );
        let failed = CheckResult::from_issues(CheckKind::ApiSchema, vec![Issue::medium("dup")]);
        assert_eq!(failed.status, CheckStatus::Fail);
        assert_eq!(failed.blocking_issues().count(), 0);
    }
}
