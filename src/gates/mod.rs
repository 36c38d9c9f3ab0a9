//! Severity gate over verification results.
//!
//! The gate is a pure function: it walks every issue of every check and blocks
//! on `high` or `critical` severity. `low` and `medium` issues never block,
//! however many there are.

use appforge_common::{Issue, VerificationResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pass,
    Fail,
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Decision derived from a verification result. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub status: GateStatus,
    /// Blocking issues, in check order. Empty when passing.
    pub blocking: Vec<Issue>,
    pub message: String,
}

impl GateResult {
    pub fn is_pass(&self) -> bool {
        self.status == GateStatus::Pass
    }
}

/// Decide pass/fail from the severities of all issues in `result`.
pub fn gate_from_verification(result: &VerificationResult) -> GateResult {
    let blocking: Vec<Issue> = result
        .issues()
        .filter(|issue| issue.is_blocking())
        .cloned()
        .collect();

    if blocking.is_empty() {
        let advisory = result.issues().count();
        GateResult {
            status: GateStatus::Pass,
            blocking,
            message: format!("Gate passed ({} non-blocking issue(s))", advisory),
        }
    } else {
        GateResult {
            status: GateStatus::Fail,
            message: format!("Gate failed: {} blocking issue(s)", blocking.len()),
            blocking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_common::{CheckKind, CheckResult, Severity};

    fn result_with(severities: Vec<Vec<Severity>>) -> VerificationResult {
        let checks = severities
            .into_iter()
            .zip(CheckKind::ALL.iter().cycle())
            .map(|(issues, kind)| {
                let issues = issues
                    .into_iter()
                    .map(|s| Issue::new(s, format!("{} issue", s)))
                    .collect();
                CheckResult::from_issues(*kind, issues)
            })
            .collect();
        VerificationResult::from_checks(checks)
    }

    #[test]
    fn test_no_issues_passes() {
        let gate = gate_from_verification(&result_with(vec![vec![], vec![]]));
        assert!(gate.is_pass());
        assert!(gate.blocking.is_empty());
    }

    #[test]
    fn test_low_and_medium_never_block() {
        use Severity::*;
        let cases = vec![
            vec![vec![Low]],
            vec![vec![Medium, Medium, Low]],
            vec![
                vec![Low],
                vec![Medium],
                vec![Low, Low, Low, Medium],
                vec![],
                vec![Medium],
            ],
        ];
        for case in cases {
            let result = result_with(case);
            assert!(!result.is_pass(), "checks with issues fail individually");
            assert_eq!(gate_from_verification(&result).status, GateStatus::Pass);
        }
    }

    #[test]
    fn test_any_high_or_critical_blocks() {
        use Severity::*;
        let cases = vec![
            (vec![vec![High]], 1),
            (vec![vec![Critical]], 1),
            (vec![vec![Low, High], vec![Medium]], 1),
            (
                vec![vec![], vec![], vec![], vec![], vec![Critical, High, Low]],
                2,
            ),
            (vec![vec![High], vec![Critical], vec![High]], 3),
        ];
        for (case, expected) in cases {
            let gate = gate_from_verification(&result_with(case));
            assert_eq!(gate.status, GateStatus::Fail);
            assert_eq!(gate.blocking.len(), expected);
            assert!(gate.message.contains(&expected.to_string()));
            assert!(gate.blocking.iter().all(|i| i.is_blocking()));
        }
    }

    #[test]
    fn test_gate_is_pure() {
        use Severity::*;
        let result = result_with(vec![vec![Low, Critical], vec![High]]);
        let first = gate_from_verification(&result);
        let second = gate_from_verification(&result);
        assert_eq!(first, second);
    }

    #[test]
    fn test_blocking_issues_keep_check_order() {
        let result = VerificationResult::from_checks(vec![
            CheckResult::fail(CheckKind::Build, vec![Issue::high("tsc failed")]),
            CheckResult::fail(CheckKind::SecurityScan, vec![Issue::critical("leaked key")]),
        ]);
        let gate = gate_from_verification(&result);
        assert_eq!(gate.blocking[0].message, "tsc failed");
        assert_eq!(gate.blocking[1].message, "leaked key");
    }
}
