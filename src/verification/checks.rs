//! Built-in verification checks.

use anyhow::{Context, Result};
use appforge_common::{ArtifactType, CheckKind, CheckResult, Issue, Severity};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::process::Command;
use walkdir::WalkDir;

use super::{CheckContext, VerificationCheck};

/// Lines of command output kept in a failure issue.
const OUTPUT_TAIL_LINES: usize = 20;

/// Runs a shell command in the output directory. Used for build, lint and
/// unit tests.
#[derive(Debug, Clone)]
pub struct CommandCheck {
    kind: CheckKind,
    command: Option<String>,
}

impl CommandCheck {
    /// `None` (or a blank command) makes the check report `skip`.
    pub fn new(kind: CheckKind, command: Option<String>) -> Self {
        let command = command.filter(|c| !c.trim().is_empty());
        Self { kind, command }
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }
}

#[async_trait]
impl VerificationCheck for CommandCheck {
    fn kind(&self) -> CheckKind {
        self.kind
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckResult> {
        let Some(command) = &self.command else {
            tracing::debug!(check = %self.kind, "no command configured, skipping");
            return Ok(CheckResult::skip(self.kind));
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&ctx.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("APPFORGE_RUN_ID", &ctx.run_id)
            .kill_on_drop(true);
        // Own group, so a timeout or cancellation also reaches `npm`, `tsc`
        // and whatever else the shell started.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn `{}`", command))?;
        let group = ProcessGroupGuard::new(child.id());
        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for `{}`", command))?;
        group.disarm();

        if output.status.success() {
            return Ok(CheckResult::pass(self.kind));
        }

        let exit = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let tail = output_tail(&combined, OUTPUT_TAIL_LINES);

        let message = if tail.is_empty() {
            format!("`{}` exited with {}", command, exit)
        } else {
            format!("`{}` exited with {}:\n{}", command, exit, tail)
        };
        Ok(CheckResult::fail(self.kind, vec![Issue::high(message)]))
    }
}

/// Kills a command's whole process group when dropped before [`disarm`].
///
/// [`disarm`]: ProcessGroupGuard::disarm
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created for this
    // command by `process_group(0)`.
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

fn output_tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Validates the endpoints declared in the stored `api_contract` artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiSchemaCheck;

impl ApiSchemaCheck {
    /// Issues for an `api_contract` payload.
    pub fn inspect(contract: &Value) -> Vec<Issue> {
        let Some(endpoints) = contract.get("endpoints").and_then(Value::as_array) else {
            return vec![Issue::high("api_contract has no 'endpoints' array")];
        };
        if endpoints.is_empty() {
            return vec![Issue::medium("api_contract declares no endpoints")];
        }

        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        for (index, endpoint) in endpoints.iter().enumerate() {
            let method = endpoint.get("method").and_then(Value::as_str).unwrap_or("");
            let path = endpoint.get("path").and_then(Value::as_str).unwrap_or("");
            let label = format!("endpoint #{} ({} {})", index, method, path);

            let method_upper = method.to_ascii_uppercase();
            let method_ok = HTTP_METHODS.contains(&method_upper.as_str());
            if !method_ok {
                issues.push(Issue::high(format!(
                    "{}: unknown HTTP method '{}'",
                    label, method
                )));
            }
            let path_ok = path.starts_with('/');
            if !path_ok {
                issues.push(Issue::high(format!(
                    "{}: path must start with '/'",
                    label
                )));
            }
            if method_ok && path_ok && !seen.insert((method_upper, path.to_string())) {
                issues.push(Issue::medium(format!("{}: duplicate endpoint", label)));
            }
        }
        issues
    }
}

#[async_trait]
impl VerificationCheck for ApiSchemaCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::ApiSchema
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckResult> {
        let issues = match ctx.artifacts.get(&ArtifactType::ApiContract) {
            Some(contract) => Self::inspect(contract),
            None => vec![Issue::high("api_contract artifact is missing")],
        };
        Ok(CheckResult::from_issues(CheckKind::ApiSchema, issues))
    }
}

struct SecretPattern {
    regex: Regex,
    severity: Severity,
    description: &'static str,
}

static SECRET_PATTERNS: LazyLock<Vec<SecretPattern>> = LazyLock::new(|| {
    vec![
        SecretPattern {
            regex: Regex::new(r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |ENCRYPTED )?PRIVATE KEY-----")
                .expect("private key regex is valid"),
            severity: Severity::Critical,
            description: "private key",
        },
        SecretPattern {
            regex: Regex::new(r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b").expect("access key regex is valid"),
            severity: Severity::Critical,
            description: "AWS access key id",
        },
        SecretPattern {
            regex: Regex::new(
                r#"(?i)\b(?:api[_-]?key|secret(?:[_-]?key)?|password|passwd|access[_-]?token|auth[_-]?token)\b["']?\s*[:=]\s*["'][^"'\s]{8,}["']"#,
            )
            .expect("credential regex is valid"),
            severity: Severity::High,
            description: "hard-coded credential",
        },
    ]
});

/// Directories never scanned.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", ".appforge", "target"];

/// Files larger than this are not scanned.
const MAX_SCAN_BYTES: u64 = 1024 * 1024;

/// Scans the generated project for committed secrets.
#[derive(Debug, Clone)]
pub struct SecretScanCheck {
    skipped_dirs: Vec<String>,
}

impl Default for SecretScanCheck {
    fn default() -> Self {
        Self {
            skipped_dirs: SKIPPED_DIRS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl SecretScanCheck {
    pub fn skip_dir(mut self, name: &str) -> Self {
        self.skipped_dirs.push(name.to_string());
        self
    }

    /// Scan `root` synchronously. Unreadable or non-UTF-8 files are ignored.
    pub fn scan(&self, root: &Path) -> Vec<Issue> {
        let mut issues = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry.depth() > 0
                    && self
                        .skipped_dirs
                        .iter()
                        .any(|d| entry.file_name().to_string_lossy() == d.as_str()))
            });

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.metadata().map(|m| m.len() > MAX_SCAN_BYTES).unwrap_or(true) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            let relative = relative_display(root, entry.path());
            issues.extend(scan_text(&content, &relative));
        }
        issues
    }
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn scan_text(content: &str, file: &str) -> Vec<Issue> {
    let mut issues = Vec::new();
    for (line_index, line) in content.lines().enumerate() {
        for pattern in SECRET_PATTERNS.iter() {
            if let Some(found) = pattern.regex.find(line) {
                issues.push(
                    Issue::new(
                        pattern.severity,
                        format!("possible {} committed", pattern.description),
                    )
                    .with_file(file)
                    .at(line_index as u32 + 1, found.start() as u32 + 1),
                );
            }
        }
    }
    issues
}

#[async_trait]
impl VerificationCheck for SecretScanCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::SecurityScan
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckResult> {
        let root: PathBuf = ctx.output_dir.clone();
        if !root.is_dir() {
            anyhow::bail!("output directory {} does not exist", root.display());
        }
        let scanner = self.clone();
        let issues = tokio::task::spawn_blocking(move || scanner.scan(&root))
            .await
            .context("secret scan task panicked")?;
        Ok(CheckResult::from_issues(CheckKind::SecurityScan, issues))
    }
}
