//! File configuration for appforge.
//!
//! Settings are read from `appforge.toml` in the working directory (or the
//! path given with `--config`). Every section is optional and falls back to
//! defaults. Values are layered file → environment → CLI; this module covers
//! the first two, [`crate::config`] applies the CLI layer.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-app"
//!
//! [pipeline]
//! max_repair_attempts = 3
//! escalate_on_failure = true
//! stage_timeout_secs = 600
//!
//! [verification]
//! check_timeout_secs = 300
//!
//! [verification.commands]
//! build = "npm run build"
//! lint = "npm run lint"
//! tests = "npm test"
//!
//! [logging]
//! json = false
//! file = true
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "appforge.toml";

/// Overrides `pipeline.max_repair_attempts`.
pub const ENV_MAX_REPAIR_ATTEMPTS: &str = "APPFORGE_MAX_REPAIR_ATTEMPTS";
/// Overrides `logging.json`.
pub const ENV_LOG_JSON: &str = "APPFORGE_LOG_JSON";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Default project name when `--project-name` is not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Repair attempts after a failed gate
    #[serde(default = "default_max_repair_attempts")]
    pub max_repair_attempts: u32,
    /// Fail the run with an escalation error when repair is exhausted
    #[serde(default = "default_escalate_on_failure")]
    pub escalate_on_failure: bool,
    /// Per-stage timeout; absent means stages may run indefinitely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_timeout_secs: Option<u64>,
}

fn default_max_repair_attempts() -> u32 {
    3
}

fn default_escalate_on_failure() -> bool {
    true
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_repair_attempts: default_max_repair_attempts(),
            escalate_on_failure: default_escalate_on_failure(),
            stage_timeout_secs: None,
        }
    }
}

impl PipelineSection {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

/// Shell commands for the command-backed checks. Unset commands are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSection {
    #[serde(default = "default_check_timeout_secs")]
    pub check_timeout_secs: u64,
    #[serde(default)]
    pub commands: CommandsSection,
}

fn default_check_timeout_secs() -> u64 {
    300
}

impl Default for VerificationSection {
    fn default() -> Self {
        Self {
            check_timeout_secs: default_check_timeout_secs(),
            commands: CommandsSection::default(),
        }
    }
}

impl VerificationSection {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Emit JSON log lines on stderr
    #[serde(default)]
    pub json: bool,
    /// Also write daily-rolled log files under `<output_dir>/.appforge/logs`
    #[serde(default = "default_log_file")]
    pub file: bool,
}

fn default_log_file() -> bool {
    true
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            json: false,
            file: default_log_file(),
        }
    }
}

/// The complete appforge.toml configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppforgeToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub verification: VerificationSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl AppforgeToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse appforge.toml")
    }

    /// Load `appforge.toml` from `dir`, or defaults when it doesn't exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize appforge.toml")
    }

    /// Apply the environment layer using `lookup` to read variables.
    ///
    /// Unparseable values leave the setting untouched and are returned as
    /// warnings.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(raw) = lookup(ENV_MAX_REPAIR_ATTEMPTS) {
            match raw.trim().parse::<u32>() {
                Ok(n) => self.pipeline.max_repair_attempts = n,
                Err(_) => warnings.push(format!(
                    "{} = {:?} is not a number, keeping max_repair_attempts = {}",
                    ENV_MAX_REPAIR_ATTEMPTS, raw, self.pipeline.max_repair_attempts
                )),
            }
        }
        if let Some(raw) = lookup(ENV_LOG_JSON) {
            self.logging.json = parse_flag(&raw);
        }
        warnings
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.pipeline.max_repair_attempts == 0 {
            warnings.push(
                "pipeline.max_repair_attempts is 0: a failed gate is never repaired".to_string(),
            );
        } else if self.pipeline.max_repair_attempts > 10 {
            warnings.push(format!(
                "pipeline.max_repair_attempts is {}: each attempt re-runs implementation and checks",
                self.pipeline.max_repair_attempts
            ));
        }

        if self.pipeline.stage_timeout_secs == Some(0) {
            warnings.push("pipeline.stage_timeout_secs is 0: every stage will time out".to_string());
        }
        if self.verification.check_timeout_secs == 0 {
            warnings.push(
                "verification.check_timeout_secs is 0: every check will time out".to_string(),
            );
        }

        let commands = &self.verification.commands;
        for (name, command) in [
            ("build", &commands.build),
            ("lint", &commands.lint),
            ("tests", &commands.tests),
        ] {
            if command.as_deref().is_some_and(|c| c.trim().is_empty()) {
                warnings.push(format!(
                    "verification.commands.{} is blank: the check will be skipped",
                    name
                ));
            }
        }

        if let Some(name) = &self.project.name
            && name.trim().is_empty()
        {
            warnings.push("project.name is blank".to_string());
        }

        warnings
    }
}

/// `1`, `true`, `yes` and `on` (any case) are true.
fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Starter file written by `appforge config init`.
pub fn template() -> &'static str {
    r#"# appforge configuration

[project]
# name = "my-app"

[pipeline]
max_repair_attempts = 3
escalate_on_failure = true
# stage_timeout_secs = 600

[verification]
check_timeout_secs = 300

[verification.commands]
# build = "npm run build"
# lint = "npm run lint"
# tests = "npm test"

[logging]
json = false
file = true
"#
}
