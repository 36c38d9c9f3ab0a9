use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use crate::appforge_config::{AppforgeToml, CONFIG_FILE_NAME};
use crate::logging::{LogSettings, log_dir};
use crate::pipeline::{PipelineConfig, PipelineOptions};
use crate::verification::VerificationOrchestrator;

/// Flags from the command line that override file and environment settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    /// Explicit config file; must exist when given.
    pub config_path: Option<PathBuf>,
    pub max_repair_attempts: Option<u32>,
    pub no_escalate: bool,
    pub verbose: bool,
}

/// Runtime configuration.
///
/// Bridges `appforge.toml`, the `APPFORGE_*` environment variables and CLI
/// flags into the values the pipeline needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub toml: AppforgeToml,
    /// The file the settings came from, if any.
    pub source: Option<PathBuf>,
    pub verbose: bool,
    env_warnings: Vec<String>,
}

impl Config {
    /// Load from `dir` (or the explicit path) and the process environment.
    pub fn load(dir: &Path, cli: &CliOverrides) -> Result<Self> {
        Self::load_with_env(dir, cli, |name| std::env::var(name).ok())
    }

    /// Like [`Config::load`], reading environment variables through `lookup`.
    pub fn load_with_env(
        dir: &Path,
        cli: &CliOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let (file, source) = match &cli.config_path {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                (AppforgeToml::load(path)?, Some(path.clone()))
            }
            None => {
                let default_path = dir.join(CONFIG_FILE_NAME);
                let source = default_path.exists().then_some(default_path);
                (AppforgeToml::load_or_default(dir)?, source)
            }
        };

        let mut toml = file;
        let env_warnings = toml.apply_overrides_from(lookup);
        if let Some(attempts) = cli.max_repair_attempts {
            toml.pipeline.max_repair_attempts = attempts;
        }
        if cli.no_escalate {
            toml.pipeline.escalate_on_failure = false;
        }

        Ok(Self {
            toml,
            source,
            verbose: cli.verbose,
            env_warnings,
        })
    }

    /// Rejected environment overrides followed by `appforge.toml` validation
    /// warnings.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = self.env_warnings.clone();
        warnings.extend(self.toml.validate());
        warnings
    }

    pub fn max_repair_attempts(&self) -> u32 {
        self.toml.pipeline.max_repair_attempts
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            escalate_on_failure: self.toml.pipeline.escalate_on_failure,
            stage_timeout: self.toml.pipeline.stage_timeout(),
        }
    }

    /// The built-in checks with the configured commands and timeout.
    pub fn verifier(&self) -> VerificationOrchestrator {
        VerificationOrchestrator::builtin(&self.toml.verification)
    }

    /// Build the run inputs. The project name falls back to the config file,
    /// then to the output directory's name.
    pub fn pipeline_config(
        &self,
        prompt: &str,
        project_name: Option<&str>,
        output_dir: &Path,
    ) -> Result<PipelineConfig> {
        if prompt.trim().is_empty() {
            bail!("Prompt must not be empty");
        }

        let project_name = project_name
            .map(str::to_string)
            .or_else(|| self.toml.project.name.clone())
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                output_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .context("No project name: pass --project-name or set project.name")?;

        Ok(PipelineConfig::new(prompt, &project_name, output_dir)
            .with_max_repair_attempts(self.max_repair_attempts()))
    }

    /// Log settings; file logging goes under `output_dir` when enabled.
    pub fn log_settings(&self, output_dir: Option<&Path>) -> LogSettings {
        LogSettings {
            verbose: self.verbose,
            json: self.toml.logging.json,
            file_dir: output_dir
                .filter(|_| self.toml.logging.file)
                .map(log_dir),
        }
    }
}
