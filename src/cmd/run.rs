//! Pipeline execution command: `appforge run`.

use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use appforge::agents::OfflineAgents;
use appforge::artifact::write_run;
use appforge::config::{CliOverrides, Config};
use appforge::gates::GateStatus;
use appforge::logging;
use appforge::pipeline::{PipelineEvent, PipelineOrchestrator, PipelineResult};

use crate::Cli;

pub struct RunArgs {
    pub prompt: String,
    pub project_name: Option<String>,
    pub output_dir: PathBuf,
    pub max_repair_attempts: Option<u32>,
    pub no_escalate: bool,
    pub json: bool,
}

/// Run the pipeline with the offline agents. Returns whether the run
/// succeeded.
pub async fn cmd_run(cli: &Cli, cwd: &Path, args: RunArgs) -> Result<bool> {
    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        max_repair_attempts: args.max_repair_attempts,
        no_escalate: args.no_escalate,
        verbose: cli.verbose,
    };
    let config = Config::load(cwd, &overrides)?;

    let output_dir = if args.output_dir.is_absolute() {
        args.output_dir.clone()
    } else {
        cwd.join(&args.output_dir)
    };
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let _log_guard = logging::init(&config.log_settings(Some(&output_dir)))?;
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    let pipeline_config =
        config.pipeline_config(&args.prompt, args.project_name.as_deref(), &output_dir)?;

    let agents = Arc::new(OfflineAgents::new());
    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(100);
    let orchestrator = PipelineOrchestrator::new(agents.clone(), agents)
        .with_verifier(config.verifier())
        .with_options(config.pipeline_options())
        .with_event_channel(event_tx);

    let quiet = args.json;
    let display_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !quiet {
                render_event(&event);
            }
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            ctrl_c.cancel();
        }
    });

    let result = orchestrator.run(pipeline_config, cancel).await;
    // Closes the event channel so the display task ends.
    drop(orchestrator);
    let _ = display_handle.await;

    let run_dir = write_run(
        &output_dir,
        &result.run_id,
        &result.artifacts,
        result.manifest.as_ref(),
    )?;

    if args.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
        println!("{}", json);
    } else {
        print_summary(&result, &run_dir);
    }

    Ok(result.success)
}

fn render_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::RunStarted {
            run_id,
            project_name,
        } => {
            eprintln!();
            eprintln!(
                "{} {} {}",
                style("appforge").bold().cyan(),
                style(project_name).bold(),
                style(format!("(run {})", run_id)).dim()
            );
            eprintln!("─────────────────────────");
        }
        PipelineEvent::StageStarted { stage } => {
            eprintln!("{} [{}/10] {}", style("▶").cyan(), stage.number(), stage);
        }
        PipelineEvent::StageCompleted { stage, duration_ms } => {
            eprintln!(
                "{} {} {}",
                style("✓").green(),
                stage,
                style(format!("({} ms)", duration_ms)).dim()
            );
        }
        PipelineEvent::ArtifactStored {
            artifact_type,
            version,
            created_by,
        } => {
            eprintln!(
                "    {} v{} by {}",
                artifact_type,
                version,
                style(created_by).dim()
            );
        }
        PipelineEvent::VerificationCompleted {
            status,
            passed,
            failed,
            skipped,
        } => {
            eprintln!(
                "    verification {}: {} passed, {} failed, {} skipped",
                status, passed, failed, skipped
            );
        }
        PipelineEvent::GateEvaluated { status, blocking } => match status {
            GateStatus::Pass => eprintln!("    gate {}", style("passed").green()),
            GateStatus::Fail => eprintln!(
                "    gate {} ({} blocking issue(s))",
                style("failed").red(),
                blocking
            ),
        },
        PipelineEvent::RepairAttempt {
            attempt,
            max_attempts,
        } => {
            eprintln!(
                "{} repair attempt {}/{}",
                style("↻").yellow(),
                attempt,
                max_attempts
            );
        }
        PipelineEvent::RepairAttemptFailed { attempt, reason } => {
            eprintln!(
                "    attempt {} did not pass: {}",
                attempt,
                style(reason).yellow()
            );
        }
        PipelineEvent::RunFinished { .. } => {}
    }
}

fn print_summary(result: &PipelineResult, run_dir: &Path) {
    println!();
    if result.success {
        println!(
            "{} Run {} complete: {} artifact(s)",
            style("✓").green().bold(),
            result.run_id,
            result.artifacts.len()
        );
    } else {
        println!(
            "{} Run {} failed after {} artifact(s)",
            style("✗").red().bold(),
            result.run_id,
            result.artifacts.len()
        );
        if let Some(error) = &result.error {
            println!("  {}", style(error).red());
        }
    }
    println!("  Run record: {}", run_dir.display());
    println!();
}
