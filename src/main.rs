use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "appforge")]
#[command(version, about = "Multi-agent app generation pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to appforge.toml (defaults to ./appforge.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline for an app description
    Run {
        /// Natural-language description of the app
        #[arg(short, long)]
        prompt: String,

        /// Project name (defaults to project.name, then the output directory name)
        #[arg(long)]
        project_name: Option<String>,

        /// Directory the generated project is written to
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Repair attempts after a failing verification gate
        #[arg(long)]
        max_repair_attempts: Option<u32>,

        /// Fail without an escalation error when repair is exhausted
        #[arg(long)]
        no_escalate: bool,

        /// Print the pipeline result as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Show agent contracts
    Contracts {
        /// Only show this agent
        agent: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// View, validate or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigCommands {
    Show,
    Validate,
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    match &cli.command {
        Commands::Run {
            prompt,
            project_name,
            output_dir,
            max_repair_attempts,
            no_escalate,
            json,
        } => {
            let args = cmd::RunArgs {
                prompt: prompt.clone(),
                project_name: project_name.clone(),
                output_dir: output_dir.clone(),
                max_repair_attempts: *max_repair_attempts,
                no_escalate: *no_escalate,
                json: *json,
            };
            let success = cmd::cmd_run(&cli, &cwd, args).await?;
            if !success {
                std::process::exit(1);
            }
        }
        Commands::Contracts { agent, json } => {
            cmd::cmd_contracts(agent.as_deref(), *json)?;
        }
        Commands::Config { command } => {
            cmd::cmd_config(&cli, &cwd, *command)?;
        }
    }

    Ok(())
}
