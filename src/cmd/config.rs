//! Configuration view and validation commands: `appforge config`.

use anyhow::{Result, bail};
use std::path::Path;

use appforge::appforge_config::{AppforgeToml, CONFIG_FILE_NAME, template};
use appforge::config::{CliOverrides, Config};

use crate::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, cwd: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cwd.join(CONFIG_FILE_NAME));

    match command {
        None | Some(ConfigCommands::Show) => {
            let overrides = CliOverrides {
                config_path: cli.config.clone(),
                verbose: cli.verbose,
                ..Default::default()
            };
            let config = Config::load(cwd, &overrides)?;

            println!();
            match &config.source {
                Some(path) => println!("Config file: {}", path.display()),
                None => {
                    println!("No {} found, using defaults.", CONFIG_FILE_NAME);
                    println!("Run 'appforge config init' to create one.");
                }
            }
            println!();
            println!("Effective values (with env overrides):");
            println!();
            print!("{}", config.toml.to_toml_string()?);
            println!();

            let warnings = config.warnings();
            if !warnings.is_empty() {
                println!("Warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE_NAME);
                return Ok(());
            }

            let toml = AppforgeToml::load(&config_path)?;
            let warnings = toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                bail!(
                    "{} already exists. Remove it first to re-initialize.",
                    config_path.display()
                );
            }
            std::fs::write(&config_path, template())?;
            println!("Created {}", config_path.display());
        }
    }

    Ok(())
}
