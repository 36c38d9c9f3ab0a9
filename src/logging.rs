//! Tracing subscriber setup for the binary.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const LOG_FILE_PREFIX: &str = "appforge.log";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub verbose: bool,
    /// JSON lines on stderr instead of human-readable output.
    pub json: bool,
    /// Directory for daily-rolled JSON log files. `None` disables file logs.
    pub file_dir: Option<PathBuf>,
}

/// Where run logs go for a given output directory.
pub fn log_dir(output_dir: &Path) -> PathBuf {
    output_dir.join(".appforge").join("logs")
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "appforge=debug"
    } else {
        "appforge=info"
    }
}

/// `RUST_LOG` wins over the verbosity default.
fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

type FilteredRegistry = Layered<EnvFilter, Registry>;

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(settings.verbose);

    let console_layer: Box<dyn Layer<FilteredRegistry> + Send + Sync> = if settings.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match &settings.file_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
