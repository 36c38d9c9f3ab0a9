use anyhow::{Context, Result};
use appforge_common::ArtifactType;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::RunManifest;

/// `<output_dir>/.appforge/runs/<run_id>`
pub fn run_dir(output_dir: &Path, run_id: &str) -> PathBuf {
    output_dir.join(".appforge").join("runs").join(run_id)
}

/// Write a finished run to disk: `manifest.json` plus one
/// `artifacts/<type>.json` per stored artifact. Returns the run directory.
pub fn write_run(
    output_dir: &Path,
    run_id: &str,
    artifacts: &BTreeMap<ArtifactType, Value>,
    manifest: Option<&RunManifest>,
) -> Result<PathBuf> {
    let dir = run_dir(output_dir, run_id);
    let artifact_dir = dir.join("artifacts");
    std::fs::create_dir_all(&artifact_dir)
        .with_context(|| format!("Failed to create run directory {}", artifact_dir.display()))?;

    for (artifact_type, data) in artifacts {
        write_json(&artifact_dir.join(format!("{}.json", artifact_type)), data)?;
    }
    if let Some(manifest) = manifest {
        write_json(&dir.join("manifest.json"), manifest)?;
    }

    tracing::debug!(run_id, dir = %dir.display(), artifacts = artifacts.len(), "run persisted");
    Ok(dir)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Read back a manifest written by [`write_run`].
pub fn read_manifest(run_dir: &Path) -> Result<RunManifest> {
    let path = run_dir.join("manifest.json");
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid manifest {}", path.display()))
}
