//! Deterministic agents that need no model provider.
//!
//! Each payload is a schema-valid skeleton derived from the prompt and from
//! whatever inputs the stage received. Useful for dry runs and for exercising
//! the pipeline end to end.

use anyhow::{Context, Result, bail};
use appforge_common::ArtifactType;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeSet;

use super::{AgentContext, AgentInvoker, ImplementationAgents};

const MAX_FEATURES: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAgents;

impl OfflineAgents {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentInvoker for OfflineAgents {
    async fn run_agent_to_artifact(
        &self,
        agent_id: &str,
        artifact_type: ArtifactType,
        ctx: &AgentContext,
    ) -> Result<Value> {
        if ctx.cancel.is_cancelled() {
            bail!("cancelled before {} produced {}", agent_id, artifact_type);
        }
        tracing::debug!(agent = agent_id, artifact = %artifact_type, "offline agent producing artifact");

        let payload = match artifact_type {
            ArtifactType::Prd => prd(ctx),
            ArtifactType::Architecture => architecture(ctx),
            ArtifactType::ApiContract => api_contract(ctx),
            ArtifactType::UiSpec => ui_spec(ctx),
            ArtifactType::BackendSpec => backend_spec(ctx),
            ArtifactType::MobileSpec => mobile_spec(ctx),
            ArtifactType::SecurityReport => security_report(ctx),
            ArtifactType::TestPlan => test_plan(ctx),
            ArtifactType::VerificationResult | ArtifactType::RunManifest => {
                bail!("{} is produced by the pipeline, not by agents", artifact_type)
            }
        };
        Ok(payload)
    }
}

#[async_trait]
impl ImplementationAgents for OfflineAgents {
    async fn run_implementation_agents(&self, ctx: &AgentContext) -> Result<()> {
        if ctx.cancel.is_cancelled() {
            bail!("cancelled before implementation");
        }

        let spec_dir = ctx.output_dir.join("spec");
        tokio::fs::create_dir_all(&spec_dir)
            .await
            .with_context(|| format!("Failed to create {}", spec_dir.display()))?;

        for (artifact_type, data) in &ctx.inputs {
            let path = spec_dir.join(format!("{}.json", artifact_type));
            let content = serde_json::to_string_pretty(data)
                .with_context(|| format!("Failed to serialize {}", artifact_type))?;
            tokio::fs::write(&path, content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        let readme = ctx.output_dir.join("README.md");
        tokio::fs::write(&readme, readme_text(ctx))
            .await
            .with_context(|| format!("Failed to write {}", readme.display()))?;

        tracing::info!(
            run_id = %ctx.run_id,
            output_dir = %ctx.output_dir.display(),
            specs = ctx.inputs.len(),
            "offline implementation written"
        );
        Ok(())
    }
}

fn readme_text(ctx: &AgentContext) -> String {
    let mut text = format!("# {}\n\n{}\n", ctx.project_name, ctx.prompt.trim());
    let endpoints = endpoints_of(ctx);
    if !endpoints.is_empty() {
        text.push_str("\n## API\n\n");
        for (method, path) in endpoints {
            text.push_str(&format!("- `{} {}`\n", method, path));
        }
    }
    text.push_str("\nSpecifications live in `spec/`.\n");
    text
}

/// Clauses of the prompt, used as feature names.
fn feature_names(prompt: &str) -> Vec<String> {
    prompt
        .split([',', ';', '.', '\n'])
        .flat_map(|clause| clause.split(" and "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(MAX_FEATURES)
        .collect()
}

/// Lowercase, `-`-joined slug of the first three words.
fn slug(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(3)
        .map(|w| w.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// Feature names from the stored PRD, or from the prompt when absent.
fn features_of(ctx: &AgentContext) -> Vec<String> {
    let from_prd: Vec<String> = ctx
        .input(ArtifactType::Prd)
        .and_then(|prd| prd.get("features"))
        .and_then(Value::as_array)
        .map(|features| {
            features
                .iter()
                .filter_map(|f| f.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if from_prd.is_empty() {
        feature_names(&ctx.prompt)
    } else {
        from_prd
    }
}

/// Distinct resource slugs, in feature order.
fn resources_of(ctx: &AgentContext) -> Vec<String> {
    let mut seen = BTreeSet::new();
    features_of(ctx)
        .iter()
        .map(|f| slug(f))
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

fn endpoints_of(ctx: &AgentContext) -> Vec<(String, String)> {
    ctx.input(ArtifactType::ApiContract)
        .and_then(|c| c.get("endpoints"))
        .and_then(Value::as_array)
        .map(|endpoints| {
            endpoints
                .iter()
                .filter_map(|e| {
                    let method = e.get("method")?.as_str()?;
                    let path = e.get("path")?.as_str()?;
                    Some((method.to_string(), path.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn prd(ctx: &AgentContext) -> Value {
    let features: Vec<Value> = feature_names(&ctx.prompt)
        .into_iter()
        .enumerate()
        .map(|(i, name)| json!({"id": format!("F{}", i + 1), "name": name, "priority": "must"}))
        .collect();
    json!({
        "title": ctx.project_name,
        "summary": ctx.prompt.trim(),
        "features": features,
    })
}

fn architecture(ctx: &AgentContext) -> Value {
    let mut components = vec![
        json!({"name": "mobile-app", "kind": "client"}),
        json!({"name": "api", "kind": "service"}),
        json!({"name": "database", "kind": "storage"}),
    ];
    components.extend(
        resources_of(ctx)
            .into_iter()
            .map(|r| json!({"name": format!("{}-module", r), "kind": "module"})),
    );
    json!({
        "stack": {
            "mobile": "react-native",
            "backend": "node-express",
            "database": "sqlite",
        },
        "components": components,
    })
}

fn api_contract(ctx: &AgentContext) -> Value {
    let mut endpoints = vec![json!({"method": "GET", "path": "/health"})];
    for resource in resources_of(ctx) {
        endpoints.push(json!({"method": "GET", "path": format!("/{}", resource)}));
        endpoints.push(json!({"method": "POST", "path": format!("/{}", resource)}));
    }
    json!({ "endpoints": endpoints })
}

fn ui_spec(ctx: &AgentContext) -> Value {
    let mut screens = vec![json!({"name": "home"})];
    screens.extend(resources_of(ctx).into_iter().map(|r| json!({"name": r})));
    json!({ "screens": screens })
}

fn backend_spec(ctx: &AgentContext) -> Value {
    let resources = resources_of(ctx);
    let models: Vec<Value> = resources
        .iter()
        .map(|r| json!({"name": r, "fields": [{"name": "id", "type": "string"}]}))
        .collect();
    let services: Vec<Value> = resources
        .iter()
        .map(|r| json!({"name": format!("{}-service", r), "model": r}))
        .collect();
    json!({ "models": models, "services": services })
}

fn mobile_spec(ctx: &AgentContext) -> Value {
    let screens = ctx
        .input(ArtifactType::UiSpec)
        .and_then(|ui| ui.get("screens"))
        .cloned()
        .unwrap_or_else(|| json!([]));
    json!({ "platforms": ["ios", "android"], "screens": screens })
}

fn security_report(ctx: &AgentContext) -> Value {
    let findings: Vec<Value> = endpoints_of(ctx)
        .into_iter()
        .filter(|(method, _)| method != "GET")
        .map(|(method, path)| {
            json!({
                "severity": "low",
                "title": format!("Validate request bodies on {} {}", method, path),
            })
        })
        .collect();
    json!({ "findings": findings })
}

fn test_plan(ctx: &AgentContext) -> Value {
    let cases: Vec<Value> = endpoints_of(ctx)
        .into_iter()
        .enumerate()
        .map(|(i, (method, path))| {
            json!({
                "id": format!("T{}", i + 1),
                "description": format!("{} {} responds successfully", method, path),
            })
        })
        .collect();
    json!({ "cases": cases })
}
