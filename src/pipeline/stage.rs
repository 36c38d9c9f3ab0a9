use appforge_common::ArtifactType;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::contract::agent_ids::*;

/// The ten pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prd,
    Architecture,
    UiSpec,
    BackendSpec,
    MobileSpec,
    SecurityReport,
    TestPlan,
    Implementation,
    Verification,
    Manifest,
}

impl Stage {
    pub const ALL: [Stage; 10] = [
        Stage::Prd,
        Stage::Architecture,
        Stage::UiSpec,
        Stage::BackendSpec,
        Stage::MobileSpec,
        Stage::SecurityReport,
        Stage::TestPlan,
        Stage::Implementation,
        Stage::Verification,
        Stage::Manifest,
    ];

    /// Stages whose artifacts come from an external agent.
    pub const SPEC_STAGES: [Stage; 7] = [
        Stage::Prd,
        Stage::Architecture,
        Stage::UiSpec,
        Stage::BackendSpec,
        Stage::MobileSpec,
        Stage::SecurityReport,
        Stage::TestPlan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prd => "prd",
            Self::Architecture => "architecture",
            Self::UiSpec => "ui_spec",
            Self::BackendSpec => "backend_spec",
            Self::MobileSpec => "mobile_spec",
            Self::SecurityReport => "security_report",
            Self::TestPlan => "test_plan",
            Self::Implementation => "implementation",
            Self::Verification => "verification",
            Self::Manifest => "manifest",
        }
    }

    /// 1-based position in the pipeline.
    pub fn number(&self) -> usize {
        *self as usize + 1
    }

    /// Agents acting in this stage. The first one writes the stage's outputs.
    pub fn agents(&self) -> &'static [&'static str] {
        match self {
            Self::Prd => &[PRODUCT_MANAGER],
            Self::Architecture => &[ARCHITECT],
            Self::UiSpec => &[DESIGNER],
            Self::BackendSpec => &[BACKEND_ENGINEER],
            Self::MobileSpec => &[FRONTEND_ENGINEER],
            Self::SecurityReport => &[SECURITY_ENGINEER],
            Self::TestPlan => &[QA_ENGINEER],
            Self::Implementation => &[BACKEND_ENGINEER, FRONTEND_ENGINEER],
            Self::Verification | Self::Manifest => &[ORCHESTRATOR],
        }
    }

    pub fn agent(&self) -> &'static str {
        self.agents()[0]
    }

    /// Artifacts stored by this stage.
    pub fn outputs(&self) -> &'static [ArtifactType] {
        match self {
            Self::Prd => &[ArtifactType::Prd],
            Self::Architecture => &[ArtifactType::Architecture, ArtifactType::ApiContract],
            Self::UiSpec => &[ArtifactType::UiSpec],
            Self::BackendSpec => &[ArtifactType::BackendSpec],
            Self::MobileSpec => &[ArtifactType::MobileSpec],
            Self::SecurityReport => &[ArtifactType::SecurityReport],
            Self::TestPlan => &[ArtifactType::TestPlan],
            Self::Implementation => &[],
            Self::Verification => &[ArtifactType::VerificationResult],
            Self::Manifest => &[ArtifactType::RunManifest],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
