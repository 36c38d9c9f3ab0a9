use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParseError;

/// The closed set of artifact kinds a pipeline run can produce.
///
/// Variants are declared in pipeline order, so the derived `Ord` sorts
/// artifacts the way the stages produce them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Prd,
    Architecture,
    ApiContract,
    UiSpec,
    BackendSpec,
    MobileSpec,
    SecurityReport,
    TestPlan,
    VerificationResult,
    RunManifest,
}

impl ArtifactType {
    /// Every artifact type, in pipeline order.
    pub const ALL: [ArtifactType; 10] = [
        ArtifactType::Prd,
        ArtifactType::Architecture,
        ArtifactType::ApiContract,
        ArtifactType::UiSpec,
        ArtifactType::BackendSpec,
        ArtifactType::MobileSpec,
        ArtifactType::SecurityReport,
        ArtifactType::TestPlan,
        ArtifactType::VerificationResult,
        ArtifactType::RunManifest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prd => "prd",
            Self::Architecture => "architecture",
            Self::ApiContract => "api_contract",
            Self::UiSpec => "ui_spec",
            Self::BackendSpec => "backend_spec",
            Self::MobileSpec => "mobile_spec",
            Self::SecurityReport => "security_report",
            Self::TestPlan => "test_plan",
            Self::VerificationResult => "verification_result",
            Self::RunManifest => "run_manifest",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ParseError::new("artifact type", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_in_pipeline_order() {
        let mut sorted = ArtifactType::ALL;
        sorted.sort();
        assert_eq!(sorted, ArtifactType::ALL);
        assert_eq!(ArtifactType::ALL[0], ArtifactType::Prd);
        assert_eq!(ArtifactType::ALL[9], ArtifactType::RunManifest);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&ArtifactType::ApiContract).unwrap();
        assert_eq!(json, r#""api_contract""#);
        let parsed: ArtifactType = serde_json::from_str(r#""security_report""#).unwrap();
        assert_eq!(parsed, ArtifactType::SecurityReport);
    }

    #[test]
    fn test_from_str_accepts_dashes_and_case() {
        assert_eq!("UI-SPEC".parse::<ArtifactType>().unwrap(), ArtifactType::UiSpec);
        assert_eq!("prd".parse::<ArtifactType>().unwrap(), ArtifactType::Prd);
        let err = "design_doc".parse::<ArtifactType>().unwrap_err();
        assert!(err.to_string().contains("design_doc"));
    }
}
