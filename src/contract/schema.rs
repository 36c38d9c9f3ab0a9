//! Structural schemas for artifact payloads.
//!
//! Each artifact type declares the top-level fields its payload must carry and
//! the JSON kind of each. Extra fields are allowed; agents are free to add
//! detail beyond the contract.

use appforge_common::ArtifactType;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// JSON kind of a required field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Array,
    Object,
    Number,
    Bool,
}

impl FieldKind {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
            Self::Number => "number",
            Self::Bool => "bool",
        };
        f.write_str(s)
    }
}

/// Name of the JSON kind of `value`, for error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Required shape of one artifact type's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSchema {
    pub artifact_type: ArtifactType,
    pub fields: Vec<FieldSpec>,
}

impl ArtifactSchema {
    pub fn new(artifact_type: ArtifactType) -> Self {
        Self {
            artifact_type,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec { name, kind });
        self
    }

    /// Check an object payload against the schema.
    ///
    /// Returns one problem description per missing or mistyped field; an
    /// empty vector means the payload conforms. Non-object payloads are the
    /// caller's concern.
    pub fn problems(&self, data: &Value) -> Vec<String> {
        let Some(object) = data.as_object() else {
            return Vec::new();
        };

        self.fields
            .iter()
            .filter_map(|spec| match object.get(spec.name) {
                None | Some(Value::Null) => Some(format!("missing field '{}'", spec.name)),
                Some(value) if !spec.kind.matches(value) => Some(format!(
                    "field '{}' must be {}, got {}",
                    spec.name,
                    spec.kind,
                    json_kind(value)
                )),
                Some(_) => None,
            })
            .collect()
    }
}

/// The schema table for every artifact type.
pub fn builtin_schemas() -> Vec<ArtifactSchema> {
    use FieldKind::*;

    vec![
        ArtifactSchema::new(ArtifactType::Prd)
            .field("title", String)
            .field("summary", String)
            .field("features", Array),
        ArtifactSchema::new(ArtifactType::Architecture)
            .field("stack", Object)
            .field("components", Array),
        ArtifactSchema::new(ArtifactType::ApiContract).field("endpoints", Array),
        ArtifactSchema::new(ArtifactType::UiSpec).field("screens", Array),
        ArtifactSchema::new(ArtifactType::BackendSpec)
            .field("models", Array)
            .field("services", Array),
        ArtifactSchema::new(ArtifactType::MobileSpec)
            .field("platforms", Array)
            .field("screens", Array),
        ArtifactSchema::new(ArtifactType::SecurityReport).field("findings", Array),
        ArtifactSchema::new(ArtifactType::TestPlan).field("cases", Array),
        ArtifactSchema::new(ArtifactType::VerificationResult)
            .field("status", String)
            .field("checks", Array),
        ArtifactSchema::new(ArtifactType::RunManifest)
            .field("run_id", String)
            .field("status", String)
            .field("artifacts", Array),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_artifact_type_has_a_schema() {
        let schemas = builtin_schemas();
        for t in ArtifactType::ALL {
            assert!(
                schemas.iter().any(|s| s.artifact_type == t),
                "no schema for {}",
                t
            );
        }
    }

    #[test]
    fn test_conforming_payload_has_no_problems() {
        let schema = ArtifactSchema::new(ArtifactType::Prd)
            .field("title", FieldKind::String)
            .field("features", FieldKind::Array);
        let data = json!({"title": "Todo", "features": [], "extra": 1});
        assert!(schema.problems(&data).is_empty());
    }

    #[test]
    fn test_missing_and_mistyped_fields_are_reported() {
        let schema = ArtifactSchema::new(ArtifactType::BackendSpec)
            .field("models", FieldKind::Array)
            .field("services", FieldKind::Array);
        let data = json!({"models": {"user": {}}, "services": null});
        let problems = schema.problems(&data);
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0], "field 'models' must be array, got object");
        assert_eq!(problems[1], "missing field 'services'");
    }

    #[test]
    fn test_json_kind_names() {
        assert_eq!(json_kind(&json!(null)), "null");
        assert_eq!(json_kind(&json!([1])), "array");
        assert_eq!(json_kind(&json!("s")), "string");
    }
}
