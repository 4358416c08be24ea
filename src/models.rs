//! Core data types that flow through the pipeline.
//!
//! [`ExtractionContext`] is produced locally from a zip upload,
//! [`AnalysisRequest`] is its wire form, and [`ProjectAnalysis`] is what the
//! model sends back. The analysis is untrusted: it is only ever built through
//! [`ProjectAnalysis::from_value`], which tolerates missing, extra, and
//! mistyped fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AnalysisError;

/// Bounded textual context extracted from one archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionContext {
    pub project_name: String,
    pub file_tree_summary: String,
    pub manifest_text: String,
    pub readme_text: String,
    pub source_snippets: String,
    pub snippet_count: usize,
    pub model_id: String,
}

/// Body of `POST /analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub project_name: String,
    pub file_tree_summary: String,
    #[serde(default)]
    pub package_json: String,
    #[serde(default)]
    pub readme: String,
    #[serde(default)]
    pub core_snippets: String,
    #[serde(default)]
    pub model_id: Option<String>,
}

impl AnalysisRequest {
    pub fn from_context(ctx: &ExtractionContext) -> Self {
        Self {
            project_name: ctx.project_name.clone(),
            file_tree_summary: ctx.file_tree_summary.clone(),
            package_json: ctx.manifest_text.clone(),
            readme: ctx.readme_text.clone(),
            core_snippets: ctx.source_snippets.clone(),
            model_id: Some(ctx.model_id.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecommendation {
    pub platform: String,
    pub cost_estimate: String,
    pub reasoning: String,
}

/// Structured description of a codebase, as inferred by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAnalysis {
    pub project_name: String,
    pub project_type: String,
    pub architecture: String,
    pub technologies: Vec<String>,
    pub database: Option<String>,
    pub modules: Vec<String>,
    pub key_features: Vec<String>,
    pub probable_domain: String,
    pub file_tree_summary: String,
    /// Mermaid source, without fences.
    pub architecture_diagram: String,
    pub database_schema: Vec<String>,
    pub deployment_recommendations: Vec<DeploymentRecommendation>,
}

impl ProjectAnalysis {
    /// Build an analysis from arbitrary JSON.
    ///
    /// Only a non-object top level is rejected. Everything else degrades:
    /// missing fields become empty, numbers and booleans become text, and
    /// non-string array members are dropped.
    pub fn from_value(value: &Value) -> Result<Self, AnalysisError> {
        let obj = value.as_object().ok_or_else(|| {
            AnalysisError::Shape(format!("expected a JSON object, got {}", kind_of(value)))
        })?;

        Ok(Self {
            project_name: text_field(obj, "projectName"),
            project_type: text_field(obj, "projectType"),
            architecture: text_field(obj, "architecture"),
            technologies: list_field(obj, "technologies"),
            database: obj
                .get("database")
                .and_then(lenient_text)
                .filter(|s| !s.trim().is_empty()),
            modules: list_field(obj, "modules"),
            key_features: list_field(obj, "keyFeatures"),
            probable_domain: text_field(obj, "probableDomain"),
            file_tree_summary: text_field(obj, "fileTreeSummary"),
            architecture_diagram: text_field(obj, "architectureDiagram"),
            database_schema: list_field(obj, "databaseSchema"),
            deployment_recommendations: obj
                .get("deploymentRecommendations")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_object)
                        .map(|rec| DeploymentRecommendation {
                            platform: text_field(rec, "platform"),
                            cost_estimate: text_field(rec, "costEstimate"),
                            reasoning: text_field(rec, "reasoning"),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn lenient_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).and_then(lenient_text).unwrap_or_default()
}

fn list_field(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        // A lone string where a list was expected.
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

// ============ Report settings ============

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Verbosity {
    Short,
    #[default]
    Medium,
    Long,
    Exhaustive,
}

impl From<String> for Verbosity {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Verbosity::Short,
            "long" => Verbosity::Long,
            "exhaustive" => Verbosity::Exhaustive,
            _ => Verbosity::Medium,
        }
    }
}

impl From<Verbosity> for String {
    fn from(v: Verbosity) -> Self {
        match v {
            Verbosity::Short => "short",
            Verbosity::Medium => "medium",
            Verbosity::Long => "long",
            Verbosity::Exhaustive => "exhaustive",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tone {
    #[default]
    Formal,
    Conversational,
}

impl From<String> for Tone {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "conversational" => Tone::Conversational,
            _ => Tone::Formal,
        }
    }
}

impl From<Tone> for String {
    fn from(t: Tone) -> Self {
        match t {
            Tone::Formal => "formal",
            Tone::Conversational => "conversational",
        }
        .to_string()
    }
}

/// Heading layout the report follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UniversityFormat {
    #[default]
    BangaloreBca,
    Vtu,
    Generic,
}

impl From<String> for UniversityFormat {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "vtu" => UniversityFormat::Vtu,
            "generic" => UniversityFormat::Generic,
            _ => UniversityFormat::BangaloreBca,
        }
    }
}

impl From<UniversityFormat> for String {
    fn from(f: UniversityFormat) -> Self {
        match f {
            UniversityFormat::BangaloreBca => "Bangalore University BCA",
            UniversityFormat::Vtu => "VTU",
            UniversityFormat::Generic => "Generic",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportSettings {
    pub verbosity: Verbosity,
    pub tone: Tone,
    pub university_format: UniversityFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}
