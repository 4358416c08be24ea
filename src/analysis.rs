//! Server half of `POST /analyze`.
//!
//! Builds the architect prompt from an [`AnalysisRequest`], makes one
//! single-shot model call, and recovers a [`ProjectAnalysis`] from whatever
//! text comes back.
//!
//! The model is told to answer with bare JSON but does not always comply, so
//! [`parse_analysis_output`] tries two candidates in order:
//!
//! 1. the substring from the first `{` to the last `}` (drops chatter and
//!    markdown fences around the object);
//! 2. the whole trimmed text.
//!
//! Whatever the model says about the file tree is discarded in favour of the
//! summary the caller extracted.

use serde_json::Value;

use crate::config::ModelsConfig;
use crate::error::AnalysisError;
use crate::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::models::{AnalysisRequest, ProjectAnalysis};
use crate::providers;

/// Characters of the manifest included in the prompt.
const MANIFEST_PROMPT_CHARS: usize = 5_000;
/// Characters of the README included in the prompt.
const README_PROMPT_CHARS: usize = 8_000;
/// Characters of raw model output quoted in a parse error.
const ERROR_EXCERPT_CHARS: usize = 150;

const SYSTEM_PROMPT: &str = r#"You are a senior software systems architect. Study the supplied codebase signals and infer its architecture.
Respond with a single JSON object and nothing else: no greeting, no explanation, no markdown fences. The first character of your answer must be '{' and the last must be '}'.

The object must have exactly these fields:

{
  "projectName": string,
  "projectType": string,              // e.g. "Full-Stack Web App", "Backend API", "CLI Tool"
  "architecture": string,             // e.g. "Monolithic MVC", "Microservices", "Client-Server SPA"
  "technologies": string[],           // core languages, frameworks, libraries
  "database": string | null,          // e.g. "PostgreSQL"; null when none is evident
  "modules": string[],                // major functional modules, e.g. ["Authentication", "Billing"]
  "keyFeatures": string[],            // high-level features
  "probableDomain": string,           // e.g. "E-Commerce", "EdTech"
  "fileTreeSummary": string,          // copy the FILE TREE input unchanged
  "architectureDiagram": string,      // valid Mermaid source such as "graph TD\n A-->B", without fences
  "databaseSchema": string[],         // inferred tables, e.g. "Users(id, email)"; empty when not applicable
  "deploymentRecommendations": [      // one or two hosting proposals
    { "platform": string, "costEstimate": string, "reasoning": string }
  ]
}

Ground every deduction in the README, the dependency manifest, the folder layout and the code snippets."#;

/// Build the system and user messages for an analysis request.
pub fn build_messages(request: &AnalysisRequest) -> Vec<ChatMessage> {
    let readme = if request.readme.trim().is_empty() {
        "No README".to_string()
    } else {
        truncate_chars(&request.readme, README_PROMPT_CHARS)
    };
    let snippets = if request.core_snippets.trim().is_empty() {
        "No architectural snippets found"
    } else {
        request.core_snippets.as_str()
    };

    let user = format!(
        "Analyze the following project data and return the JSON.\n\n\
         PROJECT NAME:\n{}\n\n\
         PACKAGE MANIFEST:\n{}\n\n\
         FILE TREE:\n{}\n\n\
         README:\n{}\n\n\
         CORE CODE SNIPPETS:\n{}\n",
        request.project_name,
        truncate_chars(&request.package_json, MANIFEST_PROMPT_CHARS),
        request.file_tree_summary,
        readme,
        snippets,
    );

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// Run the analysis phase for one request.
///
/// # Errors
///
/// [`AnalysisError::Config`] when the routed provider has no credential (no
/// request is made), [`AnalysisError::Provider`] for upstream failures, and
/// the parse errors of [`parse_analysis_output`].
pub async fn analyze(
    llm: &LlmClient,
    models: &ModelsConfig,
    request: &AnalysisRequest,
) -> Result<ProjectAnalysis, AnalysisError> {
    let route = providers::route(request.model_id.as_deref(), &models.default_model_id);
    tracing::info!(
        project = %request.project_name,
        provider = %route.provider,
        model = %route.model,
        "analysis requested"
    );

    let chat = ChatRequest {
        model: route.model.clone(),
        messages: build_messages(request),
        temperature: models.analysis_temperature,
    };
    let raw = llm.single_shot(route.provider).complete(&chat).await?;
    tracing::debug!(chars = raw.len(), "analysis output received");

    parse_analysis_output(&raw, &request.file_tree_summary)
}

/// Recover a [`ProjectAnalysis`] from raw model text.
///
/// `file_tree_summary` always replaces the model's value.
pub fn parse_analysis_output(
    raw: &str,
    file_tree_summary: &str,
) -> Result<ProjectAnalysis, AnalysisError> {
    let value = recover_json(raw).ok_or_else(|| {
        tracing::warn!("model output is not valid JSON");
        AnalysisError::InvalidJson {
            excerpt: truncate_chars(raw, ERROR_EXCERPT_CHARS),
        }
    })?;

    let mut analysis = ProjectAnalysis::from_value(&value)?;
    analysis.file_tree_summary = file_tree_summary.to_string();
    Ok(analysis)
}

fn recover_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            if let Ok(v) = serde_json::from_str(&trimmed[start..=end]) {
                return Some(v);
            }
        }
    }
    serde_json::from_str(trimmed).ok()
}

/// First `max` characters of `s`.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
