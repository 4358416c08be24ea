//! Report phase: settings + analysis → long-form prompt → delta stream.
//!
//! The prompt fixes the heading layout for the chosen format, the length and
//! tone, and embeds the analysis JSON plus its Mermaid diagram. Generation
//! itself is delegated to the transport the router picks for
//! [`Phase::Report`].

use crate::config::ModelsConfig;
use crate::error::ProviderError;
use crate::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::models::{ProjectAnalysis, ReportSettings, Tone, UniversityFormat, Verbosity};
use crate::providers::{self, Phase};
use crate::stream::DeltaReceiver;

/// Diagram used when the analysis has none.
const PLACEHOLDER_DIAGRAM: &str = "graph TD\n A[Entity] --> B[System]";

fn length_instruction(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Short => {
            "CRITICAL LENGTH: Write exactly 1 paragraph per section. Be concise and straight to the point."
        }
        Verbosity::Medium => "Write a detailed response of about 3 to 4 paragraphs per section.",
        Verbosity::Long => {
            "CRITICAL LENGTH: Write a highly extensive, comprehensive analysis. Each section MUST be 6 to 8 paragraphs. Examine every code element in depth and expand fully instead of summarizing."
        }
        Verbosity::Exhaustive => {
            "CRITICAL LENGTH: Provide a thesis-level exhaustive analysis. Each section MUST be at least 1500 words. Explain everything in meticulous detail and break the JSON down completely."
        }
    }
}

fn tone_instruction(tone: Tone) -> &'static str {
    match tone {
        Tone::Formal => "Formal academic tone, professional, objective.",
        Tone::Conversational => {
            "Use a conversational, slightly casual, and highly accessible tone."
        }
    }
}

fn format_instruction(format: UniversityFormat) -> &'static str {
    match format {
        UniversityFormat::Vtu => {
            "Generate a Visvesvaraya Technological University (VTU) project report strictly following these exact Markdown headings:
## INTRODUCTION
## PROBLEM STATEMENT
## LITERATURE SURVEY
## SYSTEM DESIGN
## METHODOLOGY
## IMPLEMENTATION DETAILS
## ADVANTAGES AND DISADVANTAGES
## CONCLUSION"
        }
        UniversityFormat::Generic => {
            "Generate a standard software project architecture report strictly following these exact Markdown headings:
## Executive Summary
## Architecture Overview
## Core Modules
## Technical Stack
## Implementation Highlights
## Security & Deployment"
        }
        UniversityFormat::BangaloreBca => {
            "Generate a Bangalore University BCA project report strictly following these exact Markdown headings:
## ABOUT
## EXISTING SYSTEM
### Brief explanation of Existing System
### Disadvantages of Existing System
## PROPOSED SYSTEM
### Objective Of The Proposed System
### Brief explanation of Proposed System
### Advantages of Proposed System
## SYSTEM REQUIREMENTS
### Requirement Analysis
### Hardware Requirements
### Software Requirements"
        }
    }
}

/// Assemble the report prompt.
pub fn build_prompt(analysis: &ProjectAnalysis, settings: &ReportSettings) -> String {
    let diagram = if analysis.architecture_diagram.trim().is_empty() {
        PLACEHOLDER_DIAGRAM
    } else {
        analysis.architecture_diagram.as_str()
    };

    let refinement = match settings.custom_prompt.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => format!(
            "\n--- USER REFINEMENT PROMPT ---\n{}\n------------------------------\n",
            p
        ),
        _ => String::new(),
    };

    let analysis_json =
        serde_json::to_string_pretty(analysis).unwrap_or_else(|_| "{}".to_string());

    format!(
        "{format}\n\n\
         Constraints:\n\
         - {tone}\n\
         - {length}\n\
         - Write in paragraphs; avoid overusing bullet points.\n\
         - Avoid excessive technical jargon.\n\
         - Do not mention AI or that this report was generated automatically.\n\
         - Embed the exact Mermaid diagram below in the Architecture / Proposed System section, as a standard fenced code block (no HTML):\n\
         ```mermaid\n{diagram}\n```\n\
         - Include a \"Deployment & Hosting\" subsection describing the deployment recommendations.\n\
         - Base the writing strictly on the project analysis JSON below.\n\
         {refinement}\n\
         Project Analysis JSON:\n{analysis_json}\n",
        format = format_instruction(settings.university_format),
        tone = tone_instruction(settings.tone),
        length = length_instruction(settings.verbosity),
        diagram = diagram,
        refinement = refinement,
        analysis_json = analysis_json,
    )
}

/// Start generating a report.
///
/// Single-shot routes fail here, before any output, on credential or
/// upstream errors. Event-stream routes always return a receiver and report
/// failures in-band.
pub async fn generate(
    llm: &LlmClient,
    models: &ModelsConfig,
    analysis: &ProjectAnalysis,
    target_model_id: Option<&str>,
    settings: &ReportSettings,
) -> Result<DeltaReceiver, ProviderError> {
    let route = providers::route(target_model_id, &models.default_model_id);
    let source = llm.source(&route, Phase::Report);
    tracing::info!(
        provider = %route.provider,
        model = %route.model,
        protocol = ?source.protocol(),
        format = %String::from(settings.university_format),
        "report requested"
    );

    let request = ChatRequest {
        model: route.model,
        messages: vec![ChatMessage::user(build_prompt(analysis, settings))],
        temperature: models.report_temperature,
    };
    source.open(request).await
}
