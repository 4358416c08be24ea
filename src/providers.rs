//! Static model table and provider routing.
//!
//! Every selectable model belongs to exactly one [`Provider`]. Routing is a
//! pure lookup: unknown identifiers resolve to the configured default model
//! instead of failing, so a stale model id from an old client still gets a
//! report.
//!
//! | Provider | Analysis phase | Report phase |
//! |----------|----------------|--------------|
//! | `gemini` | single-shot | single-shot |
//! | `openrouter` | single-shot | event stream (SSE) |

use serde::Serialize;
use std::fmt;

/// Model used when neither the caller nor the configuration names one.
pub const DEFAULT_MODEL_ID: &str = "gemini-2.5-flash";

/// Upstream chat-completion vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini, called directly.
    Gemini,
    /// OpenRouter aggregation gateway.
    OpenRouter,
}

impl Provider {
    /// Environment variable consulted when the config file has no key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gemini => write!(f, "Gemini"),
            Provider::OpenRouter => write!(f, "OpenRouter"),
        }
    }
}

/// One entry of the model table.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub provider: Provider,
}

/// All models a caller may select.
pub static MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gemini-2.5-flash",
        name: "Gemini 2.5 Flash (Direct)",
        provider: Provider::Gemini,
    },
    ModelInfo {
        id: "gemini-2.5-pro",
        name: "Gemini 2.5 Pro (Direct)",
        provider: Provider::Gemini,
    },
    ModelInfo {
        id: "google/gemini-2.5-flash",
        name: "Gemini 2.5 Flash (OpenRouter)",
        provider: Provider::OpenRouter,
    },
    ModelInfo {
        id: "anthropic/claude-3.5-sonnet",
        name: "Claude 3.5 Sonnet",
        provider: Provider::OpenRouter,
    },
    ModelInfo {
        id: "anthropic/claude-3.5-haiku",
        name: "Claude 3.5 Haiku",
        provider: Provider::OpenRouter,
    },
    ModelInfo {
        id: "meta-llama/llama-3.3-70b-instruct",
        name: "Llama 3.3 70B",
        provider: Provider::OpenRouter,
    },
    ModelInfo {
        id: "openai/gpt-4o",
        name: "GPT-4o",
        provider: Provider::OpenRouter,
    },
    ModelInfo {
        id: "openai/gpt-4o-mini",
        name: "GPT-4o Mini",
        provider: Provider::OpenRouter,
    },
    ModelInfo {
        id: "openai/gpt-oss-120b:free",
        name: "GPT-OSS-120B (Free)",
        provider: Provider::OpenRouter,
    },
];

/// Look up a model by exact id.
pub fn find_model(model_id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == model_id)
}

/// Which half of the pipeline a call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Analysis,
    Report,
}

/// Wire protocol used to talk to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// One request, one complete JSON response.
    SingleShot,
    /// `stream: true` request answered with SSE `data:` frames.
    EventStream,
}

/// Resolved destination for a model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub provider: Provider,
    pub model: String,
}

impl Route {
    pub fn protocol(&self, phase: Phase) -> Protocol {
        match (self.provider, phase) {
            (Provider::OpenRouter, Phase::Report) => Protocol::EventStream,
            _ => Protocol::SingleShot,
        }
    }
}

/// Resolve `model_id` to a provider and model.
///
/// Missing or unknown ids fall back to `default_model_id`; if that is not in
/// the table either, the call goes to Gemini with the default id as-is.
pub fn route(model_id: Option<&str>, default_model_id: &str) -> Route {
    let requested = model_id.map(str::trim).filter(|id| !id.is_empty());
    if let Some(info) = requested.and_then(find_model) {
        return Route {
            provider: info.provider,
            model: info.id.to_string(),
        };
    }

    if let Some(id) = requested {
        tracing::warn!(model = id, fallback = default_model_id, "unknown model id");
    }

    let provider = find_model(default_model_id)
        .map(|m| m.provider)
        .unwrap_or(Provider::Gemini);
    Route {
        provider,
        model: default_model_id.to_string(),
    }
}
