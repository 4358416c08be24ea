use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;
use crate::providers::{self, Provider};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upper bound on a streamed report; the body is cut off when it elapses.
    #[serde(default = "default_report_timeout_secs")]
    pub report_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            report_timeout_secs: default_report_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_report_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_model_id")]
    pub default_model_id: String,
    #[serde(default = "default_analysis_temperature")]
    pub analysis_temperature: f32,
    #[serde(default = "default_report_temperature")]
    pub report_temperature: f32,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_model_id: default_model_id(),
            analysis_temperature: default_analysis_temperature(),
            report_temperature: default_report_temperature(),
        }
    }
}

fn default_model_id() -> String {
    providers::DEFAULT_MODEL_ID.to_string()
}
fn default_analysis_temperature() -> f32 {
    0.1
}
fn default_report_temperature() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default = "default_gemini")]
    pub gemini: ProviderEndpointConfig,
    #[serde(default = "default_openrouter")]
    pub openrouter: ProviderEndpointConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            gemini: default_gemini(),
            openrouter: default_openrouter(),
        }
    }
}

/// Connection settings for one upstream provider.
///
/// `base_url` is the prefix of its OpenAI-compatible API; requests go to
/// `{base_url}/chat/completions`.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderEndpointConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sent as `HTTP-Referer` (OpenRouter attribution).
    #[serde(default)]
    pub referer: Option<String>,
    /// Sent as `X-Title` (OpenRouter attribution).
    #[serde(default)]
    pub title: Option<String>,
}

fn default_gemini() -> ProviderEndpointConfig {
    ProviderEndpointConfig {
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
        api_key: None,
        referer: None,
        title: None,
    }
}

fn default_openrouter() -> ProviderEndpointConfig {
    ProviderEndpointConfig {
        base_url: "https://openrouter.ai/api/v1".to_string(),
        api_key: None,
        referer: Some("http://localhost:3000".to_string()),
        title: Some("AutoReport AI".to_string()),
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Where `analyze` and `report` send their requests.
    #[serde(default = "default_server_url")]
    pub server_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
        }
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

/// Resolved provider credentials, injected into [`crate::llm::LlmClient`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub gemini: Option<String>,
    pub openrouter: Option<String>,
}

impl Credentials {
    pub fn get(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Gemini => self.gemini.as_deref(),
            Provider::OpenRouter => self.openrouter.as_deref(),
        }
    }
}

impl ProvidersConfig {
    pub fn endpoint(&self, provider: Provider) -> &ProviderEndpointConfig {
        match provider {
            Provider::Gemini => &self.gemini,
            Provider::OpenRouter => &self.openrouter,
        }
    }

    /// Resolve credentials: the config file wins, then the environment.
    /// Blank values count as absent.
    pub fn credentials(&self) -> Credentials {
        self.credentials_with(|name| std::env::var(name).ok())
    }

    pub fn credentials_with(&self, env: impl Fn(&str) -> Option<String>) -> Credentials {
        let resolve = |provider: Provider| {
            self.endpoint(provider)
                .api_key
                .clone()
                .or_else(|| env(provider.api_key_env()))
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        };
        Credentials {
            gemini: resolve(Provider::Gemini),
            openrouter: resolve(Provider::OpenRouter),
        }
    }
}

/// Load and validate a config file.
///
/// When `path` does not exist and `allow_missing` is set, built-in defaults
/// are returned instead.
pub fn load_config(path: &Path, allow_missing: bool) -> Result<Config> {
    if allow_missing && !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if providers::find_model(&config.models.default_model_id).is_none() {
        anyhow::bail!(ConfigError::Invalid(format!(
            "models.default_model_id '{}' is not a known model",
            config.models.default_model_id
        )));
    }

    for (name, t) in [
        ("models.analysis_temperature", config.models.analysis_temperature),
        ("models.report_temperature", config.models.report_temperature),
    ] {
        if !(0.0..=2.0).contains(&t) {
            anyhow::bail!(ConfigError::Invalid(format!("{} must be in [0.0, 2.0]", name)));
        }
    }

    if config.server.report_timeout_secs == 0 {
        anyhow::bail!(ConfigError::Invalid(
            "server.report_timeout_secs must be > 0".to_string()
        ));
    }

    for provider in [Provider::Gemini, Provider::OpenRouter] {
        let base = &config.providers.endpoint(provider).base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            anyhow::bail!(ConfigError::Invalid(format!(
                "{} base_url must be an http(s) URL, got '{}'",
                provider, base
            )));
        }
    }

    Ok(())
}
