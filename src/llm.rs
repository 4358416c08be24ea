//! Chat-completion transports.
//!
//! Both providers expose an OpenAI-compatible `POST /chat/completions`; they
//! differ in how the answer comes back. [`DeltaSource`] hides that:
//!
//! - **[`SingleShot`]**: one JSON response, surfaced as one delta. Every
//!   failure happens before the receiver is returned.
//! - **[`EventStream`]**: `stream: true`, SSE frames decoded by
//!   [`crate::stream`]. Once the receiver is returned, failures arrive
//!   in-band as a `stream error:` delta.
//!
//! [`LlmClient`] owns the HTTP client, the endpoints, and the injected
//! credentials, and picks the transport for a [`Route`] and [`Phase`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::{Credentials, ProviderEndpointConfig, ProvidersConfig};
use crate::error::{ConfigError, ProviderError, StreamError};
use crate::providers::{Phase, Protocol, Provider, Route};
use crate::stream::{self, DeltaReceiver};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Provider-independent chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

impl ChatRequest {
    fn body(&self, stream: bool) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": self.messages,
            "temperature": self.temperature,
        });
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }
}

/// Anything that turns a chat request into a sequence of text deltas.
#[async_trait]
pub trait DeltaSource: Send + Sync {
    fn provider(&self) -> Provider;

    fn protocol(&self) -> Protocol;

    /// Start generation. The receiver closes when generation is over.
    async fn open(&self, request: ChatRequest) -> Result<DeltaReceiver, ProviderError>;
}

/// One resolved upstream endpoint.
#[derive(Debug, Clone)]
struct Endpoint {
    provider: Provider,
    url: String,
    api_key: Option<String>,
    referer: Option<String>,
    title: Option<String>,
}

impl Endpoint {
    fn new(
        provider: Provider,
        config: &ProviderEndpointConfig,
        credentials: &Credentials,
    ) -> Self {
        Self {
            provider,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: credentials.get(provider).map(str::to_string),
            referer: config.referer.clone(),
            title: config.title.clone(),
        }
    }

    fn api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential(self.provider))
    }

    fn post(
        &self,
        http: &reqwest::Client,
        api_key: &str,
        body: &Value,
    ) -> reqwest::RequestBuilder {
        let mut req = http
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json");
        if let Some(referer) = &self.referer {
            req = req.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            req = req.header("X-Title", title);
        }
        req.json(body)
    }
}

/// Message for a non-success upstream body: `error.message`, else the raw text.
fn upstream_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(stream::error_message))
        .unwrap_or_else(|| body.trim().to_string())
}

// ============ Protocol A: single-shot ============

pub struct SingleShot {
    http: reqwest::Client,
    endpoint: Endpoint,
}

impl SingleShot {
    /// Run the request to completion and return the full text.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let provider = self.endpoint.provider;
        let api_key = self.endpoint.api_key()?;

        tracing::info!(%provider, model = %request.model, "single-shot request");
        let response = self
            .endpoint
            .post(&self.http, api_key, &request.body(false))
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                provider,
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport {
                provider,
                message: e.to_string(),
            })?;

        if !status.is_success() {
            tracing::error!(%provider, status = status.as_u16(), "provider request failed");
            return Err(ProviderError::Status {
                provider,
                status: status.as_u16(),
                message: upstream_error_message(&body),
            });
        }

        stream::parse_single_shot(provider, &body)
    }
}

#[async_trait]
impl DeltaSource for SingleShot {
    fn provider(&self) -> Provider {
        self.endpoint.provider
    }

    fn protocol(&self) -> Protocol {
        Protocol::SingleShot
    }

    async fn open(&self, request: ChatRequest) -> Result<DeltaReceiver, ProviderError> {
        let text = self.complete(&request).await?;
        let deltas = if text.is_empty() { Vec::new() } else { vec![text] };
        Ok(stream::ready_deltas(deltas))
    }
}

// ============ Protocol B: event stream ============

pub struct EventStream {
    http: reqwest::Client,
    endpoint: Endpoint,
}

#[async_trait]
impl DeltaSource for EventStream {
    fn provider(&self) -> Provider {
        self.endpoint.provider
    }

    fn protocol(&self) -> Protocol {
        Protocol::EventStream
    }

    /// Never fails: every problem, including a missing credential, is
    /// reported as an in-band `stream error:` delta.
    async fn open(&self, request: ChatRequest) -> Result<DeltaReceiver, ProviderError> {
        let provider = self.endpoint.provider;
        let api_key = match self.endpoint.api_key() {
            Ok(key) => key.to_string(),
            Err(e) => {
                tracing::error!(%provider, "no credential, stream not started");
                return Ok(stream::ready_deltas(vec![
                    StreamError::new(e.to_string()).marker()
                ]));
            }
        };

        let (tx, rx) = stream::delta_channel();
        let req = self
            .endpoint
            .post(&self.http, &api_key, &request.body(true))
            .header("Accept", "text/event-stream");
        let model = request.model;

        tokio::spawn(async move {
            tracing::info!(%provider, %model, "event-stream request");
            let response = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(StreamError::new(e.to_string()).marker()).await;
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    upstream_error_message(&body)
                );
                tracing::error!(%provider, %message, "event-stream request rejected");
                let _ = tx.send(StreamError::new(message).marker()).await;
                return;
            }

            stream::forward_event_stream(response.bytes_stream(), tx).await;
            tracing::debug!(%provider, "event stream closed");
        });

        Ok(rx)
    }
}

// ============ Client ============

/// Entry point for every upstream model call.
pub struct LlmClient {
    http: reqwest::Client,
    gemini: Endpoint,
    openrouter: Endpoint,
}

impl LlmClient {
    /// Build a client. Credentials are taken as given; nothing is read from
    /// the environment here.
    pub fn new(config: &ProvidersConfig, credentials: &Credentials) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            gemini: Endpoint::new(Provider::Gemini, &config.gemini, credentials),
            openrouter: Endpoint::new(Provider::OpenRouter, &config.openrouter, credentials),
        })
    }

    fn endpoint(&self, provider: Provider) -> &Endpoint {
        match provider {
            Provider::Gemini => &self.gemini,
            Provider::OpenRouter => &self.openrouter,
        }
    }

    pub fn has_credential(&self, provider: Provider) -> bool {
        self.endpoint(provider).api_key.is_some()
    }

    pub fn single_shot(&self, provider: Provider) -> SingleShot {
        SingleShot {
            http: self.http.clone(),
            endpoint: self.endpoint(provider).clone(),
        }
    }

    /// Transport for `route` in `phase`.
    pub fn source(&self, route: &Route, phase: Phase) -> Box<dyn DeltaSource> {
        let endpoint = self.endpoint(route.provider).clone();
        match route.protocol(phase) {
            Protocol::SingleShot => Box::new(SingleShot {
                http: self.http.clone(),
                endpoint,
            }),
            Protocol::EventStream => Box::new(EventStream {
                http: self.http.clone(),
                endpoint,
            }),
        }
    }
}
