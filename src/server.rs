//! AutoReport HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/analyze` | Extraction context in, `{ "analysis": … }` out |
//! | `POST` | `/generate-report` | Analysis + settings in, streamed plain-text report out |
//! | `GET`  | `/models` | Selectable models and the default model id |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! `/analyze` answers failures with `{ "error": "<message>" }`. Failures
//! before the first byte of `/generate-report` are plain text. Status codes:
//! `400` malformed body, `503` provider credential not configured, `502`
//! upstream or model-output failure, `504` report not started before
//! `server.report_timeout_secs` elapsed.
//!
//! The same deadline bounds the whole report: a streamed body is cut off
//! when it passes.
//!
//! Once a report stream has started, failures are written into the body as a
//! trailing `stream error: <message>` line and the status stays `200`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end can
//! call the API directly.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};

use crate::analysis;
use crate::config::{Config, Credentials};
use crate::error::{AnalysisError, ProviderError};
use crate::llm::LlmClient;
use crate::models::{AnalysisRequest, ProjectAnalysis, ReportSettings};
use crate::providers::{self, ModelInfo, Provider};
use crate::report;

/// Shared, read-only server state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: Arc<LlmClient>,
}

impl AppState {
    pub fn new(config: Config, credentials: &Credentials) -> anyhow::Result<Self> {
        let llm = LlmClient::new(&config.providers, credentials)?;
        Ok(Self {
            config: Arc::new(config),
            llm: Arc::new(llm),
        })
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/analyze", post(handle_analyze))
        .route("/generate-report", post(handle_generate_report))
        .route("/models", get(handle_models))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Start the server on `config.server.bind` and run until shutdown.
pub async fn run_server(config: Config, credentials: Credentials) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config, &credentials)?;
    for provider in [Provider::Gemini, Provider::OpenRouter] {
        if !state.llm.has_credential(provider) {
            tracing::warn!(
                %provider,
                env = provider.api_key_env(),
                "no API key configured; requests routed to this provider will fail"
            );
        }
    }

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "AutoReport server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Error that renders as `{ "error": message }`.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Error that renders as a plain-text body.
struct TextError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for TextError {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.message,
        )
            .into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        let status = match &err {
            AnalysisError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        tracing::error!(status = status.as_u16(), error = %err, "analysis failed");
        AppError {
            status,
            message: err.to_string(),
        }
    }
}

impl From<ProviderError> for TextError {
    fn from(err: ProviderError) -> Self {
        let status = match &err {
            ProviderError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        tracing::error!(status = status.as_u16(), error = %err, "report failed to start");
        TextError {
            status,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /models ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelsResponse {
    default_model_id: String,
    models: &'static [ModelInfo],
}

async fn handle_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        default_model_id: state.config.models.default_model_id.clone(),
        models: providers::MODELS,
    })
}

// ============ POST /analyze ============

#[derive(Serialize)]
struct AnalyzeResponse {
    analysis: ProjectAnalysis,
}

async fn handle_analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Json(request) = body.map_err(|e| bad_request(e.body_text()))?;

    let analysis = analysis::analyze(&state.llm, &state.config.models, &request).await?;
    tracing::info!(project = %request.project_name, "analysis complete");

    Ok(Json(AnalyzeResponse { analysis }))
}

// ============ POST /generate-report ============

/// Body of `POST /generate-report`: the analysis fields flattened alongside
/// `targetModelId` and `settings`. Both extras are optional and read
/// leniently.
fn parse_report_body(
    body: &[u8],
) -> Result<(ProjectAnalysis, Option<String>, ReportSettings), TextError> {
    let bad = |message: String| TextError {
        status: StatusCode::BAD_REQUEST,
        message,
    };

    let value: Value =
        serde_json::from_slice(body).map_err(|e| bad(format!("invalid JSON body: {}", e)))?;
    let analysis = ProjectAnalysis::from_value(&value).map_err(|e| bad(e.to_string()))?;

    let target_model_id = value
        .get("targetModelId")
        .and_then(Value::as_str)
        .map(str::to_string);

    let settings = match value.get("settings") {
        Some(v) if !v.is_null() => {
            serde_json::from_value::<ReportSettings>(v.clone()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "unreadable report settings, using defaults");
                ReportSettings::default()
            })
        }
        _ => ReportSettings::default(),
    };

    Ok((analysis, target_model_id, settings))
}

async fn handle_generate_report(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, TextError> {
    let timeout_secs = state.config.server.report_timeout_secs;
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    let (analysis, target_model_id, settings) = parse_report_body(&body)?;

    // Single-shot routes produce all their output inside `generate`, so the
    // deadline has to cover the call itself as well as the body.
    let started = report::generate(
        &state.llm,
        &state.config.models,
        &analysis,
        target_model_id.as_deref(),
        &settings,
    );
    let rx = match tokio::time::timeout_at(deadline, started).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::warn!(timeout_secs, "report not started before deadline");
            return Err(TextError {
                status: StatusCode::GATEWAY_TIMEOUT,
                message: format!("report generation timed out after {}s", timeout_secs),
            });
        }
    };

    let body = ReceiverStream::new(rx)
        .take_until(Box::pin(tokio::time::sleep_until(deadline)))
        .map(Ok::<_, Infallible>);

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}
