//! End-to-end pipeline tests: client → server → fake provider.
//!
//! The fake provider speaks the OpenAI-compatible chat-completions API: a
//! plain JSON answer for single-shot requests and SSE frames for
//! `stream: true`.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};

use autoreport::client::AnalysisClient;
use autoreport::config::{Config, Credentials};
use autoreport::error::AnalysisError;
use autoreport::models::{ExtractionContext, ProjectAnalysis, ReportSettings};
use autoreport::server::{self, AppState};
use autoreport::stream::DeltaReceiver;

const TREE: &str = "Total Extracted Files (excluding node_modules/git): ~4\n\n- shop/\n  - src/\n";

/// Model whose event stream the fake provider rejects with HTTP 500.
const FAILING_MODEL: &str = "openai/gpt-4o-mini";
/// Single-shot model the fake provider answers only after [`STALL`].
const SLOW_DIRECT_MODEL: &str = "gemini-2.5-pro";
/// Event-stream model that sends one frame, then stalls for [`STALL`].
const STALLING_STREAM_MODEL: &str = "anthropic/claude-3.5-sonnet";
const STALL: Duration = Duration::from_secs(4);

const ANALYSIS_REPLY: &str = "Here is the analysis:\n```json\n{\n  \"projectName\": \"shop\",\n  \"projectType\": \"Backend API\",\n  \"architecture\": \"Monolithic MVC\",\n  \"technologies\": [\"Node.js\", \"Express\"],\n  \"database\": null,\n  \"modules\": \"Catalog\",\n  \"fileTreeSummary\": \"made up by the model\",\n  \"architectureDiagram\": \"graph TD\\n A-->B\"\n}\n```";

async fn fake_chat(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !auth.starts_with("Bearer test-") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "bad key"}})),
        )
            .into_response();
    }

    let model = body["model"].as_str().unwrap_or("");
    if model == FAILING_MODEL {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "upstream exploded"}})),
        )
            .into_response();
    }

    if model == SLOW_DIRECT_MODEL {
        tokio::time::sleep(STALL).await;
        return Json(json!({"choices": [{"message": {"content": "late report"}}]}))
            .into_response();
    }

    if model == STALLING_STREAM_MODEL {
        let first = format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"content": "first"}}]})
        );
        let late = async {
            tokio::time::sleep(STALL).await;
            Ok(format!(
                "data: {}\n\n",
                json!({"choices": [{"delta": {"content": "late"}}]})
            ))
        };
        let frames = stream::once(async move { Ok::<_, std::convert::Infallible>(first) })
            .chain(stream::once(late));
        return (
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from_stream(frames),
        )
            .into_response();
    }

    if body["stream"] == true {
        let mut frames: String = ["Hel", "lo"]
            .iter()
            .map(|t| format!("data: {}\n\n", json!({"choices": [{"delta": {"content": t}}]})))
            .collect();
        frames.push_str(": keep-alive\n\ndata: [DONE]\n\n");
        return ([(header::CONTENT_TYPE, "text/event-stream")], frames).into_response();
    }

    let first = body["messages"][0]["content"].as_str().unwrap_or("");
    let content = if first.contains("software systems architect") {
        ANALYSIS_REPLY
    } else {
        "Gemini report body"
    };
    Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]}))
        .into_response()
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start a fake provider and an AutoReport server wired to it.
async fn start(credentials: Credentials) -> SocketAddr {
    start_with_timeout(credentials, Config::default().server.report_timeout_secs).await
}

async fn start_with_timeout(credentials: Credentials, report_timeout_secs: u64) -> SocketAddr {
    let provider = spawn(Router::new().route("/chat/completions", post(fake_chat))).await;

    let mut config = Config::default();
    config.server.report_timeout_secs = report_timeout_secs;
    config.providers.gemini.base_url = format!("http://{}", provider);
    config.providers.openrouter.base_url = format!("http://{}/", provider);

    let state = AppState::new(config, &credentials).unwrap();
    spawn(server::router(state)).await
}

fn all_keys() -> Credentials {
    Credentials {
        gemini: Some("test-gemini".to_string()),
        openrouter: Some("test-openrouter".to_string()),
    }
}

fn context() -> ExtractionContext {
    ExtractionContext {
        project_name: "shop".to_string(),
        file_tree_summary: TREE.to_string(),
        manifest_text: r#"{"name":"shop"}"#.to_string(),
        readme_text: "# Shop".to_string(),
        source_snippets: "\n\n--- FILE: shop/src/app.js ---\nconst app = express();".to_string(),
        snippet_count: 1,
        model_id: "gemini-2.5-flash".to_string(),
    }
}

async fn collect(mut rx: DeltaReceiver) -> String {
    let mut out = String::new();
    while let Some(delta) = rx.recv().await {
        out.push_str(&delta);
    }
    out
}

fn sample_analysis() -> ProjectAnalysis {
    ProjectAnalysis {
        project_name: "shop".to_string(),
        architecture: "Monolithic MVC".to_string(),
        file_tree_summary: TREE.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_analysis_round_trip_keeps_file_tree() {
    let addr = start(all_keys()).await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    let analysis = client.request_analysis(&context()).await.unwrap();
    assert_eq!(analysis.project_type, "Backend API");
    assert_eq!(analysis.architecture, "Monolithic MVC");
    assert_eq!(analysis.technologies, vec!["Node.js", "Express"]);
    assert_eq!(analysis.modules, vec!["Catalog"]);
    assert_eq!(analysis.database, None);
    assert_eq!(analysis.file_tree_summary, TREE);
}

#[tokio::test]
async fn test_analysis_without_credential_is_503() {
    let addr = start(Credentials::default()).await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    match client.request_analysis(&context()).await {
        Err(AnalysisError::Status { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "Gemini API key is not configured");
        }
        other => panic!("expected a 503 status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_analyze_rejects_malformed_body() {
    let addr = start(all_keys()).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{}/analyze", addr))
        .json(&json!({"unexpected": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_report_single_shot_is_one_delta() {
    let addr = start(all_keys()).await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    let rx = client
        .generate_report(
            &sample_analysis(),
            Some("gemini-2.5-flash"),
            &ReportSettings::default(),
        )
        .await
        .unwrap();
    assert_eq!(collect(rx).await, "Gemini report body");
}

#[tokio::test]
async fn test_report_event_stream_concatenates_deltas() {
    let addr = start(all_keys()).await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    let rx = client
        .generate_report(
            &sample_analysis(),
            Some("openai/gpt-4o"),
            &ReportSettings::default(),
        )
        .await
        .unwrap();
    let text = collect(rx).await;
    assert_eq!(text, "Hello");
    assert!(!text.contains("stream error"));
}

#[tokio::test]
async fn test_report_upstream_failure_is_in_band() {
    let addr = start(all_keys()).await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    let rx = client
        .generate_report(&sample_analysis(), Some(FAILING_MODEL), &ReportSettings::default())
        .await
        .unwrap();
    assert_eq!(
        collect(rx).await,
        "\n\nstream error: HTTP 500: upstream exploded"
    );
}

#[tokio::test]
async fn test_report_missing_gateway_credential_is_in_band() {
    let addr = start(Credentials {
        gemini: Some("test-gemini".to_string()),
        openrouter: None,
    })
    .await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    let rx = client
        .generate_report(
            &sample_analysis(),
            Some("anthropic/claude-3.5-haiku"),
            &ReportSettings::default(),
        )
        .await
        .unwrap();
    assert_eq!(
        collect(rx).await,
        "\n\nstream error: OpenRouter API key is not configured"
    );
}

#[tokio::test]
async fn test_report_missing_direct_credential_fails_before_output() {
    let addr = start(Credentials {
        gemini: None,
        openrouter: Some("test-openrouter".to_string()),
    })
    .await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    let err = client
        .generate_report(&sample_analysis(), None, &ReportSettings::default())
        .await
        .unwrap_err();
    match err {
        AnalysisError::Status { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "Gemini API key is not configured");
        }
        other => panic!("expected a 503 status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_models_and_health() {
    let addr = start(all_keys()).await;
    let http = reqwest::Client::new();

    let models: Value = http
        .get(format!("http://{}/models", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["defaultModelId"], "gemini-2.5-flash");
    assert_eq!(models["models"].as_array().unwrap().len(), 9);
    assert_eq!(models["models"][2]["provider"], "openrouter");

    let health: Value = http
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn test_analysis_non_json_success_body_is_shape_error() {
    let server = spawn(Router::new().route(
        "/analyze",
        post(|| async { "<html>maintenance</html>" }),
    ))
    .await;
    let client = AnalysisClient::new(&format!("http://{}", server)).unwrap();

    match client.request_analysis(&context()).await {
        Err(AnalysisError::Shape(message)) => {
            assert!(message.contains("non-JSON response"));
            assert!(message.contains("<html>maintenance</html>"));
        }
        other => panic!("expected a shape error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_report_deadline_bounds_single_shot_call() {
    let addr = start_with_timeout(all_keys(), 1).await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    let started = Instant::now();
    let err = client
        .generate_report(
            &sample_analysis(),
            Some(SLOW_DIRECT_MODEL),
            &ReportSettings::default(),
        )
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(3));
    match err {
        AnalysisError::Status { status, message } => {
            assert_eq!(status, 504);
            assert!(message.contains("timed out"));
        }
        other => panic!("expected a 504 status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_report_deadline_truncates_event_stream() {
    let addr = start_with_timeout(all_keys(), 1).await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    let started = Instant::now();
    let rx = client
        .generate_report(
            &sample_analysis(),
            Some(STALLING_STREAM_MODEL),
            &ReportSettings::default(),
        )
        .await
        .unwrap();
    let text = collect(rx).await;
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(text, "first");
}
