//! HTTP client for the AutoReport server.
//!
//! Used by the `analyze` and `report` commands: turns an
//! [`ExtractionContext`] into a [`ProjectAnalysis`] via `POST /analyze`, and
//! a [`ProjectAnalysis`] into a streamed report via `POST /generate-report`.

use serde_json::Value;

use crate::analysis::truncate_chars;
use crate::error::AnalysisError;
use crate::models::{AnalysisRequest, ExtractionContext, ProjectAnalysis, ReportSettings};
use crate::stream::{self, DeltaReceiver};

/// Characters of a non-JSON error body quoted back to the caller.
const RAW_BODY_EXCERPT_CHARS: usize = 100;

pub struct AnalysisClient {
    http: reqwest::Client,
    base_url: String,
}

impl AnalysisClient {
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    /// Request an architecture analysis for an extracted archive.
    ///
    /// The returned `file_tree_summary` is always the one from `ctx`, whatever
    /// the server sent back.
    pub async fn request_analysis(
        &self,
        ctx: &ExtractionContext,
    ) -> Result<ProjectAnalysis, AnalysisError> {
        let body = AnalysisRequest::from_context(ctx);
        let url = format!("{}/analyze", self.base_url);
        tracing::debug!(%url, project = %ctx.project_name, "posting analysis request");

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                message: server_error_message(&text),
            });
        }

        let json: Value = serde_json::from_str(&text).map_err(|_| {
            AnalysisError::Shape(format!(
                "analysis service returned a non-JSON response: {}",
                truncate_chars(text.trim(), RAW_BODY_EXCERPT_CHARS)
            ))
        })?;
        let raw = json.get("analysis").ok_or_else(|| {
            AnalysisError::Shape("response has no `analysis` field".to_string())
        })?;

        let mut analysis = ProjectAnalysis::from_value(raw)?;
        analysis.file_tree_summary = ctx.file_tree_summary.clone();
        Ok(analysis)
    }

    /// Start a report stream.
    ///
    /// Fails only if the server rejects the request before sending any
    /// output. Later failures arrive in the stream as a `stream error:` delta.
    pub async fn generate_report(
        &self,
        analysis: &ProjectAnalysis,
        target_model_id: Option<&str>,
        settings: &ReportSettings,
    ) -> Result<DeltaReceiver, AnalysisError> {
        let url = format!("{}/generate-report", self.base_url);
        let body = report_body(analysis, target_model_id, settings)?;

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                message: report_error_message(&text),
            });
        }

        let (tx, rx) = stream::delta_channel();
        tokio::spawn(stream::forward_text_stream(response.bytes_stream(), tx));
        Ok(rx)
    }
}

/// `{...analysis, targetModelId, settings}` as one flat object.
fn report_body(
    analysis: &ProjectAnalysis,
    target_model_id: Option<&str>,
    settings: &ReportSettings,
) -> Result<Value, AnalysisError> {
    let mut body =
        serde_json::to_value(analysis).map_err(|e| AnalysisError::Shape(e.to_string()))?;
    let obj = body
        .as_object_mut()
        .ok_or_else(|| AnalysisError::Shape("analysis is not an object".to_string()))?;
    if let Some(id) = target_model_id {
        obj.insert("targetModelId".to_string(), Value::String(id.to_string()));
    }
    obj.insert(
        "settings".to_string(),
        serde_json::to_value(settings).map_err(|e| AnalysisError::Shape(e.to_string()))?,
    );
    Ok(body)
}

/// Message for a failed `/analyze`: the `error` field, else the raw body.
fn server_error_message(body: &str) -> String {
    json_error(body).unwrap_or_else(|| {
        format!(
            "Failed to analyze project via analysis service. Raw server output: {}",
            truncate_chars(body.trim(), RAW_BODY_EXCERPT_CHARS)
        )
    })
}

/// Message for a failed `/generate-report`, which answers in plain text.
fn report_error_message(body: &str) -> String {
    json_error(body).unwrap_or_else(|| match body.trim() {
        "" => "Failed to generate report".to_string(),
        text => text.to_string(),
    })
}

/// `{"error": "..."}` or `{"error": {"message": "..."}}`.
fn json_error(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(stream::error_message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_message() {
        assert_eq!(server_error_message(r#"{"error":"no key"}"#), "no key");
        assert_eq!(
            server_error_message(r#"{"error":{"message":"quota"}}"#),
            "quota"
        );
        let html = format!("<html>{}</html>", "x".repeat(300));
        let msg = server_error_message(&html);
        assert!(msg.starts_with("Failed to analyze project via analysis service. Raw server output: <html>"));
        assert!(msg.len() < 200);
    }

    #[test]
    fn test_report_error_message() {
        assert_eq!(report_error_message("upstream down\n"), "upstream down");
        assert_eq!(report_error_message(""), "Failed to generate report");
        assert_eq!(report_error_message(r#"{"error":"bad"}"#), "bad");
    }

    #[test]
    fn test_report_body_is_flat() {
        let analysis = ProjectAnalysis {
            project_name: "shop".into(),
            ..Default::default()
        };
        let body = report_body(&analysis, Some("openai/gpt-4o"), &ReportSettings::default())
            .unwrap();
        assert_eq!(body["projectName"], "shop");
        assert_eq!(body["targetModelId"], "openai/gpt-4o");
        assert_eq!(body["settings"]["universityFormat"], "Bangalore University BCA");
        assert_eq!(body["settings"]["verbosity"], "medium");

        let body = report_body(&analysis, None, &ReportSettings::default()).unwrap();
        assert!(body.get("targetModelId").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let client = AnalysisClient::new("http://127.0.0.1:9/").unwrap();
        let ctx = ExtractionContext {
            project_name: "p".into(),
            file_tree_summary: String::new(),
            manifest_text: "{}".into(),
            readme_text: String::new(),
            source_snippets: String::new(),
            snippet_count: 0,
            model_id: "gemini-2.5-flash".into(),
        };
        let err = client.request_analysis(&ctx).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Transport(_)));
    }
}
