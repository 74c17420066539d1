use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::error::AdvisorError;

/// Default hosted model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
/// Default API base URL.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Outcome of a generation request that reached the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    /// Non-blank generated text.
    Text(String),
    /// The service answered but produced nothing usable.
    NoContent {
        /// Why nothing was produced, as reported by the service when available.
        reason: String,
    },
}

/// Anything that turns a prompt into generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends one prompt and returns the generated text.
    async fn generate(&self, prompt: &str) -> Result<Generation, AdvisorError>;
}

/// Connection settings for [`GeminiClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiSettings {
    /// API key sent in the `x-goog-api-key` header.
    pub api_key: String,
    /// Model name, e.g. `gemini-1.5-flash`.
    pub model: String,
    /// Base URL without trailing slash.
    pub endpoint: String,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl GeminiSettings {
    /// Settings with default model, endpoint and timeout.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            endpoint: DEFAULT_ENDPOINT.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

/// `generateContent` client over reqwest.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    settings: GeminiSettings,
}

impl GeminiClient {
    /// Builds the client; fails on a blank key, model or endpoint.
    pub fn new(settings: GeminiSettings) -> Result<Self, AdvisorError> {
        if settings.api_key.trim().is_empty() {
            return Err(AdvisorError::Configuration(
                "no API key; pass --api-key or set GEMINI_API_KEY".into(),
            ));
        }
        if settings.model.trim().is_empty() {
            return Err(AdvisorError::Configuration("model name is empty".into()));
        }
        if !(settings.endpoint.starts_with("http://") || settings.endpoint.starts_with("https://")) {
            return Err(AdvisorError::Configuration(format!(
                "endpoint must be an http(s) URL, got '{}'",
                settings.endpoint
            )));
        }
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| AdvisorError::Configuration(err.to_string()))?;
        Ok(Self { client, settings })
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &GeminiSettings {
        &self.settings
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<Generation, AdvisorError> {
        let response = self
            .client
            .post(self.settings.url())
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        interpret_response(status, &body)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Maps a raw HTTP status and body onto a generation or a typed error.
pub fn interpret_response(status: StatusCode, body: &str) -> Result<Generation, AdvisorError> {
    if !status.is_success() {
        return Err(classify_failure(status, body));
    }
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|err| AdvisorError::MalformedResponse(err.to_string()))?;
    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let reason = parsed
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
            .unwrap_or_else(|| "no candidates returned".into());
        return Ok(Generation::NoContent { reason });
    };
    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        let reason = candidate
            .finish_reason
            .unwrap_or_else(|| "empty response text".into());
        return Ok(Generation::NoContent { reason });
    }
    Ok(Generation::Text(text))
}

fn classify_failure(status: StatusCode, body: &str) -> AdvisorError {
    let (message, service_status) = serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
        |_| (body.trim().chars().take(200).collect::<String>(), String::new()),
        |envelope| (envelope.error.message, envelope.error.status),
    );
    let message = if message.is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_owned()
    } else {
        message
    };
    if status == StatusCode::TOO_MANY_REQUESTS || service_status == "RESOURCE_EXHAUSTED" {
        AdvisorError::Quota(message)
    } else {
        AdvisorError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    #[test]
    fn joins_candidate_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Reroute via secondary port.\n"},{"text":"Weather is poor."}]},"finishReason":"STOP"}]}"#;
        assert_eq!(
            interpret_response(StatusCode::OK, body).unwrap(),
            Generation::Text("Reroute via secondary port.\nWeather is poor.".into())
        );
    }

    #[test]
    fn blocked_or_blank_output_is_no_content() {
        let blocked = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert_eq!(
            interpret_response(StatusCode::OK, blocked).unwrap(),
            Generation::NoContent {
                reason: "SAFETY".into()
            }
        );
        let blank = r#"{"candidates":[{"content":{"parts":[{"text":"   "}]},"finishReason":"MAX_TOKENS"}]}"#;
        assert_eq!(
            interpret_response(StatusCode::OK, blank).unwrap(),
            Generation::NoContent {
                reason: "MAX_TOKENS".into()
            }
        );
    }

    #[test]
    fn classifies_error_statuses() {
        let quota = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            interpret_response(StatusCode::TOO_MANY_REQUESTS, quota),
            Err(AdvisorError::Quota(msg)) if msg == "Quota exceeded"
        ));
        let denied = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            interpret_response(StatusCode::BAD_REQUEST, denied),
            Err(AdvisorError::Api { status: 400, .. })
        ));
        assert!(matches!(
            interpret_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
            Err(AdvisorError::Api { status: 502, message }) if message.contains("bad gateway")
        ));
        assert!(matches!(
            interpret_response(StatusCode::OK, "not json"),
            Err(AdvisorError::MalformedResponse(_))
        ));
    }

    #[test]
    fn rejects_unusable_settings() {
        assert!(matches!(
            GeminiClient::new(GeminiSettings::new("  ")),
            Err(AdvisorError::Configuration(_))
        ));
        let mut settings = GeminiSettings::new("key");
        settings.endpoint = "generativelanguage.googleapis.com".into();
        assert!(GeminiClient::new(settings).is_err());
    }

    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0_u8; 4096];
            loop {
                let read = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..read]);
                let text = String::from_utf8_lossy(&request);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length || read == 0 {
                        break;
                    }
                }
                if read == 0 {
                    break;
                }
            }
            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{addr}/v1beta"), handle)
    }

    #[tokio::test]
    async fn posts_prompt_with_key_header() {
        let (endpoint, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"candidates":[{"content":{"parts":[{"text":"Keep safety stock."}]}}]}"#,
        )
        .await;
        let mut settings = GeminiSettings::new("test-key");
        settings.endpoint = endpoint;
        let client = GeminiClient::new(settings).unwrap();
        let generation = client.generate("hello analyst").await.unwrap();
        assert_eq!(generation, Generation::Text("Keep safety stock.".into()));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1beta/models/gemini-1.5-flash:generateContent"));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        assert!(request.contains("hello analyst"));
    }

    #[tokio::test]
    async fn maps_quota_status_from_server() {
        let (endpoint, server) = serve_once(
            "HTTP/1.1 429 Too Many Requests",
            r#"{"error":{"code":429,"message":"slow down","status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .await;
        let mut settings = GeminiSettings::new("test-key");
        settings.endpoint = endpoint;
        let client = GeminiClient::new(settings).unwrap();
        let err = client.generate("prompt").await.unwrap_err();
        assert!(matches!(err, AdvisorError::Quota(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let mut settings = GeminiSettings::new("test-key");
        settings.endpoint = format!("http://{addr}");
        settings.timeout = Duration::from_secs(5);
        let client = GeminiClient::new(settings).unwrap();
        let err = client.generate("prompt").await.unwrap_err();
        assert!(matches!(err, AdvisorError::Network(_)));
    }
}
