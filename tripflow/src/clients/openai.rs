//! OpenAI-compatible chat completions backend.
//!
//! Works against any server exposing `/chat/completions` in the OpenAI
//! format, including a local Ollama instance.

use super::reasoning::{CompletionRequest, ReasoningBackend};
use super::retry_after;
use crate::errors::{ClientError, TripflowError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "reasoning";

/// Timeout for the model listing request.
const LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Models suggested, in order, when the configured one is not served.
pub const PREFERRED_MODELS: [&str; 7] = [
    "llama3.2:latest",
    "llama3.1:latest",
    "llama3:latest",
    "llama2:latest",
    "mistral:latest",
    "gemma2:latest",
    "phi3:latest",
];

/// Picks a served model to use instead: the first preferred one, else the
/// first one listed.
#[must_use]
pub fn fallback_model(available: &[String]) -> Option<&str> {
    PREFERRED_MODELS
        .iter()
        .copied()
        .find(|m| available.iter().any(|a| a == m))
        .or_else(|| available.first().map(String::as_str))
}

/// Chat completions backend.
pub struct OpenAiCompatibleBackend {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiCompatibleBackend {
    /// Creates a backend.
    ///
    /// # Errors
    ///
    /// Returns [`TripflowError::MissingCredential`] if the key is absent or blank.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TripflowError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TripflowError::missing_credential(SERVICE))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TripflowError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            timeout,
        })
    }

    /// The configured model name.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Lists the models the server offers through `GET /models`.
    ///
    /// Doubles as a reachability check for the server.
    ///
    /// # Errors
    ///
    /// Returns the same classification as [`ReasoningBackend::complete`] for
    /// transport and status failures, and [`ClientError::MalformedOutput`] for
    /// an unreadable listing.
    pub async fn available_models(&self) -> Result<Vec<String>, ClientError> {
        let url = format!("{}/models", self.base_url);
        debug!(%url, "Listing models");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .map_err(|e| send_error(&e, LIST_TIMEOUT))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        let listing: ModelList = response
            .json()
            .await
            .map_err(|e| ClientError::MalformedOutput(format!("unreadable model list: {e}")))?;
        Ok(listing.data.into_iter().map(|m| m.id).collect())
    }

    /// Returns true if the server lists the configured model.
    ///
    /// # Errors
    ///
    /// See [`OpenAiCompatibleBackend::available_models`].
    pub async fn has_model(&self) -> Result<bool, ClientError> {
        Ok(self.available_models().await?.iter().any(|m| *m == self.model))
    }

    fn body(&self, request: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt},
            ],
            "temperature": request.params.temperature,
            "max_tokens": request.params.max_tokens,
        })
    }
}

fn send_error(e: &reqwest::Error, timeout: Duration) -> ClientError {
    if e.is_timeout() {
        ClientError::timeout(SERVICE, timeout)
    } else {
        ClientError::transient(SERVICE, e.to_string())
    }
}

async fn status_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let hint = retry_after(response.headers());
    let text = response.text().await.unwrap_or_default();
    match status.as_u16() {
        429 => ClientError::rate_limited(SERVICE, hint),
        408 | 500..=599 => ClientError::transient(SERVICE, format!("HTTP {status}: {text}")),
        code => ClientError::rejected(SERVICE, code, text),
    }
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl ReasoningBackend for OpenAiCompatibleBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ClientError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, "Sending chat completion");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| send_error(&e, self.timeout))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClientError::MalformedOutput(format!("unreadable completion: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::MalformedOutput("completion has no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ClientError::PolicyRejected(
                "completion stopped by content filter".to_string(),
            ));
        }

        choice
            .message
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ClientError::MalformedOutput("completion has no content".to_string()))
    }
}

impl std::fmt::Debug for OpenAiCompatibleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::GenerationParams;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "You are the Destination Analyst.".into(),
            prompt: "Plan Barcelona".into(),
            params: GenerationParams {
                temperature: 0.2,
                max_tokens: 2048,
            },
        }
    }

    fn backend(server: &MockServer) -> OpenAiCompatibleBackend {
        OpenAiCompatibleBackend::new(
            server.uri(),
            Some("test-key".into()),
            "llama3.2:latest",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_credential() {
        let err = OpenAiCompatibleBackend::new("http://x", None, "m", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TripflowError::MissingCredential { .. }));
        let err =
            OpenAiCompatibleBackend::new("http://x", Some("  ".into()), "m", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TripflowError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "## Weather\nSunny"}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = backend(&server).complete(&request()).await.unwrap();
        assert_eq!(out, "## Weather\nSunny");
    }

    #[tokio::test]
    async fn test_rate_limit_with_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = backend(&server).complete(&request()).await.unwrap_err();
        assert_eq!(err, ClientError::rate_limited(SERVICE, Some(Duration::from_secs(7))));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = backend(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Transient { .. }));
    }

    #[tokio::test]
    async fn test_client_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let err = backend(&server).complete(&request()).await.unwrap_err();
        assert_eq!(err, ClientError::rejected(SERVICE, 401, "invalid key"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_content_filter_is_policy_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": ""}, "finish_reason": "content_filter"}]
            })))
            .mount(&server)
            .await;

        let err = backend(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ClientError::PolicyRejected(_)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = backend(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ClientError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn test_model_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "data": [
                    {"id": "mistral:latest", "object": "model"},
                    {"id": "llama3.2:latest", "object": "model"}
                ]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let backend = backend(&server);
        let models = backend.available_models().await.unwrap();
        assert_eq!(models, vec!["mistral:latest".to_string(), "llama3.2:latest".to_string()]);
        assert!(backend.has_model().await.unwrap());
    }

    #[tokio::test]
    async fn test_configured_model_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": "phi3:latest"}, {"id": "mistral:latest"}]
            })))
            .mount(&server)
            .await;

        let backend = backend(&server);
        assert!(!backend.has_model().await.unwrap());
        let available = backend.available_models().await.unwrap();
        assert_eq!(fallback_model(&available), Some("mistral:latest"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let backend = OpenAiCompatibleBackend::new(
            "http://127.0.0.1:9",
            Some("test-key".into()),
            "llama3.2:latest",
            Duration::from_secs(5),
        )
        .unwrap();
        let err = backend.available_models().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_fallback_model_order() {
        let none: Vec<String> = Vec::new();
        assert_eq!(fallback_model(&none), None);
        let custom = vec!["qwen2:7b".to_string()];
        assert_eq!(fallback_model(&custom), Some("qwen2:7b"));
    }
}
