//! Language reasoning client.

use super::Prompt;
use crate::errors::ClientError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Generation parameters fixed per stage role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            max_tokens: 2048,
        }
    }
}

/// A single completion request sent to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System message, the role persona.
    pub system: String,
    /// User message, the fitted prompt.
    pub prompt: String,
    /// Generation parameters.
    pub params: GenerationParams,
}

/// A language model service.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Model identifier, recorded in reports.
    fn model(&self) -> &str;

    /// Produces a completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ClientError>;
}

/// Reasoning client tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningSettings {
    /// Per-request timeout.
    #[serde(with = "crate::config::duration_ms")]
    pub timeout: Duration,
    /// Largest prompt sent, in characters.
    pub max_prompt_chars: usize,
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_prompt_chars: 24_000,
        }
    }
}

/// Wraps a [`ReasoningBackend`] with prompt fitting and a request timeout.
#[derive(Clone)]
pub struct ReasoningClient {
    backend: Arc<dyn ReasoningBackend>,
    settings: ReasoningSettings,
}

impl ReasoningClient {
    /// Creates a client with default settings.
    #[must_use]
    pub fn new(backend: Arc<dyn ReasoningBackend>) -> Self {
        Self {
            backend,
            settings: ReasoningSettings::default(),
        }
    }

    /// Replaces the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: ReasoningSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The backend's model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Completes a prompt under the given persona.
    ///
    /// Oversized prompts are truncated rather than rejected. A timeout and an
    /// empty completion are reported as errors.
    pub async fn complete(
        &self,
        prompt: &Prompt,
        role_hint: &str,
        params: GenerationParams,
    ) -> Result<String, ClientError> {
        let full_len = prompt.render().chars().count();
        let text = prompt.fit(self.settings.max_prompt_chars);
        if full_len > self.settings.max_prompt_chars {
            warn!(
                full_len,
                max = self.settings.max_prompt_chars,
                "Prompt truncated to fit reasoning limit"
            );
        }

        let request = CompletionRequest {
            system: role_hint.to_string(),
            prompt: text,
            params,
        };

        debug!(
            model = self.backend.model(),
            prompt_chars = request.prompt.len(),
            temperature = params.temperature,
            "Calling reasoning backend"
        );

        let output = tokio::time::timeout(self.settings.timeout, self.backend.complete(&request))
            .await
            .map_err(|_| ClientError::timeout("reasoning", self.settings.timeout))??;

        if output.trim().is_empty() {
            return Err(ClientError::MalformedOutput("empty completion".to_string()));
        }
        Ok(output)
    }
}

impl std::fmt::Debug for ReasoningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningClient")
            .field("model", &self.backend.model())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedReasoning;

    #[tokio::test]
    async fn test_prompt_fitted_before_sending() {
        let backend = Arc::new(ScriptedReasoning::new().respond("ok"));
        let client = ReasoningClient::new(backend.clone()).with_settings(ReasoningSettings {
            max_prompt_chars: 120,
            ..ReasoningSettings::default()
        });

        let prompt = Prompt::new("HEADER")
            .with_prior("a", "x".repeat(500))
            .with_prior("b", "latest")
            .with_task("TASK");
        let out = client.complete(&prompt, "persona", GenerationParams::default()).await.unwrap();
        assert_eq!(out, "ok");

        let sent = backend.requests();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].prompt.chars().count() <= 120);
        assert!(sent[0].prompt.contains("latest"));
        assert_eq!(sent[0].system, "persona");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_reported() {
        let backend = Arc::new(ScriptedReasoning::new().respond("late").with_delay(Duration::from_secs(10)));
        let client = ReasoningClient::new(backend).with_settings(ReasoningSettings {
            timeout: Duration::from_secs(1),
            ..ReasoningSettings::default()
        });

        let err = client
            .complete(&Prompt::new("h"), "p", GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_completion_is_malformed() {
        let backend = Arc::new(ScriptedReasoning::new().respond("   "));
        let client = ReasoningClient::new(backend);
        let err = client
            .complete(&Prompt::new("h"), "p", GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MalformedOutput(_)));
    }
}
