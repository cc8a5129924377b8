//! Serper.dev Google search backend.

use super::retry_after;
use super::search::{SearchBackend, SearchHit};
use crate::errors::{ClientError, TripflowError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "serper";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Search backend for `POST /search` on Serper.
pub struct SerperBackend {
    http: Client,
    base_url: String,
    api_key: String,
}

impl SerperBackend {
    /// Creates a backend.
    ///
    /// # Errors
    ///
    /// Returns [`TripflowError::MissingCredential`] if the key is absent or blank.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, TripflowError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TripflowError::missing_credential(SERVICE))?;
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| TripflowError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl SearchBackend for SerperBackend {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ClientError> {
        let url = format!("{}/search", self.base_url);
        debug!(query, "Serper search");

        let response = self
            .http
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest {
                q: query,
                num: max_results,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::timeout(SERVICE, DEFAULT_TIMEOUT)
                } else {
                    ClientError::transient(SERVICE, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let hint = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            let quota = text.to_lowercase().contains("quota");
            return Err(match status.as_u16() {
                429 => ClientError::rate_limited(SERVICE, hint),
                400..=403 if quota => ClientError::rate_limited(SERVICE, hint),
                408 | 500..=599 => ClientError::transient(SERVICE, format!("HTTP {status}: {text}")),
                code => ClientError::rejected(SERVICE, code, text),
            });
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|e| ClientError::transient(SERVICE, format!("unreadable response: {e}")))?;

        Ok(parsed
            .organic
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit::new(r.title, r.snippet, r.link))
            .collect())
    }
}

impl std::fmt::Debug for SerperBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerperBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
