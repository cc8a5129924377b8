//! Web search client with transient retry and a per-run cache.

use super::RateLimitGate;
use crate::errors::ClientError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page title.
    pub title: String,
    /// Result snippet.
    pub snippet: String,
    /// Page URL.
    pub url: String,
}

impl SearchHit {
    /// Creates a hit.
    #[must_use]
    pub fn new(title: impl Into<String>, snippet: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            url: url.into(),
        }
    }
}

/// A search service.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Service name used in errors and logs.
    fn name(&self) -> &str;

    /// Runs one query.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ClientError>;
}

/// Search client tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Hits requested per query.
    pub max_results: usize,
    /// Extra attempts on transient failures.
    pub transient_retries: u32,
    /// Fixed delay between transient retries.
    #[serde(with = "crate::config::duration_ms")]
    pub retry_delay: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: 5,
            transient_retries: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Wraps a [`SearchBackend`] with quota tracking and transient retry.
///
/// Rate limits are never retried here: they are recorded on the shared
/// [`RateLimitGate`] and returned so the pipeline can back off.
#[derive(Clone)]
pub struct SearchClient {
    backend: Arc<dyn SearchBackend>,
    gate: Arc<RateLimitGate>,
    settings: SearchSettings,
}

impl SearchClient {
    /// Creates a client over a backend and a shared gate.
    #[must_use]
    pub fn new(backend: Arc<dyn SearchBackend>, gate: Arc<RateLimitGate>) -> Self {
        Self {
            backend,
            gate,
            settings: SearchSettings::default(),
        }
    }

    /// Replaces the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: SearchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The shared rate limit gate.
    #[must_use]
    pub fn gate(&self) -> &Arc<RateLimitGate> {
        &self.gate
    }

    /// Runs one query against the service.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ClientError> {
        let service = self.backend.name().to_string();
        let mut retries = 0;

        loop {
            if let Err(remaining) = self.gate.try_acquire() {
                debug!(query, remaining_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX), "Search quota blocked");
                return Err(ClientError::rate_limited(service, Some(remaining)));
            }

            match self.backend.search(query, self.settings.max_results).await {
                Ok(hits) => return Ok(hits),
                Err(err @ ClientError::RateLimited { .. }) => {
                    self.gate.record_rate_limit(err.reset_after());
                    warn!(query, error = %err, "Search rate limited");
                    return Err(err);
                }
                Err(err) if err.is_retryable() && retries < self.settings.transient_retries => {
                    retries += 1;
                    warn!(query, attempt = retries, error = %err, "Search failed, will retry");
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Starts a cache scope for one run.
    #[must_use]
    pub fn session(&self) -> SearchSession {
        SearchSession {
            client: self.clone(),
            cache: Arc::new(DashMap::new()),
        }
    }
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("backend", &self.backend.name())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Search access for one run, caching identical queries.
///
/// Dropping the session discards the cache. Failures are not cached.
#[derive(Clone)]
pub struct SearchSession {
    client: SearchClient,
    cache: Arc<DashMap<String, Vec<SearchHit>>>,
}

impl SearchSession {
    /// Runs a query, serving repeats from the cache.
    ///
    /// Returns the hits and whether they came from the cache.
    pub async fn search(&self, query: &str) -> Result<(Vec<SearchHit>, bool), ClientError> {
        let key = query.trim();
        if let Some(hits) = self.cache.get(key) {
            debug!(query = key, "Search cache hit");
            return Ok((hits.clone(), true));
        }
        let hits = self.client.search(key).await?;
        self.cache.insert(key.to_string(), hits.clone());
        Ok((hits, false))
    }

    /// Number of cached queries.
    #[must_use]
    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }
}

impl std::fmt::Debug for SearchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSession")
            .field("client", &self.client)
            .field("cached_queries", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSearch;

    fn client(backend: ScriptedSearch) -> (SearchClient, Arc<ScriptedSearch>) {
        let backend = Arc::new(backend);
        let client = SearchClient::new(backend.clone(), Arc::new(RateLimitGate::default()))
            .with_settings(SearchSettings {
                retry_delay: Duration::from_millis(1),
                ..SearchSettings::default()
            });
        (client, backend)
    }

    #[tokio::test]
    async fn test_transient_failures_retried_internally() {
        let (client, backend) = client(
            ScriptedSearch::new()
                .fail_next(ClientError::transient("serper", "reset"))
                .fail_next(ClientError::transient("serper", "reset")),
        );

        let hits = client.search("barcelona weather").await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_transient_retries_are_bounded() {
        let (client, backend) = client(ScriptedSearch::new().always_fail(ClientError::timeout(
            "serper",
            Duration::from_secs(1),
        )));

        let err = client.search("q").await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_not_retried_and_gates_later_calls() {
        let (client, backend) = client(ScriptedSearch::new().always_fail(ClientError::rate_limited(
            "serper",
            Some(Duration::from_secs(60)),
        )));

        let err = client.search("q").await.unwrap_err();
        assert!(err.is_rate_limit());
        assert_eq!(backend.calls(), 1);

        let err = client.search("other").await.unwrap_err();
        assert!(err.is_rate_limit());
        assert!(err.reset_after().is_some());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_fatal_errors_surface_immediately() {
        let (client, backend) =
            client(ScriptedSearch::new().always_fail(ClientError::rejected("serper", 401, "bad key")));
        assert!(client.search("q").await.is_err());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_session_caches_per_run() {
        let (client, backend) = client(ScriptedSearch::new());

        let run_a = client.session();
        let (_, cached) = run_a.search("barcelona weather").await.unwrap();
        assert!(!cached);
        let (_, cached) = run_a.search("barcelona weather ").await.unwrap();
        assert!(cached);
        assert_eq!(run_a.cached_queries(), 1);
        assert_eq!(backend.calls(), 1);

        let run_b = client.session();
        let (_, cached) = run_b.search("barcelona weather").await.unwrap();
        assert!(!cached);
        assert_eq!(backend.calls(), 2);
    }
}
