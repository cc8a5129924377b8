//! Runtime configuration.
//!
//! [`TripflowConfig::from_env`] reads a `.env` file if present and then the
//! process environment. Credentials stay optional here; the backends reject a
//! missing one when they are built.

use crate::clients::{ReasoningSettings, SearchSettings};
use crate::errors::TripflowError;
use crate::events::DEFAULT_CHANNEL_CAPACITY;
use crate::observability::LogFormat;
use crate::pipeline::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Serde helpers for durations stored as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serializes a duration as milliseconds.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserializes milliseconds into a duration.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

fn default_reasoning_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_search_base_url() -> String {
    "https://google.serper.dev".to_string()
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

/// Reasoning backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Bearer credential.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// OpenAI-compatible API root.
    #[serde(default = "default_reasoning_base_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Timeout and prompt limit.
    #[serde(default)]
    pub settings: ReasoningSettings,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_reasoning_base_url(),
            model: default_model(),
            settings: ReasoningSettings::default(),
        }
    }
}

/// Search backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Serper credential.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API root.
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    /// Result count and transient retry tuning.
    #[serde(default)]
    pub settings: SearchSettings,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_search_base_url(),
            settings: SearchSettings::default(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripflowConfig {
    /// Reasoning backend.
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    /// Search backend.
    #[serde(default)]
    pub search: SearchConfig,
    /// Stage retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Directory reports are written to.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    /// Per-run progress channel capacity.
    #[serde(default = "default_capacity")]
    pub progress_capacity: usize,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for TripflowConfig {
    fn default() -> Self {
        Self {
            reasoning: ReasoningConfig::default(),
            search: SearchConfig::default(),
            retry: RetryPolicy::default(),
            reports_dir: default_reports_dir(),
            progress_capacity: default_capacity(),
            log_format: LogFormat::default(),
        }
    }
}

impl TripflowConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `.env` and reads configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`TripflowError::Config`] if a variable is set but unreadable.
    pub fn from_env() -> Result<Self, TripflowError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TripflowError::Config`] if a value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TripflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        config.reasoning.api_key = get("TRIPFLOW_REASONING_API_KEY").or_else(|| get("OPENAI_API_KEY"));
        if let Some(url) = get("TRIPFLOW_REASONING_BASE_URL") {
            config.reasoning.base_url = url;
        }
        if let Some(model) = get("TRIPFLOW_REASONING_MODEL") {
            config.reasoning.model = model;
        }
        if let Some(secs) = parse::<u64, _>(&get, "TRIPFLOW_REASONING_TIMEOUT_SECS")? {
            config.reasoning.settings.timeout = Duration::from_secs(secs);
        }
        if let Some(chars) = parse(&get, "TRIPFLOW_MAX_PROMPT_CHARS")? {
            config.reasoning.settings.max_prompt_chars = chars;
        }

        config.search.api_key = get("SERPER_API_KEY");
        if let Some(url) = get("TRIPFLOW_SEARCH_BASE_URL") {
            config.search.base_url = url;
        }
        if let Some(n) = parse(&get, "TRIPFLOW_SEARCH_RESULTS")? {
            config.search.settings.max_results = n;
        }

        if let Some(dir) = get("TRIPFLOW_REPORTS_DIR") {
            config.reports_dir = PathBuf::from(dir);
        }
        if let Some(attempts) = parse(&get, "TRIPFLOW_STAGE_MAX_ATTEMPTS")? {
            config.retry = config.retry.with_max_attempts(attempts);
        }
        if let Some(format) = parse(&get, "TRIPFLOW_LOG_FORMAT")? {
            config.log_format = format;
        }

        Ok(config)
    }

    /// Sets the reasoning credential.
    #[must_use]
    pub fn with_reasoning_key(mut self, key: impl Into<String>) -> Self {
        self.reasoning.api_key = Some(key.into());
        self
    }

    /// Sets the search credential.
    #[must_use]
    pub fn with_search_key(mut self, key: impl Into<String>) -> Self {
        self.search.api_key = Some(key.into());
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.reasoning.model = model.into();
        self
    }

    /// Sets the reports directory.
    #[must_use]
    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = dir.into();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Names of the credentials that are not configured.
    #[must_use]
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.reasoning.api_key.is_none() {
            missing.push("TRIPFLOW_REASONING_API_KEY");
        }
        if self.search.api_key.is_none() {
            missing.push("SERPER_API_KEY");
        }
        missing
    }
}

fn parse<T, G>(get: &G, key: &str) -> Result<Option<T>, TripflowError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| TripflowError::Config(format!("{key}={raw}: {e}")))
        })
        .transpose()
}
