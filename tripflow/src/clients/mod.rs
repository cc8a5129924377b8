//! Clients for the two external services a stage depends on.
//!
//! This module provides:
//! - [`SearchClient`] with transient retry, a shared [`RateLimitGate`] and per-run caching
//! - [`ReasoningClient`] with prompt fitting and a request timeout
//! - HTTP backends for Serper and OpenAI-compatible chat endpoints (`http` feature)

#[cfg(feature = "http")]
mod openai;
mod prompt;
mod rate_limit;
mod reasoning;
mod search;
#[cfg(feature = "http")]
mod serper;

#[cfg(feature = "http")]
pub use openai::{fallback_model, OpenAiCompatibleBackend, PREFERRED_MODELS};
pub use prompt::{truncate_middle, Prompt};
pub use rate_limit::{RateLimitGate, DEFAULT_COOLDOWN, MAX_COOLDOWN};
pub use reasoning::{CompletionRequest, GenerationParams, ReasoningBackend, ReasoningClient, ReasoningSettings};
pub use search::{SearchBackend, SearchClient, SearchHit, SearchSession, SearchSettings};
#[cfg(feature = "http")]
pub use serper::SerperBackend;

/// Parses a `retry-after` header given in seconds.
#[cfg(feature = "http")]
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<std::time::Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let secs: f64 = value.trim().parse().ok()?;
    std::time::Duration::try_from_secs_f64(secs).ok()
}
