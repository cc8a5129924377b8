//! Stage results and the tool calls recorded on them.

use super::sections::{parse_sections, Section};
use super::StageStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One search query issued by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// The query string.
    pub query: String,
    /// Short human-readable summary of what came back.
    pub result_summary: String,
    /// Number of hits.
    pub result_count: usize,
    /// True if the result came from the per-run cache.
    #[serde(default)]
    pub cached: bool,
    /// Error text when the query failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallRecord {
    /// Records a successful query.
    #[must_use]
    pub fn ok(query: impl Into<String>, result_summary: impl Into<String>, result_count: usize) -> Self {
        Self {
            query: query.into(),
            result_summary: result_summary.into(),
            result_count,
            cached: false,
            error: None,
        }
    }

    /// Records a failed query.
    #[must_use]
    pub fn failed(query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            result_summary: String::new(),
            result_count: 0,
            cached: false,
            error: Some(error.into()),
        }
    }

    /// Marks the record as served from cache.
    #[must_use]
    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }
}

/// The outcome of one stage.
///
/// A result is built by the stage and then finished by the controller with
/// the elapsed time and attempt count. Once appended to a run it is never
/// changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub stage: String,
    /// Outcome classification.
    pub status: StageStatus,
    /// Raw text output. Empty on failure.
    pub output: String,
    /// Output split into `## ` sections.
    #[serde(default)]
    pub sections: Vec<Section>,
    /// Search queries issued during the final attempt.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Wall-clock time of the final attempt in milliseconds.
    #[serde(default)]
    pub elapsed_ms: u64,
    /// Attempts made, including the first.
    #[serde(default = "one")]
    pub attempts: u32,
    /// Human-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Quota reset hint carried from a rate limit failure.
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

fn one() -> u32 {
    1
}

impl StageResult {
    /// Creates a succeeded result, splitting the output into sections.
    #[must_use]
    pub fn succeeded(stage: impl Into<String>, output: impl Into<String>) -> Self {
        let output = output.into();
        Self {
            stage: stage.into(),
            status: StageStatus::Succeeded,
            sections: parse_sections(&output),
            output,
            tool_calls: Vec::new(),
            elapsed_ms: 0,
            attempts: 1,
            error: None,
            retry_after: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(stage: impl Into<String>, status: StageStatus, error: impl Into<String>) -> Self {
        debug_assert!(status.is_failure());
        Self {
            stage: stage.into(),
            status,
            output: String::new(),
            sections: Vec::new(),
            tool_calls: Vec::new(),
            elapsed_ms: 0,
            attempts: 1,
            error: Some(error.into()),
            retry_after: None,
        }
    }

    /// Attaches the tool calls made.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Sets the elapsed time.
    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the attempt count.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Sets the rate limit reset hint.
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Finds an output section by heading keywords.
    #[must_use]
    pub fn section(&self, keywords: &[&str]) -> Option<&Section> {
        super::sections::find_section(&self.sections, keywords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeded_parses_sections() {
        let result = StageResult::succeeded("destination_analysis", "## Weather\nSunny\n## Safety\nFine");
        assert!(result.is_success());
        assert_eq!(result.sections.len(), 2);
        assert_eq!(result.section(&["safety"]).map(|s| s.body.as_str()), Some("Fine"));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_failed_result() {
        let result = StageResult::failed("local_expertise", StageStatus::FailedFatal, "no tips")
            .with_attempts(1)
            .with_elapsed(Duration::from_millis(1500));
        assert!(!result.is_success());
        assert!(result.output.is_empty());
        assert_eq!(result.error.as_deref(), Some("no tips"));
        assert_eq!(result.elapsed_ms, 1500);
    }

    #[test]
    fn test_retry_hint_not_serialized() {
        let result = StageResult::failed("s", StageStatus::FailedRetryable, "quota")
            .with_retry_after(Some(Duration::from_secs(3)));
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("retry_after").is_none());
        assert_eq!(json["status"], "failed_retryable");
    }

    #[test]
    fn test_tool_call_records() {
        let ok = ToolCallRecord::ok("Barcelona weather in June", "3 results", 3).with_cached(true);
        assert!(ok.cached);
        let failed = ToolCallRecord::failed("q", "rate limited");
        assert_eq!(failed.result_count, 0);
        assert_eq!(failed.error.as_deref(), Some("rate limited"));
    }
}
