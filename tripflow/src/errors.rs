//! Error types for the tripflow pipeline.
//!
//! Construction and validation problems surface as [`TripflowError`].
//! Failures inside a stage never escape as errors: they are classified into a
//! [`StageStatus`](crate::core::StageStatus) by [`ClientError::stage_status`]
//! and recorded on the stage result, so the controller alone decides between
//! retry, abort and cancel.

use crate::core::{RunStatus, StageStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The main error type for tripflow operations.
#[derive(Debug, Error)]
pub enum TripflowError {
    /// The trip request was rejected before any stage ran.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A network client was constructed without its credential.
    #[error("Missing credential for {service}")]
    MissingCredential {
        /// The service lacking a credential.
        service: String,
    },

    /// The report store failed.
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// A run status change would move backwards out of a terminal state.
    #[error("Invalid run transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: RunStatus,
        /// Requested status.
        to: RunStatus,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TripflowError {
    /// Creates a missing credential error.
    #[must_use]
    pub fn missing_credential(service: impl Into<String>) -> Self {
        Self::MissingCredential {
            service: service.into(),
        }
    }
}

/// A single problem found while validating a trip request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// The offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Error raised when a trip request fails validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("Invalid trip request: {}", render_issues(.issues))]
pub struct ValidationError {
    /// All issues found, in field order.
    pub issues: Vec<FieldIssue>,
}

fn render_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Creates an empty validation error to accumulate issues into.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an issue.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(FieldIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if no issue was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns true if the given field has an issue.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.issues.iter().any(|i| i.field == field)
    }

    /// Converts into a result: `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Errors raised by the report store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested report does not exist.
    #[error("Report not found: {0}")]
    NotFound(String),

    /// The key is not a valid report key.
    #[error("Invalid report key: {0}")]
    InvalidKey(String),

    /// Underlying IO failure.
    #[error("Report store IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the search and reasoning clients.
///
/// Every variant maps onto a stage status through [`Self::stage_status`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The client has no credential configured.
    #[error("Missing credential for {service}")]
    MissingCredential {
        /// The service name.
        service: String,
    },

    /// The service quota is exhausted.
    #[error("{service} rate limited{}", .reset_after.map(|d| format!(", resets in {}ms", d.as_millis())).unwrap_or_default())]
    RateLimited {
        /// The service name.
        service: String,
        /// How long until the quota resets, when the service says so.
        reset_after: Option<Duration>,
    },

    /// A network or server-side failure worth retrying.
    #[error("{service} transient failure: {message}")]
    Transient {
        /// The service name.
        service: String,
        /// Failure detail.
        message: String,
    },

    /// The request did not finish in time.
    #[error("{service} timed out after {}ms", .after.as_millis())]
    Timeout {
        /// The service name.
        service: String,
        /// The elapsed timeout.
        after: Duration,
    },

    /// The reasoning output does not have the expected shape.
    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    /// The reasoning backend refused the prompt.
    #[error("Output rejected by content policy: {0}")]
    PolicyRejected(String),

    /// The service rejected the request outright.
    #[error("{service} rejected the request ({status}): {message}")]
    Rejected {
        /// The service name.
        service: String,
        /// HTTP status code.
        status: u16,
        /// Response body or detail.
        message: String,
    },
}

impl ClientError {
    /// Creates a rate limited error.
    #[must_use]
    pub fn rate_limited(service: impl Into<String>, reset_after: Option<Duration>) -> Self {
        Self::RateLimited {
            service: service.into(),
            reset_after,
        }
    }

    /// Creates a transient error.
    #[must_use]
    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(service: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            service: service.into(),
            after,
        }
    }

    /// Creates a rejected error.
    #[must_use]
    pub fn rejected(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    /// Returns true if the error is a rate limit.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns true for network, timeout and quota failures.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Transient { .. } | Self::Timeout { .. }
        )
    }

    /// Returns the quota reset hint, if any.
    #[must_use]
    pub fn reset_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { reset_after, .. } => *reset_after,
            _ => None,
        }
    }

    /// Classifies the error into the stage status it produces.
    #[must_use]
    pub fn stage_status(&self) -> StageStatus {
        if self.is_retryable() {
            StageStatus::FailedRetryable
        } else {
            StageStatus::FailedFatal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_accumulates() {
        let mut err = ValidationError::new();
        assert!(err.clone().into_result().is_ok());

        err.push("origin", "must not be empty");
        err.push("dates", "start date is after end date");

        assert!(err.has_field("origin"));
        assert!(!err.has_field("destination"));
        assert_eq!(
            err.to_string(),
            "Invalid trip request: origin: must not be empty; dates: start date is after end date"
        );
        assert!(err.into_result().is_err());
    }

    #[test]
    fn test_client_error_classification() {
        assert_eq!(
            ClientError::rate_limited("search", None).stage_status(),
            StageStatus::FailedRetryable
        );
        assert_eq!(
            ClientError::transient("search", "connection reset").stage_status(),
            StageStatus::FailedRetryable
        );
        assert_eq!(
            ClientError::timeout("reasoning", Duration::from_secs(5)).stage_status(),
            StageStatus::FailedRetryable
        );
        assert_eq!(
            ClientError::MalformedOutput("no itinerary".into()).stage_status(),
            StageStatus::FailedFatal
        );
        assert_eq!(
            ClientError::PolicyRejected("content_filter".into()).stage_status(),
            StageStatus::FailedFatal
        );
        assert_eq!(
            ClientError::rejected("search", 401, "bad key").stage_status(),
            StageStatus::FailedFatal
        );
    }

    #[test]
    fn test_rate_limited_message_includes_hint() {
        let err = ClientError::rate_limited("search", Some(Duration::from_millis(1500)));
        assert_eq!(err.to_string(), "search rate limited, resets in 1500ms");
        assert_eq!(err.reset_after(), Some(Duration::from_millis(1500)));

        let err = ClientError::rate_limited("search", None);
        assert_eq!(err.to_string(), "search rate limited");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = TripflowError::InvalidTransition {
            from: RunStatus::Completed,
            to: RunStatus::Running,
        };
        assert_eq!(err.to_string(), "Invalid run transition: completed -> running");
    }
}
