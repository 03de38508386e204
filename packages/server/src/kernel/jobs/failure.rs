//! Handler outcome types.
//!
//! A job handler returns `JobOutcome`: the success payload that becomes the
//! job's `result`, or a `JobFailure` tagged with whether the failure is worth
//! retrying. The tag travels with the error instead of being inferred from
//! message text downstream.

use openai_client::OpenAIError;
use thiserror::Error;

use super::job::ErrorKind;

/// What a job handler produces. `Ok` carries the result payload stored on the
/// job record; `Err` carries a tagged failure.
pub type JobOutcome = Result<serde_json::Value, JobFailure>;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobFailure {
    /// A transient failure; the job will be rescheduled if budget remains.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Retryable,
            message: message.into(),
        }
    }

    /// A permanent failure; no retry regardless of remaining budget.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NonRetryable,
            message: message.into(),
        }
    }

    pub fn should_retry(&self) -> bool {
        self.kind.should_retry()
    }
}

// Network and database errors are transient by default. OpenAI errors carry
// their own transience (5xx and 429 retry, 4xx and parse failures do not).

impl From<reqwest::Error> for JobFailure {
    fn from(e: reqwest::Error) -> Self {
        Self::retryable(format!("http request failed: {e}"))
    }
}

impl From<sqlx::Error> for JobFailure {
    fn from(e: sqlx::Error) -> Self {
        Self::retryable(format!("database error: {e}"))
    }
}

impl From<OpenAIError> for JobFailure {
    fn from(e: OpenAIError) -> Self {
        if e.is_transient() {
            Self::retryable(e.to_string())
        } else {
            Self::terminal(e.to_string())
        }
    }
}

impl From<serde_json::Error> for JobFailure {
    fn from(e: serde_json::Error) -> Self {
        // A payload that doesn't deserialize won't deserialize next time either.
        Self::terminal(format!("invalid job payload: {e}"))
    }
}

impl From<anyhow::Error> for JobFailure {
    fn from(e: anyhow::Error) -> Self {
        Self::retryable(format!("{e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_failure_should_retry() {
        assert!(JobFailure::retryable("timeout").should_retry());
        assert!(!JobFailure::terminal("bad input").should_retry());
    }

    #[test]
    fn openai_transience_maps_to_kind() {
        let transient = JobFailure::from(OpenAIError::Network("connection reset".into()));
        assert_eq!(transient.kind, ErrorKind::Retryable);

        let permanent = JobFailure::from(OpenAIError::Api {
            status: 400,
            message: "bad request".into(),
        });
        assert_eq!(permanent.kind, ErrorKind::NonRetryable);

        let rate_limited = JobFailure::from(OpenAIError::Api {
            status: 429,
            message: "slow down".into(),
        });
        assert_eq!(rate_limited.kind, ErrorKind::Retryable);
    }

    #[test]
    fn bad_payload_is_terminal() {
        let e = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let failure = JobFailure::from(e);
        assert_eq!(failure.kind, ErrorKind::NonRetryable);
    }

    #[test]
    fn failure_message_displays() {
        let failure = JobFailure::terminal("brand not found");
        assert_eq!(failure.to_string(), "brand not found");
    }
}
