//! Stream error taxonomy.
//!
//! Callers decide retry versus abort from these variants. Cancellation is a
//! control-flow outcome, not a failure, and is kept apart from transport
//! errors so the task loop never retries a cancelled request.

/// Result type alias for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors surfaced by [`StreamAdapter`](crate::StreamAdapter) streams.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// The request was cancelled through its handle or the adapter.
    #[error("stream cancelled")]
    Cancelled,

    /// Network or protocol failure before or during the stream.
    #[error("transport failure: {message}")]
    TransportFailure {
        /// Error description.
        message: String,
        /// Whether retrying may succeed (timeouts, refused connections).
        retryable: bool,
    },

    /// The backend refused the request (quota, invalid request, blocked
    /// content, unsupported feature).
    #[error("backend rejected request{}: {message}", status_suffix(.status))]
    BackendRejected {
        /// HTTP status, when the rejection came with one.
        status: Option<u16>,
        /// Error description.
        message: String,
        /// Backend-specific error code.
        code: Option<String>,
        /// Whether this error can be retried.
        retryable: bool,
        /// Suggested retry delay in milliseconds.
        retry_after_ms: Option<u64>,
    },

    /// The adapter already has an active request.
    #[error("a request is already in flight on this adapter")]
    RequestInFlight,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl StreamError {
    /// Transport failure from a message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure {
            message: message.into(),
            retryable: false,
        }
    }

    /// Whether this is a cancellation rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransportFailure { retryable, .. } | Self::BackendRejected { retryable, .. } => {
                *retryable
            }
            Self::Cancelled | Self::RequestInFlight => false,
        }
    }

    /// Suggested retry delay in milliseconds, if available.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::BackendRejected { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Error category string for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::TransportFailure { .. } => "transport",
            Self::BackendRejected {
                status: Some(429), ..
            } => "rate_limit",
            Self::BackendRejected { .. } => "rejected",
            Self::RequestInFlight => "busy",
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            let code = status.as_u16();
            return Self::BackendRejected {
                status: Some(code),
                message: err.to_string(),
                code: None,
                retryable: code == 429 || status.is_server_error(),
                retry_after_ms: None,
            };
        }
        Self::TransportFailure {
            retryable: err.is_timeout() || err.is_connect(),
            message: err.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(status: Option<u16>, retryable: bool) -> StreamError {
        StreamError::BackendRejected {
            status,
            message: "nope".into(),
            code: None,
            retryable,
            retry_after_ms: Some(1_500),
        }
    }

    #[test]
    fn cancellation_is_distinct_from_transport() {
        assert!(StreamError::Cancelled.is_cancellation());
        assert!(!StreamError::transport("reset").is_cancellation());
        assert!(!StreamError::Cancelled.is_retryable());
    }

    #[test]
    fn retryable_flags() {
        assert!(rejected(Some(503), true).is_retryable());
        assert!(!rejected(Some(400), false).is_retryable());
        assert!(!StreamError::RequestInFlight.is_retryable());
        assert!(
            StreamError::TransportFailure {
                message: "timeout".into(),
                retryable: true
            }
            .is_retryable()
        );
    }

    #[test]
    fn categories() {
        assert_eq!(StreamError::Cancelled.category(), "cancelled");
        assert_eq!(StreamError::transport("x").category(), "transport");
        assert_eq!(rejected(Some(429), true).category(), "rate_limit");
        assert_eq!(rejected(None, false).category(), "rejected");
        assert_eq!(StreamError::RequestInFlight.category(), "busy");
    }

    #[test]
    fn display_includes_status_when_present() {
        assert_eq!(
            rejected(Some(400), false).to_string(),
            "backend rejected request (400): nope"
        );
        assert_eq!(
            rejected(None, false).to_string(),
            "backend rejected request: nope"
        );
    }

    #[test]
    fn retry_after_only_for_rejections() {
        assert_eq!(rejected(Some(429), true).retry_after_ms(), Some(1_500));
        assert_eq!(StreamError::Cancelled.retry_after_ms(), None);
    }
}
