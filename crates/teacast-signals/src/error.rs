//! Error types for signal fetching and aggregation.

use std::time::Duration;

use thiserror::Error;

use crate::source::SignalSource;

/// Errors produced by the signal layer.
#[derive(Debug, Clone, Error)]
pub enum SignalError {
    /// Upstream throttled the request. The only retryable failure.
    #[error("{origin} rate limited the request")]
    RateLimited {
        origin: SignalSource,
        retry_after: Option<Duration>,
    },

    /// Network or protocol failure that is not expected to self-resolve.
    #[error("{origin} transport error: {reason}")]
    Transport { origin: SignalSource, reason: String },

    /// Retry budget spent while still rate limited.
    #[error("{origin} still rate limited after {attempts} attempt(s)")]
    Exhausted { origin: SignalSource, attempts: u32 },

    /// The payload could not be read at all (not a per-record problem).
    #[error("{origin} payload could not be decoded: {reason}")]
    Decode { origin: SignalSource, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    /// Some terms of a batch did not succeed.
    #[error("{failed} of {total} term(s) did not complete")]
    PartialAggregationFailure { failed: usize, total: usize },

    #[error("invalid signal configuration: {0}")]
    InvalidConfig(String),
}

impl SignalError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SignalError::RateLimited { .. })
    }

    /// Short machine-readable kind, used in structured logs and term errors.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalError::RateLimited { .. } => "rate_limited",
            SignalError::Transport { .. } => "transport",
            SignalError::Exhausted { .. } => "exhausted",
            SignalError::Decode { .. } => "decode",
            SignalError::Cancelled => "cancelled",
            SignalError::PartialAggregationFailure { .. } => "partial_aggregation_failure",
            SignalError::InvalidConfig(_) => "invalid_config",
        }
    }
}

/// Result type for signal operations.
pub type SignalResult<T> = std::result::Result<T, SignalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rate_limited_is_retryable() {
        let limited = SignalError::RateLimited {
            origin: SignalSource::Twitter,
            retry_after: None,
        };
        assert!(limited.is_retryable());
        let transport = SignalError::Transport {
            origin: SignalSource::Twitter,
            reason: "connection reset".to_string(),
        };
        assert!(!transport.is_retryable());
        assert!(!SignalError::Exhausted {
            origin: SignalSource::Facebook,
            attempts: 3
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display_names_source() {
        let err = SignalError::Exhausted {
            origin: SignalSource::GoogleTrends,
            attempts: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("google_trends"));
        assert!(msg.contains('3'));
    }
}
