//! Completion client error types

use crate::workflow::{HandlerError, HandlerErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Completion error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Timeout, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimit, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidResponse, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Connection failures - retryable
    Network,
    /// Provider did not answer in time - retryable
    Timeout,
    /// Rate limited (429) - retryable with backoff
    RateLimit,
    /// Authentication failed (401, 403) - not retryable
    Auth,
    /// Output did not follow the step protocol
    InvalidResponse,
    Unknown,
}

impl LlmErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::RateLimit)
    }
}

impl From<LlmError> for HandlerError {
    fn from(error: LlmError) -> Self {
        let kind = match error.kind {
            LlmErrorKind::Network | LlmErrorKind::RateLimit => HandlerErrorKind::Network,
            LlmErrorKind::Timeout => HandlerErrorKind::Timeout,
            LlmErrorKind::Auth => HandlerErrorKind::Unauthorized,
            LlmErrorKind::InvalidResponse => HandlerErrorKind::InvalidResponse,
            LlmErrorKind::Unknown => HandlerErrorKind::Unknown,
        };
        HandlerError::new(kind, error.message)
    }
}
