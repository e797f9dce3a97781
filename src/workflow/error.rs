//! Engine error types

use std::time::Duration;
use thiserror::Error;

/// Failure raised by a step handler
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub kind: HandlerErrorKind,
    pub message: String,
}

impl HandlerError {
    pub fn new(kind: HandlerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(HandlerErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(HandlerErrorKind::Timeout, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(HandlerErrorKind::InvalidResponse, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(HandlerErrorKind::Unauthorized, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(HandlerErrorKind::Unknown, message)
    }
}

/// Error classification so callers can decide whether to retry the turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerErrorKind {
    /// Remote service unreachable or rate limited - retryable
    Network,
    /// Remote call took too long - retryable
    Timeout,
    /// The model produced something the protocol cannot use
    InvalidResponse,
    /// Caller lacks the identity the step needs
    Unauthorized,
    Unknown,
}

impl HandlerErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }
}

/// Failures `StateMachine::process` hands back to its caller.
///
/// Workflow-logic problems (rejected transitions, missing handlers, runaway
/// chains) never appear here; they resolve to the fallback response.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Handler for step {step} failed: {source}")]
    Handler {
        step: String,
        #[source]
        source: HandlerError,
    },
    #[error("Handler for step {step} was cancelled")]
    Cancelled { step: String },
    #[error("Turn timed out after {after:?}")]
    Timeout { after: Duration },
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Handler { source, .. } => source.kind.is_retryable(),
            EngineError::Timeout { .. } => true,
            EngineError::Cancelled { .. } => false,
        }
    }
}

/// Conditions the engine recovers from itself but reports to observers
#[derive(Debug, Error)]
pub enum EngineFault {
    #[error("Automatic transition limit of {limit} reached")]
    IterationLimitExceeded { limit: u32 },
    #[error("No handler registered for step {step}")]
    MissingHandler { step: String },
}

/// Returned by an observer callback that could not record an event
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ObserverError(pub String);

impl ObserverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
