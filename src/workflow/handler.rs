//! Step handler contract and registry

use super::auth::AuthContext;
use super::error::HandlerError;
use super::response::StepResponse;
use super::session::SessionState;
use super::step::WorkflowStep;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Author of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Input of one handler invocation.
///
/// `message` is the user's text, or the previous handler's internal message
/// when the handler runs as the tail of an automatic chain.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    pub message: &'a str,
    pub history: &'a [HistoryMessage],
    /// Cancelled when the caller abandons the turn
    pub cancel: &'a CancellationToken,
}

/// Logic for one workflow step.
///
/// Typically wraps an LLM call, so `handle` may be slow and may fail.
#[async_trait]
pub trait StepHandler<S: WorkflowStep>: Send + Sync {
    async fn handle(
        &self,
        input: StepInput<'_>,
        session: &mut SessionState,
        auth: &AuthContext,
    ) -> Result<StepResponse<S>, HandlerError>;

    /// Step this handler is registered for
    fn step(&self) -> S;

    /// `true` for steps decided entirely by backend code, without an LLM.
    /// Informational: the engine reports it when tracing handler calls.
    fn is_backend_only(&self) -> bool {
        false
    }
}

#[async_trait]
impl<S: WorkflowStep, T: StepHandler<S> + ?Sized> StepHandler<S> for Arc<T> {
    async fn handle(
        &self,
        input: StepInput<'_>,
        session: &mut SessionState,
        auth: &AuthContext,
    ) -> Result<StepResponse<S>, HandlerError> {
        (**self).handle(input, session, auth).await
    }

    fn step(&self) -> S {
        (**self).step()
    }

    fn is_backend_only(&self) -> bool {
        (**self).is_backend_only()
    }
}

/// Explicit step -> handler dispatch table
pub struct HandlerRegistry<S: WorkflowStep> {
    handlers: HashMap<S, Arc<dyn StepHandler<S>>>,
}

impl<S: WorkflowStep> HandlerRegistry<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn from_handlers(handlers: impl IntoIterator<Item = Arc<dyn StepHandler<S>>>) -> Self {
        let mut registry = Self::new();
        for handler in handlers {
            registry.register(handler);
        }
        registry
    }

    /// Register `handler` under its own step, returning any handler it replaced
    pub fn register(&mut self, handler: Arc<dyn StepHandler<S>>) -> Option<Arc<dyn StepHandler<S>>> {
        let step = handler.step();
        let previous = self.handlers.insert(step, handler);
        if previous.is_some() {
            tracing::warn!(step = %step, "Replacing already registered step handler");
        }
        previous
    }

    pub fn get(&self, step: S) -> Option<Arc<dyn StepHandler<S>>> {
        self.handlers.get(&step).cloned()
    }

    pub fn contains(&self, step: S) -> bool {
        self.handlers.contains_key(&step)
    }

    /// Steps of the workflow that have no handler
    pub fn missing_steps(&self) -> Vec<S> {
        S::all()
            .iter()
            .copied()
            .filter(|step| !self.handlers.contains_key(step))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<S: WorkflowStep> Default for HandlerRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
