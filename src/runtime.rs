//! Conversation runtime
//!
//! Wraps the [`StateMachine`] with everything one chat message needs: the
//! conversation's session, step resolution, a turn timeout, session cleanup
//! when a workflow ends and rendering of the final reply.

mod store;

pub use store::{ConversationSession, SessionGuard, SessionHandle, SessionStore};

use crate::config::EngineConfig;
use crate::workflow::{
    AuthContext, EngineError, HandlerRegistry, HistoryMessage, ObserverSet, SessionState,
    StateMachine, StepStatus, TransitionValidator, TurnScope, WorkflowStep,
};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Picks the step a turn starts from, given the conversation's session
pub type StepResolver<S> = fn(&SessionState) -> S;

/// Stored step marker, or the initial step for a fresh conversation
pub fn stored_step<S: WorkflowStep>(session: &SessionState) -> S {
    session.current_step().unwrap_or_else(S::initial)
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Step {step} produced no reply for the user")]
    EmptyResponse { step: String },
    #[error("No handler registered for step {step}")]
    UnknownStep { step: String },
}

impl TurnError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TurnError::Engine(e) => e.is_retryable(),
            TurnError::EmptyResponse { .. } | TurnError::UnknownStep { .. } => false,
        }
    }
}

/// What the user gets back for one message
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply<S> {
    pub text: String,
    pub status: StepStatus<S>,
    /// Step the conversation is on after the turn
    pub step: S,
}

pub struct WorkflowRuntime<S: WorkflowStep> {
    machine: StateMachine<S>,
    registry: HandlerRegistry<S>,
    store: Arc<SessionStore>,
    resolve_step: StepResolver<S>,
    config: EngineConfig,
}

impl<S: WorkflowStep> WorkflowRuntime<S> {
    pub fn new(
        validator: TransitionValidator<S>,
        registry: HandlerRegistry<S>,
        observers: ObserverSet<S>,
        store: Arc<SessionStore>,
        config: EngineConfig,
    ) -> Self {
        let missing = registry.missing_steps();
        if !missing.is_empty() {
            let missing: Vec<&str> = missing.iter().map(WorkflowStep::name).collect();
            tracing::warn!(steps = ?missing, "Workflow steps without a handler");
        }
        let machine = StateMachine::new(Arc::new(validator), observers)
            .with_fallback_message(config.fallback_message.clone());
        Self {
            machine,
            registry,
            store,
            resolve_step: stored_step::<S>,
            config,
        }
    }

    pub fn with_step_resolver(mut self, resolve_step: StepResolver<S>) -> Self {
        self.resolve_step = resolve_step;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Generic text to show when a turn fails
    pub fn fallback_message(&self) -> &str {
        &self.config.fallback_message
    }

    /// Run one user message through the workflow.
    ///
    /// Turns for the same room are serialized; a room-less [`AuthContext`]
    /// runs against a throwaway session.
    pub async fn handle_message(
        &self,
        message: &str,
        history: &[HistoryMessage],
        auth: &AuthContext,
        cancel: &CancellationToken,
    ) -> Result<TurnReply<S>, TurnError> {
        match auth.room_id.as_deref() {
            Some(room_id) => {
                let mut session = self.store.lock(room_id).await;
                let result = self.run_turn(message, history, auth, cancel, &mut session.state).await;
                session.touch();
                result
            }
            None => {
                let mut scratch = SessionState::new();
                self.run_turn(message, history, auth, cancel, &mut scratch).await
            }
        }
    }

    async fn run_turn(
        &self,
        message: &str,
        history: &[HistoryMessage],
        auth: &AuthContext,
        cancel: &CancellationToken,
        session: &mut SessionState,
    ) -> Result<TurnReply<S>, TurnError> {
        let step = (self.resolve_step)(session);
        session.set_current_step(step);
        tracing::info!(
            step = %step,
            room_id = auth.room_id.as_deref().unwrap_or("-"),
            sender = %auth.sender_id,
            "Handling message"
        );

        let handler = self.registry.get(step).ok_or_else(|| {
            tracing::error!(step = %step, "No handler registered for current step");
            TurnError::UnknownStep {
                step: step.to_string(),
            }
        })?;

        let scope = TurnScope {
            auth,
            registry: &self.registry,
            cancel,
        };
        let turn = self.machine.process(handler, step, message, history, session, &scope);
        let response = match self.config.handler_timeout {
            Some(after) => tokio::time::timeout(after, turn)
                .await
                .map_err(|_| EngineError::Timeout { after })??,
            None => turn.await?,
        };

        let final_step = session.current_step().unwrap_or(step);
        match response.status {
            StepStatus::Cancel => {
                tracing::info!(step = %final_step, "Workflow cancelled, clearing session");
                session.clear();
            }
            StepStatus::Complete => {
                tracing::info!(step = %final_step, "Workflow completed, clearing session");
                session.clear();
            }
            _ => {}
        }

        let Some(text) = response.user_message.filter(|t| !t.trim().is_empty()) else {
            tracing::error!(step = %final_step, status = %response.status, "Empty reply from workflow");
            return Err(TurnError::EmptyResponse {
                step: final_step.to_string(),
            });
        };

        let text = if self.config.debug_context {
            format!("{text}\n\n```\n{}\n```", session.debug_summary())
        } else {
            text
        };

        Ok(TurnReply {
            text,
            status: response.status,
            step: final_step,
        })
    }
}
