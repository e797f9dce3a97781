//! Mock implementations for testing
//!
//! These mocks let the engine, runtime and replay be tested without an LLM.

use super::auth::AuthContext;
use super::context::{ErrorCode, TransitionContext, ValidationResult};
use super::error::{EngineError, HandlerError, ObserverError};
use super::handler::{StepHandler, StepInput};
use super::observer::{ObserverResult, StateMachineObserver};
use super::response::StepResponse;
use super::session::SessionState;
use super::step::WorkflowStep;
use crate::llm::{CompletionClient, CompletionRequest, LlmError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::error::Error as StdError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Scripted step handler
// ============================================================================

/// Calls seen by a [`ScriptedHandler`], shared so tests can inspect them
/// after the handler moved into a registry
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<(String, usize)>>,
}

impl CallLog {
    pub fn messages(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn history_lens(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(|(_, n)| *n).collect()
    }
}

/// Step handler that replays queued outcomes in order
pub struct ScriptedHandler<S: WorkflowStep> {
    step: S,
    outcomes: Mutex<VecDeque<Result<StepResponse<S>, HandlerError>>>,
    /// Returned once the queue is exhausted
    fallback: Option<StepResponse<S>>,
    calls: Arc<CallLog>,
}

impl<S: WorkflowStep> ScriptedHandler<S> {
    pub fn new(step: S) -> Self {
        Self {
            step,
            outcomes: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: Arc::new(CallLog::default()),
        }
    }

    pub fn respond(self, response: StepResponse<S>) -> Self {
        self.outcomes.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, error: HandlerError) -> Self {
        self.outcomes.lock().unwrap().push_back(Err(error));
        self
    }

    /// Answer with `response` forever once queued outcomes run out
    pub fn repeat(mut self, response: StepResponse<S>) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn calls(&self) -> Arc<CallLog> {
        self.calls.clone()
    }

    pub fn into_dyn(self) -> Arc<dyn StepHandler<S>> {
        Arc::new(self)
    }
}

#[async_trait]
impl<S: WorkflowStep> StepHandler<S> for ScriptedHandler<S> {
    async fn handle(
        &self,
        input: StepInput<'_>,
        _session: &mut SessionState,
        _auth: &AuthContext,
    ) -> Result<StepResponse<S>, HandlerError> {
        self.calls
            .calls
            .lock()
            .unwrap()
            .push((input.message.to_string(), input.history.len()));
        let next = self.outcomes.lock().unwrap().pop_front();
        match next {
            Some(outcome) => outcome,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| HandlerError::unknown("No scripted response queued")),
        }
    }

    fn step(&self) -> S {
        self.step
    }
}

/// Handler that sleeps before answering, for cancellation and timeout tests
pub struct SlowHandler<S: WorkflowStep> {
    step: S,
    delay: Duration,
}

impl<S: WorkflowStep> SlowHandler<S> {
    pub fn new(step: S, delay: Duration) -> Self {
        Self { step, delay }
    }
}

#[async_trait]
impl<S: WorkflowStep> StepHandler<S> for SlowHandler<S> {
    async fn handle(
        &self,
        _input: StepInput<'_>,
        _session: &mut SessionState,
        _auth: &AuthContext,
    ) -> Result<StepResponse<S>, HandlerError> {
        tokio::time::sleep(self.delay).await;
        Ok(StepResponse::answer("finally"))
    }

    fn step(&self) -> S {
        self.step
    }
}

// ============================================================================
// Observers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent<S> {
    StepEntered(S),
    StepExited(S),
    TransitionStarting { from: S, to: S },
    TransitionCompleted { from: S, to: S },
    TransitionFailed { from: S, to: S },
    TransitionRejected { from: S, to: S, code: Option<ErrorCode> },
    SwitchIteration { from: S, to: S, iteration: u32 },
    Error { step: S, message: String },
}

/// Observer that records every callback in arrival order
#[derive(Debug)]
pub struct RecordingObserver<S> {
    events: Mutex<Vec<ObservedEvent<S>>>,
}

impl<S> Default for RecordingObserver<S> {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }
}

impl<S: WorkflowStep> RecordingObserver<S> {
    pub fn events(&self) -> Vec<ObservedEvent<S>> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&ObservedEvent<S>) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }

    fn push(&self, event: ObservedEvent<S>) -> ObserverResult {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

impl<S: WorkflowStep> StateMachineObserver<S> for RecordingObserver<S> {
    fn on_transition_starting(&self, context: &TransitionContext<S>) -> ObserverResult {
        self.push(ObservedEvent::TransitionStarting {
            from: context.from,
            to: context.to,
        })
    }

    fn on_transition_completed(
        &self,
        context: &TransitionContext<S>,
        _response: &StepResponse<S>,
    ) -> ObserverResult {
        self.push(ObservedEvent::TransitionCompleted {
            from: context.from,
            to: context.to,
        })
    }

    fn on_transition_failed(&self, context: &TransitionContext<S>, _error: &EngineError) -> ObserverResult {
        self.push(ObservedEvent::TransitionFailed {
            from: context.from,
            to: context.to,
        })
    }

    fn on_transition_rejected(
        &self,
        context: &TransitionContext<S>,
        result: &ValidationResult,
    ) -> ObserverResult {
        self.push(ObservedEvent::TransitionRejected {
            from: context.from,
            to: context.to,
            code: result.error_code(),
        })
    }

    fn on_step_entered(&self, step: S, _context: Option<&TransitionContext<S>>) -> ObserverResult {
        self.push(ObservedEvent::StepEntered(step))
    }

    fn on_step_exited(&self, step: S, _context: Option<&TransitionContext<S>>) -> ObserverResult {
        self.push(ObservedEvent::StepExited(step))
    }

    fn on_switch_iteration(&self, from: S, to: S, iteration: u32) -> ObserverResult {
        self.push(ObservedEvent::SwitchIteration { from, to, iteration })
    }

    fn on_error(
        &self,
        step: S,
        error: &(dyn StdError + Send + Sync),
        _context: Option<&TransitionContext<S>>,
    ) -> ObserverResult {
        self.push(ObservedEvent::Error {
            step,
            message: error.to_string(),
        })
    }
}

/// Observer whose callbacks all return an error
pub struct FailingObserver;

impl<S: WorkflowStep> StateMachineObserver<S> for FailingObserver {
    fn on_step_entered(&self, _step: S, _context: Option<&TransitionContext<S>>) -> ObserverResult {
        Err(ObserverError::new("metrics backend unavailable"))
    }

    fn on_switch_iteration(&self, _from: S, _to: S, _iteration: u32) -> ObserverResult {
        Err(ObserverError::new("metrics backend unavailable"))
    }
}

/// Observer whose callbacks all panic
pub struct PanickingObserver;

impl<S: WorkflowStep> StateMachineObserver<S> for PanickingObserver {
    fn on_step_entered(&self, _step: S, _context: Option<&TransitionContext<S>>) -> ObserverResult {
        panic!("observer bug")
    }

    fn on_switch_iteration(&self, _from: S, _to: S, _iteration: u32) -> ObserverResult {
        panic!("observer bug")
    }
}

// ============================================================================
// Mock completion client
// ============================================================================

/// Completion client that returns queued replies
pub struct MockCompletionClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletionClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}
