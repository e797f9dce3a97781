//! Turn orchestration
//!
//! One call to [`StateMachine::process`] runs one user turn to completion:
//! the current handler, then any chain of automatic `SWITCH`/`RETRY`
//! continuations, ending in exactly one response for the caller.

use super::auth::AuthContext;
use super::context::TransitionContext;
use super::error::{EngineError, EngineFault};
use super::handler::{HandlerRegistry, HistoryMessage, StepHandler, StepInput};
use super::observer::ObserverSet;
use super::response::{StepResponse, StepStatus};
use super::session::SessionState;
use super::step::WorkflowStep;
use super::validator::TransitionValidator;
use futures::future::{BoxFuture, FutureExt};
use std::borrow::Cow;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Automatic continuations (SWITCH or RETRY) allowed in a single turn
pub const MAX_SWITCH_ITERATIONS: u32 = 10;

/// Reply used whenever the engine resolves a failure on its own
pub const DEFAULT_FALLBACK_MESSAGE: &str = "An error occurred while processing your request.";

/// Per-turn collaborators that stay fixed across the whole automatic chain
pub struct TurnScope<'a, S: WorkflowStep> {
    pub auth: &'a AuthContext,
    pub registry: &'a HandlerRegistry<S>,
    pub cancel: &'a CancellationToken,
}

pub struct StateMachine<S: WorkflowStep> {
    validator: Arc<TransitionValidator<S>>,
    observers: ObserverSet<S>,
    fallback_message: String,
}

impl<S: WorkflowStep> StateMachine<S> {
    pub fn new(validator: Arc<TransitionValidator<S>>, observers: ObserverSet<S>) -> Self {
        Self {
            validator,
            observers,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }

    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn validator(&self) -> &TransitionValidator<S> {
        &self.validator
    }

    pub fn observers(&self) -> &ObserverSet<S> {
        &self.observers
    }

    /// Run `handler` for `step` and every automatic continuation it triggers.
    ///
    /// Rejected transitions, missing handlers and runaway chains resolve to
    /// the generic error response. Handler failures and cancellation are
    /// returned as [`EngineError`] so the caller can pick the fallback.
    ///
    /// Callers must not run two turns for the same session concurrently.
    pub async fn process(
        &self,
        handler: Arc<dyn StepHandler<S>>,
        step: S,
        message: &str,
        history: &[HistoryMessage],
        session: &mut SessionState,
        scope: &TurnScope<'_, S>,
    ) -> Result<StepResponse<S>, EngineError> {
        self.advance(
            handler,
            step,
            message.to_string(),
            Cow::Borrowed(history),
            session,
            scope,
            0,
        )
        .await
    }

    /// Generic reply that never reveals why the turn failed
    pub fn fallback_response(&self) -> StepResponse<S> {
        StepResponse::error(self.fallback_message.clone())
    }

    #[allow(clippy::too_many_arguments)]
    fn advance<'a>(
        &'a self,
        handler: Arc<dyn StepHandler<S>>,
        step: S,
        message: String,
        history: Cow<'a, [HistoryMessage]>,
        session: &'a mut SessionState,
        scope: &'a TurnScope<'a, S>,
        iteration: u32,
    ) -> BoxFuture<'a, Result<StepResponse<S>, EngineError>> {
        async move {
            if iteration >= MAX_SWITCH_ITERATIONS {
                tracing::error!(
                    step = %step,
                    iteration,
                    limit = MAX_SWITCH_ITERATIONS,
                    "Automatic transition loop exceeded its limit, stopping"
                );
                let fault = EngineFault::IterationLimitExceeded {
                    limit: MAX_SWITCH_ITERATIONS,
                };
                self.observers.error(step, &fault, None);
                return Ok(self.fallback_response());
            }

            self.observers.step_entered(step, None);

            let response = match self
                .invoke(handler.as_ref(), step, &message, &history, session, scope)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(step = %step, error = %e, "Step handler failed");
                    self.observers.error(step, &e, None);
                    return Err(e);
                }
            };

            tracing::debug!(step = %step, status = %response.status, iteration, "Step handler responded");

            match response.status {
                StepStatus::Answer | StepStatus::Cancel | StepStatus::Complete => Ok(response),
                StepStatus::Ask => {
                    session.mark_awaiting_input(step);
                    Ok(response)
                }
                StepStatus::Error => {
                    tracing::warn!(step = %step, "Handler reported an error, resetting workflow");
                    session.set_current_step(S::initial());
                    Ok(self.fallback_response())
                }
                StepStatus::Retry => {
                    tracing::info!(step = %step, iteration, "Retrying step");
                    let history = match response.internal_message {
                        Some(note) => {
                            let mut enriched = history.into_owned();
                            enriched.push(HistoryMessage::system(note));
                            Cow::Owned(enriched)
                        }
                        None => history,
                    };
                    self.advance(handler, step, message, history, session, scope, iteration + 1)
                        .await
                }
                StepStatus::Switch { next } => {
                    self.switch_step(step, next, response, message, history, session, scope, iteration)
                        .await
                }
            }
        }
        .boxed()
    }

    /// Call the handler, racing it against the caller's cancellation
    async fn invoke(
        &self,
        handler: &dyn StepHandler<S>,
        step: S,
        message: &str,
        history: &[HistoryMessage],
        session: &mut SessionState,
        scope: &TurnScope<'_, S>,
    ) -> Result<StepResponse<S>, EngineError> {
        let input = StepInput {
            message,
            history,
            cancel: scope.cancel,
        };
        tracing::debug!(
            step = %step,
            backend_only = handler.is_backend_only(),
            "Invoking step handler"
        );
        tokio::select! {
            biased;
            () = scope.cancel.cancelled() => Err(EngineError::Cancelled {
                step: step.to_string(),
            }),
            result = handler.handle(input, session, scope.auth) => {
                result.map_err(|source| EngineError::Handler {
                    step: step.to_string(),
                    source,
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn switch_step<'a>(
        &'a self,
        from: S,
        to: S,
        response: StepResponse<S>,
        message: String,
        history: Cow<'a, [HistoryMessage]>,
        session: &'a mut SessionState,
        scope: &'a TurnScope<'a, S>,
        iteration: u32,
    ) -> Result<StepResponse<S>, EngineError> {
        let next_iteration = iteration + 1;
        let mut context =
            TransitionContext::for_switch(from, to, response.clone(), format!("SWITCH_STEP from {from}"));
        context.accumulate_from_session(session);
        context.set_iteration(next_iteration);

        let validation = self.validator.validate(from, to, Some(&response), Some(&context));
        if !validation.is_valid() {
            tracing::warn!(
                from = %from,
                to = %to,
                code = ?validation.error_code(),
                "Transition validation failed"
            );
            self.observers.transition_rejected(&context, &validation);
            return Ok(self.fallback_response());
        }
        context.set_validation_result(validation);

        self.observers.transition_starting(&context);

        session.set_current_step(to);
        session.store_payload(&response.payload);

        let Some(next_handler) = scope.registry.get(to) else {
            tracing::error!(step = %to, "No handler registered for next step");
            let fault = EngineFault::MissingHandler {
                step: to.to_string(),
            };
            self.observers.error(to, &fault, Some(&context));
            return Ok(self.fallback_response());
        };

        let next_message = response.internal_message.unwrap_or(message);

        tracing::info!(from = %from, to = %to, iteration = next_iteration, "SWITCH_STEP");
        self.observers.switch_iteration(from, to, next_iteration);
        self.observers.step_exited(from, Some(&context));

        match self
            .advance(next_handler, to, next_message, history, session, scope, next_iteration)
            .await
        {
            Ok(final_response) => {
                self.observers.transition_completed(&context, &final_response);
                Ok(final_response)
            }
            Err(e) => {
                self.observers.transition_failed(&context, &e);
                Err(e)
            }
        }
    }
}
