//! Lifecycle observers
//!
//! Observers see every step and transition of a turn, in the order the
//! engine produces them. They cannot influence control flow: a callback
//! that returns an error or panics is logged and skipped, and the remaining
//! observers are still notified.

use super::context::{TransitionContext, ValidationResult};
use super::error::{EngineError, ObserverError};
use super::response::StepResponse;
use super::step::WorkflowStep;
use std::any::Any;
use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

pub type ObserverResult = Result<(), ObserverError>;

/// Receives state machine lifecycle events. Every callback is a no-op by
/// default.
pub trait StateMachineObserver<S: WorkflowStep>: Send + Sync {
    /// A validated transition is about to be applied
    fn on_transition_starting(&self, _context: &TransitionContext<S>) -> ObserverResult {
        Ok(())
    }

    /// The continuation of a transition returned `response`
    fn on_transition_completed(
        &self,
        _context: &TransitionContext<S>,
        _response: &StepResponse<S>,
    ) -> ObserverResult {
        Ok(())
    }

    /// The continuation of a transition failed with `error`
    fn on_transition_failed(&self, _context: &TransitionContext<S>, _error: &EngineError) -> ObserverResult {
        Ok(())
    }

    fn on_transition_rejected(
        &self,
        _context: &TransitionContext<S>,
        _result: &ValidationResult,
    ) -> ObserverResult {
        Ok(())
    }

    fn on_step_entered(&self, _step: S, _context: Option<&TransitionContext<S>>) -> ObserverResult {
        Ok(())
    }

    fn on_step_exited(&self, _step: S, _context: Option<&TransitionContext<S>>) -> ObserverResult {
        Ok(())
    }

    fn on_switch_iteration(&self, _from: S, _to: S, _iteration: u32) -> ObserverResult {
        Ok(())
    }

    fn on_error(
        &self,
        _step: S,
        _error: &(dyn StdError + Send + Sync),
        _context: Option<&TransitionContext<S>>,
    ) -> ObserverResult {
        Ok(())
    }
}

/// Fixed, ordered list of observers with per-callback isolation
pub struct ObserverSet<S: WorkflowStep> {
    observers: Vec<Arc<dyn StateMachineObserver<S>>>,
}

impl<S: WorkflowStep> ObserverSet<S> {
    pub fn new(observers: Vec<Arc<dyn StateMachineObserver<S>>>) -> Self {
        Self { observers }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn transition_starting(&self, context: &TransitionContext<S>) {
        self.each("on_transition_starting", |o| o.on_transition_starting(context));
    }

    pub fn transition_completed(&self, context: &TransitionContext<S>, response: &StepResponse<S>) {
        self.each("on_transition_completed", |o| {
            o.on_transition_completed(context, response)
        });
    }

    pub fn transition_failed(&self, context: &TransitionContext<S>, error: &EngineError) {
        self.each("on_transition_failed", |o| o.on_transition_failed(context, error));
    }

    pub fn transition_rejected(&self, context: &TransitionContext<S>, result: &ValidationResult) {
        self.each("on_transition_rejected", |o| {
            o.on_transition_rejected(context, result)
        });
    }

    pub fn step_entered(&self, step: S, context: Option<&TransitionContext<S>>) {
        self.each("on_step_entered", |o| o.on_step_entered(step, context));
    }

    pub fn step_exited(&self, step: S, context: Option<&TransitionContext<S>>) {
        self.each("on_step_exited", |o| o.on_step_exited(step, context));
    }

    pub fn switch_iteration(&self, from: S, to: S, iteration: u32) {
        self.each("on_switch_iteration", |o| o.on_switch_iteration(from, to, iteration));
    }

    pub fn error(
        &self,
        step: S,
        error: &(dyn StdError + Send + Sync),
        context: Option<&TransitionContext<S>>,
    ) {
        self.each("on_error", |o| o.on_error(step, error, context));
    }

    fn each<F>(&self, callback: &'static str, notify: F)
    where
        F: Fn(&dyn StateMachineObserver<S>) -> ObserverResult,
    {
        for (index, observer) in self.observers.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| notify(observer.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(callback, observer = index, error = %e, "Observer callback failed");
                }
                Err(payload) => {
                    tracing::warn!(
                        callback,
                        observer = index,
                        panic = %panic_message(payload.as_ref()),
                        "Observer callback panicked"
                    );
                }
            }
        }
    }
}

impl<S: WorkflowStep> Default for ObserverSet<S> {
    fn default() -> Self {
        Self::empty()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Writes a human-readable transition trace through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl<S: WorkflowStep> StateMachineObserver<S> for LoggingObserver {
    fn on_transition_starting(&self, context: &TransitionContext<S>) -> ObserverResult {
        tracing::info!(
            from = %context.from,
            to = %context.to,
            reason = %context.reason,
            "Transition starting"
        );
        Ok(())
    }

    fn on_transition_completed(
        &self,
        context: &TransitionContext<S>,
        response: &StepResponse<S>,
    ) -> ObserverResult {
        tracing::info!(
            from = %context.from,
            to = %context.to,
            status = %response.status,
            "Transition completed"
        );
        Ok(())
    }

    fn on_transition_failed(&self, context: &TransitionContext<S>, error: &EngineError) -> ObserverResult {
        tracing::error!(from = %context.from, to = %context.to, error = %error, "Transition failed");
        Ok(())
    }

    fn on_transition_rejected(
        &self,
        context: &TransitionContext<S>,
        result: &ValidationResult,
    ) -> ObserverResult {
        tracing::warn!(
            from = %context.from,
            to = %context.to,
            code = ?result.error_code(),
            reason = result.error_message().unwrap_or_default(),
            "Transition rejected"
        );
        Ok(())
    }

    fn on_step_entered(&self, step: S, _context: Option<&TransitionContext<S>>) -> ObserverResult {
        tracing::debug!(step = %step, "Entering step");
        Ok(())
    }

    fn on_step_exited(&self, step: S, _context: Option<&TransitionContext<S>>) -> ObserverResult {
        tracing::debug!(step = %step, "Exiting step");
        Ok(())
    }

    fn on_switch_iteration(&self, from: S, to: S, iteration: u32) -> ObserverResult {
        tracing::info!(from = %from, to = %to, iteration, "SWITCH_STEP iteration");
        Ok(())
    }

    fn on_error(
        &self,
        step: S,
        error: &(dyn StdError + Send + Sync),
        _context: Option<&TransitionContext<S>>,
    ) -> ObserverResult {
        tracing::error!(step = %step, error = %error, "Error in step");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::ReservationStep;
    use crate::workflow::testing::{FailingObserver, ObservedEvent, PanickingObserver, RecordingObserver};

    #[test]
    fn test_failing_and_panicking_observers_do_not_block_others() {
        let recorder = Arc::new(RecordingObserver::default());
        let observers: ObserverSet<ReservationStep> = ObserverSet::new(vec![
            Arc::new(FailingObserver),
            Arc::new(PanickingObserver),
            recorder.clone(),
        ]);

        observers.step_entered(ReservationStep::ChooseSpace, None);
        observers.switch_iteration(
            ReservationStep::ChooseSpace,
            ReservationStep::ConfirmReservationSummary,
            1,
        );

        assert_eq!(
            recorder.events(),
            vec![
                ObservedEvent::StepEntered(ReservationStep::ChooseSpace),
                ObservedEvent::SwitchIteration {
                    from: ReservationStep::ChooseSpace,
                    to: ReservationStep::ConfirmReservationSummary,
                    iteration: 1,
                },
            ]
        );
    }

    #[test]
    fn test_default_callbacks_are_noops() {
        struct Silent;
        impl StateMachineObserver<ReservationStep> for Silent {}

        let observers: ObserverSet<ReservationStep> = ObserverSet::new(vec![Arc::new(Silent)]);
        observers.step_exited(ReservationStep::ChooseSpace, None);
        assert_eq!(observers.len(), 1);
    }

    #[test]
    fn test_panic_message_extracts_strings() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }
}
