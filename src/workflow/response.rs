//! Structured outcome of a step handler

use super::period::ReservationPeriod;
use super::step::WorkflowStep;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// What a handler wants the engine to do next.
///
/// The next step only exists on [`StepStatus::Switch`], so a switch without
/// a target cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus<S> {
    /// Reply without changing step
    Answer,
    /// Reply and wait for the user's answer on this step
    Ask,
    /// Move to `next` within the same turn, no user input needed
    Switch { next: S },
    /// The user aborted the workflow
    Cancel,
    /// Terminal success
    Complete,
    /// The handler could not proceed; the workflow restarts
    Error,
    /// Run the same handler again
    Retry,
}

impl<S: WorkflowStep> StepStatus<S> {
    /// Protocol label, e.g. `SWITCH_STEP`
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Answer => "ANSWER_USER",
            StepStatus::Ask => "ASK_USER",
            StepStatus::Switch { .. } => "SWITCH_STEP",
            StepStatus::Cancel => "CANCEL",
            StepStatus::Complete => "COMPLETED",
            StepStatus::Error => "ERROR",
            StepStatus::Retry => "RETRY",
        }
    }

    pub fn next_step(&self) -> Option<S> {
        match self {
            StepStatus::Switch { next } => Some(*next),
            _ => None,
        }
    }
}

impl<S: WorkflowStep> fmt::Display for StepStatus<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Switch { next } => write!(f, "{} -> {next}", self.label()),
            _ => f.write_str(self.label()),
        }
    }
}

/// Business fields collected by a handler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepPayload {
    /// Identifier of the chosen item (e.g. a reservable space)
    pub item_id: Option<String>,
    pub period: Option<ReservationPeriod>,
    pub locale: Option<String>,
    /// Workflow-specific extras (e.g. the list of spaces offered)
    pub extra: HashMap<String, Value>,
}

impl StepPayload {
    pub fn has_item_id(&self) -> bool {
        self.item_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }

    pub fn has_complete_period(&self) -> bool {
        self.period.as_ref().is_some_and(ReservationPeriod::is_complete)
    }

    pub fn is_empty(&self) -> bool {
        self.item_id.is_none() && self.period.is_none() && self.locale.is_none() && self.extra.is_empty()
    }
}

/// Response produced by a step handler
#[derive(Debug, Clone, PartialEq)]
pub struct StepResponse<S> {
    pub status: StepStatus<S>,
    /// Text shown to the end user
    pub user_message: Option<String>,
    /// Context for the next handler; never shown to the end user
    pub internal_message: Option<String>,
    pub payload: StepPayload,
}

impl<S: WorkflowStep> StepResponse<S> {
    pub fn new(status: StepStatus<S>) -> Self {
        Self {
            status,
            user_message: None,
            internal_message: None,
            payload: StepPayload::default(),
        }
    }

    pub fn answer(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Answer).with_user_message(message)
    }

    pub fn ask(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Ask).with_user_message(message)
    }

    pub fn switch_to(next: S) -> Self {
        Self::new(StepStatus::Switch { next })
    }

    pub fn cancel(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Cancel).with_user_message(message)
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Complete).with_user_message(message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Error).with_user_message(message)
    }

    pub fn retry() -> Self {
        Self::new(StepStatus::Retry)
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }

    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    pub fn with_item_id(mut self, item_id: impl Into<String>) -> Self {
        self.payload.item_id = Some(item_id.into());
        self
    }

    pub fn with_period(mut self, period: ReservationPeriod) -> Self {
        self.payload.period = Some(period);
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.payload.locale = Some(locale.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.extra.insert(key.into(), value);
        self
    }

    pub fn next_step(&self) -> Option<S> {
        self.status.next_step()
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, StepStatus::Error)
    }
}
