//! Transition legality and required-data rules
//!
//! Both tables are plain data, built once per workflow and shared read-only
//! by every turn.

use super::context::{ErrorCode, TransitionContext, ValidationResult};
use super::response::StepResponse;
use super::step::{ordinal, WorkflowStep};
use std::collections::{HashMap, HashSet};

/// Data a target step needs before it may be entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// The identifying item (e.g. a space id)
    ItemId,
    /// Both dates of the reservation period
    CompletePeriod,
}

#[derive(Debug, Clone)]
pub struct TransitionValidator<S: WorkflowStep> {
    allowed: HashMap<S, HashSet<S>>,
    requirements: HashMap<S, Vec<Requirement>>,
}

impl<S: WorkflowStep> TransitionValidator<S> {
    pub fn builder() -> TransitionValidatorBuilder<S> {
        TransitionValidatorBuilder {
            allowed: HashMap::new(),
            requirements: HashMap::new(),
        }
    }

    /// Check that `from -> to` is a listed edge and that `to` has its
    /// required data, looking at both `response` and data already
    /// accumulated in `context`.
    pub fn validate(
        &self,
        from: S,
        to: S,
        response: Option<&StepResponse<S>>,
        context: Option<&TransitionContext<S>>,
    ) -> ValidationResult {
        if !self.is_transition_allowed(from, to) {
            let message = format!(
                "Transition from {from} to {to} is not allowed. Allowed targets: {}",
                render_steps(&self.allowed_targets(from))
            );
            tracing::warn!(from = %from, to = %to, "Invalid transition");
            return ValidationResult::invalid(ErrorCode::InvalidTransition, message);
        }

        for requirement in self.requirements_for(to) {
            let satisfied = match requirement {
                Requirement::ItemId => {
                    response.is_some_and(|r| r.payload.has_item_id())
                        || context.is_some_and(TransitionContext::has_item_id)
                }
                Requirement::CompletePeriod => {
                    response.is_some_and(|r| r.payload.has_complete_period())
                        || context.is_some_and(TransitionContext::has_period)
                }
            };
            if !satisfied {
                let (code, field) = match requirement {
                    Requirement::ItemId => (ErrorCode::MissingItemId, "item id"),
                    Requirement::CompletePeriod => (ErrorCode::MissingPeriod, "complete period"),
                };
                return ValidationResult::invalid(
                    code,
                    format!("A {field} is required to transition to {to}"),
                );
            }
        }

        ValidationResult::valid()
    }

    pub fn is_transition_allowed(&self, from: S, to: S) -> bool {
        self.allowed
            .get(&from)
            .is_some_and(|targets| targets.contains(&to))
    }

    /// Legal targets of `from`, in workflow declaration order
    pub fn allowed_targets(&self, from: S) -> Vec<S> {
        let mut targets: Vec<S> = self
            .allowed
            .get(&from)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default();
        targets.sort_by_key(|step| ordinal(*step));
        targets
    }

    pub fn requirements_for(&self, to: S) -> &[Requirement] {
        self.requirements.get(&to).map_or(&[], Vec::as_slice)
    }
}

pub struct TransitionValidatorBuilder<S: WorkflowStep> {
    allowed: HashMap<S, HashSet<S>>,
    requirements: HashMap<S, Vec<Requirement>>,
}

impl<S: WorkflowStep> TransitionValidatorBuilder<S> {
    /// Declare `from` with its legal targets. A step declared with no
    /// targets has no outgoing automatic transitions.
    pub fn allow(mut self, from: S, targets: impl IntoIterator<Item = S>) -> Self {
        self.allowed.entry(from).or_default().extend(targets);
        self
    }

    pub fn require(mut self, to: S, requirements: impl IntoIterator<Item = Requirement>) -> Self {
        let entry = self.requirements.entry(to).or_default();
        for requirement in requirements {
            if !entry.contains(&requirement) {
                entry.push(requirement);
            }
        }
        self
    }

    pub fn build(self) -> TransitionValidator<S> {
        TransitionValidator {
            allowed: self.allowed,
            requirements: self.requirements,
        }
    }
}

fn render_steps<S: WorkflowStep>(steps: &[S]) -> String {
    let names: Vec<&str> = steps.iter().map(WorkflowStep::name).collect();
    format!("[{}]", names.join(", "))
}
