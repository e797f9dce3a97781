//! Workflow step abstraction

use std::fmt;
use std::hash::Hash;

/// One position in a multi-turn workflow.
///
/// Implemented by a fieldless enum per workflow. Steps are ordered only by
/// the transition table, never by declaration order; [`WorkflowStep::all`]
/// exists so tables and diagnostics can list steps deterministically.
pub trait WorkflowStep:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Stable wire name, e.g. `CHOOSE_SPACE`. Used for session storage and
    /// the LLM protocol.
    fn name(&self) -> &'static str;

    /// Inverse of [`WorkflowStep::name`].
    fn from_name(name: &str) -> Option<Self>;

    /// Step a fresh (or reset) conversation starts from.
    fn initial() -> Self;

    /// Every step of the workflow.
    fn all() -> &'static [Self];
}

/// Position of `step` in [`WorkflowStep::all`], used for stable ordering.
pub(crate) fn ordinal<S: WorkflowStep>(step: S) -> usize {
    S::all()
        .iter()
        .position(|candidate| *candidate == step)
        .unwrap_or(usize::MAX)
}
