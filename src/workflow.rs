//! Step-transition engine
//!
//! A workflow is a closed set of steps, one handler per step, and a table of
//! legal step-to-step edges. The [`StateMachine`] runs one conversational
//! turn: it calls the handler for the current step, interprets the status it
//! returns, chains automatic `SWITCH` transitions after validating them, and
//! fans lifecycle events out to observers.
//!
//! The engine does no locking of its own. At most one turn may run per
//! conversation at a time; [`crate::runtime::SessionStore`] enforces that.

mod auth;
mod context;
mod error;
mod handler;
mod machine;
mod observer;
mod period;
mod response;
mod session;
mod step;
mod validator;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;

pub use auth::{AuthContext, ResidentUser};
pub use context::{data_keys, metadata_keys, ErrorCode, TransitionContext, ValidationResult};
pub use error::{EngineError, EngineFault, HandlerError, HandlerErrorKind, ObserverError};
pub use handler::{HandlerRegistry, HistoryMessage, Role, StepHandler, StepInput};
pub use machine::{StateMachine, TurnScope, DEFAULT_FALLBACK_MESSAGE, MAX_SWITCH_ITERATIONS};
pub use observer::{LoggingObserver, ObserverResult, ObserverSet, StateMachineObserver};
pub use period::ReservationPeriod;
pub use response::{StepPayload, StepResponse, StepStatus};
pub use session::{keys, SessionState};
pub use step::WorkflowStep;
pub use validator::{Requirement, TransitionValidator, TransitionValidatorBuilder};
