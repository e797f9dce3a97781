//! convoflow - conversational workflow engine
//!
//! Drives multi-turn, LLM-mediated dialogues through a bounded sequence of
//! well-defined steps. Step handlers decide what happens next; the engine
//! validates transitions, chains automatic steps, keeps the conversation's
//! session state current and reports every transition to observers.

pub mod config;
pub mod llm;
pub mod logging;
pub mod protocol;
pub mod replay;
pub mod reservation;
pub mod runtime;
pub mod workflow;

pub use config::{ConfigWarning, EngineConfig, LogFormat};
pub use workflow::{
    AuthContext, EngineError, HandlerError, HandlerErrorKind, HandlerRegistry, HistoryMessage,
    LoggingObserver, ObserverSet, Role, SessionState, StateMachine, StateMachineObserver,
    StepHandler, StepInput, StepPayload, StepResponse, StepStatus, TransitionContext,
    TransitionValidator, TurnScope, ValidationResult, WorkflowStep,
};
