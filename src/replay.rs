//! Scenario replay
//!
//! Runs a scripted conversation through the reservation workflow without a
//! live model: every step is backed by an [`LlmStepHandler`] whose client
//! hands out the scenario's canned model outputs in order. Useful for
//! reproducing a conversation from logs and checking how the engine routes
//! it.
//!
//! ```json
//! {
//!   "name": "book the rooftop",
//!   "roomId": "!demo:example.org",
//!   "sender": "@alice:example.org",
//!   "user": { "id": "user-1", "displayName": "Alice" },
//!   "modelOutputs": {
//!     "REQUEST_SPACE_INFO": [{ "status": "ANSWER_USER", "response": "We have a rooftop." }]
//!   },
//!   "turns": ["What can I book?"]
//! }
//! ```

use crate::config::EngineConfig;
use crate::llm::{CompletionClient, CompletionRequest, LlmError, LlmStepHandler, LoggingClient};
use crate::reservation::{self, ReservationStep};
use crate::runtime::{SessionStore, WorkflowRuntime};
use crate::workflow::{
    AuthContext, HandlerRegistry, HistoryMessage, LoggingObserver, ObserverSet, ResidentUser,
    SessionState, StepHandler, WorkflowStep,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Scenario scripts unknown step {0}")]
    UnknownStep(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioUser {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_room")]
    pub room_id: String,
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default)]
    pub user: Option<ScenarioUser>,
    /// Model outputs per step name, consumed in order. Objects are sent as
    /// their JSON text, strings verbatim.
    #[serde(default)]
    pub model_outputs: HashMap<String, Vec<Value>>,
    pub turns: Vec<String>,
}

fn default_room() -> String {
    "!replay:localhost".to_string()
}

fn default_sender() -> String {
    "@resident:localhost".to_string()
}

impl Scenario {
    pub fn from_json(raw: &str) -> Result<Self, ReplayError> {
        let scenario: Scenario = serde_json::from_str(raw)?;
        if let Some(unknown) = scenario
            .model_outputs
            .keys()
            .find(|name| ReservationStep::from_name(name).is_none())
        {
            return Err(ReplayError::UnknownStep(unknown.clone()));
        }
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    fn auth(&self) -> AuthContext {
        let auth = AuthContext::new(self.sender.clone(), self.room_id.clone());
        match &self.user {
            Some(user) => auth.with_user(ResidentUser::new(user.id.clone(), user.display_name.clone())),
            None => auth,
        }
    }

    fn outputs_for(&self, step: ReservationStep) -> VecDeque<String> {
        self.model_outputs
            .get(step.name())
            .map(|outputs| {
                outputs
                    .iter()
                    .map(|output| match output {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Completion client that plays back canned outputs for one step
pub struct ScriptedCompletionClient {
    model_id: String,
    outputs: Mutex<VecDeque<String>>,
}

impl ScriptedCompletionClient {
    pub fn new(step: ReservationStep, outputs: VecDeque<String>) -> Self {
        Self {
            model_id: format!("replay/{}", step.name()),
            outputs: Mutex::new(outputs),
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
        self.outputs
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| LlmError::invalid_response(format!("No scripted output left for {}", self.model_id)))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Outcome of one replayed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRecord {
    pub message: String,
    pub reply: String,
    /// Protocol label of the final status, absent when the turn failed
    pub status: Option<String>,
    pub step: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub name: Option<String>,
    pub turns: Vec<TurnRecord>,
    pub final_session: SessionState,
}

fn step_instructions(step: ReservationStep) -> &'static str {
    match step {
        ReservationStep::RequestSpaceInfo => {
            "You help residents reserve shared spaces. Answer questions about the spaces and find out which one the resident wants."
        }
        ReservationStep::ChooseSpace => {
            "Identify the space and the reservation dates. Ask for whatever is still missing."
        }
        ReservationStep::ConfirmReservationSummary => {
            "Summarize the reservation and ask the resident to confirm it."
        }
        ReservationStep::CompleteReservation => "Create the confirmed reservation.",
        ReservationStep::PaymentInstructions => "Explain how to pay for the reservation.",
        ReservationStep::PaymentConfirmed => "Confirm that the payment was received.",
    }
}

fn build_registry(scenario: &Scenario) -> HandlerRegistry<ReservationStep> {
    let validator = reservation::transition_validator();
    let mut registry = HandlerRegistry::new();
    for step in ReservationStep::all().iter().copied() {
        let client = LoggingClient::new(Arc::new(ScriptedCompletionClient::new(
            step,
            scenario.outputs_for(step),
        )));
        let mut handler = LlmStepHandler::new(step, client, step_instructions(step))
            .with_next_steps(validator.allowed_targets(step));
        if matches!(
            step,
            ReservationStep::CompleteReservation | ReservationStep::PaymentInstructions
        ) {
            handler = handler.requiring_user();
        }
        let handler: Arc<dyn StepHandler<ReservationStep>> = Arc::new(handler);
        registry.register(handler);
    }
    registry
}

/// Replay every turn of `scenario`. Failed turns are recorded with the
/// fallback reply and do not stop the replay.
pub async fn run_scenario(scenario: &Scenario, config: EngineConfig) -> ReplayReport {
    let runtime = WorkflowRuntime::new(
        reservation::transition_validator(),
        build_registry(scenario),
        ObserverSet::new(vec![Arc::new(LoggingObserver)]),
        Arc::new(SessionStore::new()),
        config,
    )
    .with_step_resolver(reservation::resolve_current_step);

    let auth = scenario.auth();
    let cancel = CancellationToken::new();
    let mut history: Vec<HistoryMessage> = Vec::new();
    let mut turns = Vec::with_capacity(scenario.turns.len());

    for message in &scenario.turns {
        let record = match runtime.handle_message(message, &history, &auth, &cancel).await {
            Ok(reply) => TurnRecord {
                message: message.clone(),
                reply: reply.text,
                status: Some(reply.status.label().to_string()),
                step: Some(reply.step.name().to_string()),
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, retryable = e.is_retryable(), "Replayed turn failed");
                TurnRecord {
                    message: message.clone(),
                    reply: runtime.fallback_message().to_string(),
                    status: None,
                    step: None,
                    error: Some(e.to_string()),
                }
            }
        };
        history.push(HistoryMessage::user(message.clone()));
        history.push(HistoryMessage::assistant(record.reply.clone()));
        turns.push(record);
    }

    let final_session = match runtime.store().get(&scenario.room_id).await {
        Some(handle) => handle.lock().await.state.clone(),
        None => SessionState::new(),
    };

    ReplayReport {
        name: scenario.name.clone(),
        turns,
        final_session,
    }
}
