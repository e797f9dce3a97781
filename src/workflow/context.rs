//! Transition attempt context and validation outcome

use super::period::ReservationPeriod;
use super::response::{StepPayload, StepResponse};
use super::session::SessionState;
use super::step::WorkflowStep;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Data keys captured from a switching response
pub mod data_keys {
    pub const ITEM_ID: &str = "itemId";
    pub const PERIOD: &str = "period";
    pub const LOCALE: &str = "locale";
    pub const INTERNAL_MESSAGE: &str = "internalMessage";
}

/// Metadata keys recorded for every attempt
pub mod metadata_keys {
    pub const ITERATION: &str = "iteration";
    pub const TIMESTAMP: &str = "timestamp";
    pub const TRANSITION_ID: &str = "transitionId";
}

/// Why a transition was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidTransition,
    MissingItemId,
    MissingPeriod,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::MissingItemId => "MISSING_ITEM_ID",
            ErrorCode::MissingPeriod => "MISSING_PERIOD",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    valid: bool,
    error_code: Option<ErrorCode>,
    error_message: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            error_code: None,
            error_message: None,
        }
    }

    pub fn invalid(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error_code: Some(code),
            error_message: Some(message.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

/// Everything known about one `from -> to` attempt.
///
/// Built fresh for each attempt and owned by the turn that made it.
#[derive(Debug, Clone)]
pub struct TransitionContext<S> {
    pub from: S,
    pub to: S,
    /// Free-text audit reason
    pub reason: String,
    pub previous_response: Option<StepResponse<S>>,
    data: HashMap<String, Value>,
    metadata: HashMap<String, Value>,
    validation_result: Option<ValidationResult>,
}

impl<S: WorkflowStep> TransitionContext<S> {
    pub fn new(from: S, to: S, reason: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(
            metadata_keys::TIMESTAMP.to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        metadata.insert(
            metadata_keys::TRANSITION_ID.to_string(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
        Self {
            from,
            to,
            reason: reason.into(),
            previous_response: None,
            data: HashMap::new(),
            metadata,
            validation_result: None,
        }
    }

    /// Context for an automatic transition requested by `previous`
    pub fn for_switch(from: S, to: S, previous: StepResponse<S>, reason: impl Into<String>) -> Self {
        let mut context = Self::new(from, to, reason);
        context.capture_payload(&previous.payload);
        if let Some(message) = &previous.internal_message {
            context.insert_data(data_keys::INTERNAL_MESSAGE, message.clone());
        }
        context.previous_response = Some(previous);
        context
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_data(key, value);
        self
    }

    pub fn insert_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Position of this attempt in the turn's automatic chain
    pub fn iteration(&self) -> Option<u32> {
        self.metadata
            .get(metadata_keys::ITERATION)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.metadata
            .insert(metadata_keys::ITERATION.to_string(), Value::from(iteration));
    }

    pub fn validation_result(&self) -> Option<&ValidationResult> {
        self.validation_result.as_ref()
    }

    pub fn set_validation_result(&mut self, result: ValidationResult) {
        self.validation_result = Some(result);
    }

    /// Record the identifying item, complete period and locale of `payload`
    pub fn capture_payload(&mut self, payload: &StepPayload) {
        if payload.has_item_id() {
            if let Some(item_id) = &payload.item_id {
                self.insert_data(data_keys::ITEM_ID, item_id.clone());
            }
        }
        if let Some(period) = payload.period.as_ref().filter(|p| p.is_complete()) {
            self.insert_period(period);
        }
        if let Some(locale) = &payload.locale {
            self.insert_data(data_keys::LOCALE, locale.clone());
        }
    }

    /// Fill in item and period collected by earlier transitions or turns,
    /// without overriding what the current response provided.
    pub fn accumulate_from_session(&mut self, session: &SessionState) {
        if !self.data.contains_key(data_keys::ITEM_ID) {
            if let Some(item_id) = session.item_id() {
                self.insert_data(data_keys::ITEM_ID, item_id.to_string());
            }
        }
        if !self.data.contains_key(data_keys::PERIOD) {
            if let Some(period) = session.period().filter(ReservationPeriod::is_complete) {
                self.insert_period(&period);
            }
        }
    }

    pub fn has_item_id(&self) -> bool {
        self.data_str(data_keys::ITEM_ID)
            .is_some_and(|id| !id.trim().is_empty())
    }

    pub fn has_period(&self) -> bool {
        self.data.get(data_keys::PERIOD).is_some_and(|v| !v.is_null())
    }

    fn insert_period(&mut self, period: &ReservationPeriod) {
        if let Ok(value) = serde_json::to_value(period) {
            self.insert_data(data_keys::PERIOD, value);
        }
    }
}
