//! Step handler backed by a completion client

use super::{CompletionClient, CompletionRequest, DEFAULT_MAX_TOKENS};
use crate::protocol::{self, ProtocolError};
use crate::workflow::{
    keys, AuthContext, HandlerError, HistoryMessage, SessionState, StepHandler, StepInput,
    StepResponse, WorkflowStep,
};
use async_trait::async_trait;
use std::fmt::Write as _;

/// Appended to every step prompt so the model answers in the step protocol
pub const PROTOCOL_INSTRUCTIONS: &str = r#"Answer with a single JSON object and nothing else:
{
  "status": "ANSWER_USER | ASK_USER | SWITCH_STEP | CANCEL | COMPLETED | ERROR | RETRY",
  "nextStep": "<step name, only with SWITCH_STEP>",
  "internalMessage": "<context for the next step, never shown to the user>",
  "response": "<message for the user>",
  "spaceId": "<identifier of the chosen space, if known>",
  "period": {"startDate": "YYYY-MM-DD", "endDate": "YYYY-MM-DD", "startTime": "HH:mm", "endTime": "HH:mm"},
  "locale": "<language code of the user, e.g. fr or en>"
}"#;

/// Runs one workflow step through a language model.
///
/// The prompt is the step's own instructions followed by the collected
/// session state, the user's locale, the legal next steps and the protocol
/// instructions. The model's text is decoded with
/// [`protocol::parse_step_response`].
///
/// A locale reported by the model is written to the session right away,
/// whatever the status. This is the one payload field that is not held
/// back until the engine validates a SWITCH; item and period still are.
pub struct LlmStepHandler<S: WorkflowStep, C> {
    step: S,
    client: C,
    instructions: String,
    next_steps: Vec<S>,
    requires_user: bool,
    max_tokens: u32,
}

impl<S: WorkflowStep, C: CompletionClient> LlmStepHandler<S, C> {
    pub fn new(step: S, client: C, instructions: impl Into<String>) -> Self {
        Self {
            step,
            client,
            instructions: instructions.into(),
            next_steps: Vec::new(),
            requires_user: false,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Steps the model may name in `nextStep`
    pub fn with_next_steps(mut self, steps: impl IntoIterator<Item = S>) -> Self {
        self.next_steps = steps.into_iter().collect();
        self
    }

    /// Refuse to run for senders without a resolved resident account
    pub fn requiring_user(mut self) -> Self {
        self.requires_user = true;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn system_prompt(&self, session: &SessionState, auth: &AuthContext) -> String {
        let mut prompt = self.instructions.clone();
        // Writing to a String cannot fail
        let _ = write!(prompt, "\n\n## Current step\n{}", self.step.name());
        let _ = write!(prompt, "\n\n## Collected information\n{}", session.debug_summary());
        if let Some(locale) = session.locale() {
            let _ = write!(prompt, "\n\n## Locale\nAnswer in the user's language: {locale}");
        }
        if let Some(user) = &auth.user {
            let _ = write!(prompt, "\n\n## User\n{}", user.display_name);
        }
        if !self.next_steps.is_empty() {
            let names: Vec<&str> = self.next_steps.iter().map(WorkflowStep::name).collect();
            let _ = write!(prompt, "\n\n## Allowed next steps\n{}", names.join(", "));
        }
        let _ = write!(prompt, "\n\n## Response format\n{PROTOCOL_INSTRUCTIONS}");
        prompt
    }
}

#[async_trait]
impl<S: WorkflowStep, C: CompletionClient> StepHandler<S> for LlmStepHandler<S, C> {
    async fn handle(
        &self,
        input: StepInput<'_>,
        session: &mut SessionState,
        auth: &AuthContext,
    ) -> Result<StepResponse<S>, HandlerError> {
        if self.requires_user {
            auth.authenticated_user()?;
        }

        let mut messages = input.history.to_vec();
        messages.push(HistoryMessage::user(input.message));
        let request =
            CompletionRequest::new(self.system_prompt(session, auth), messages).with_max_tokens(self.max_tokens);

        let raw = self.client.complete(&request).await?;
        let response: StepResponse<S> = protocol::parse_step_response(&raw).map_err(|e: ProtocolError| {
            tracing::warn!(step = %self.step, error = %e, "Model output does not follow the step protocol");
            HandlerError::invalid_response(e.to_string())
        })?;

        // The locale is conversation-wide, so it is kept even when the step
        // does not switch
        if let Some(locale) = response.payload.locale.as_deref() {
            if session.locale() != Some(locale) {
                session.set(keys::LOCALE, locale);
            }
        }

        Ok(response)
    }

    fn step(&self) -> S {
        self.step
    }
}
