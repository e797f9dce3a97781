//! JSON protocol between step prompts and the engine
//!
//! An LLM-backed step answers with one JSON object:
//!
//! ```json
//! {
//!   "status": "SWITCH_STEP",
//!   "nextStep": "CONFIRM_RESERVATION_SUMMARY",
//!   "internalMessage": "space and dates collected",
//!   "response": null,
//!   "spaceId": "b1f0...",
//!   "period": { "startDate": "2025-06-01", "endDate": "2025-06-03" },
//!   "locale": "fr"
//! }
//! ```
//!
//! Models often wrap the object in a fenced code block or add a sentence
//! around it, so the outermost object is located before decoding.

use crate::workflow::{ReservationPeriod, StepPayload, StepResponse, StepStatus, WorkflowStep};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Extra payload key holding the spaces a step offered to the user
pub const AVAILABLE_SPACES: &str = "availableSpaces";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("No JSON object found in model output")]
    MissingObject,
    #[error("Malformed step response: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStepResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    internal_message: Option<String>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default, alias = "spaceId", skip_serializing_if = "Option::is_none")]
    item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    period: Option<ReservationPeriod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    available_spaces: Option<Value>,
}

/// Decode model output into a [`StepResponse`].
///
/// A missing or unknown status is read as `ASK_USER` so the text still
/// reaches the user. `SWITCH_STEP` without a known `nextStep` becomes
/// `ERROR`.
pub fn parse_step_response<S: WorkflowStep>(raw: &str) -> Result<StepResponse<S>, ProtocolError> {
    let object = extract_object(raw).ok_or(ProtocolError::MissingObject)?;
    let wire: WireStepResponse = serde_json::from_str(object)?;

    let status = match wire.status.as_deref().map(str::trim) {
        Some("ANSWER_USER") => StepStatus::Answer,
        Some("ASK_USER") => StepStatus::Ask,
        Some("CANCEL") => StepStatus::Cancel,
        Some("COMPLETED") => StepStatus::Complete,
        Some("ERROR") => StepStatus::Error,
        Some("RETRY") => StepStatus::Retry,
        Some("SWITCH_STEP") => match wire.next_step.as_deref().and_then(S::from_name) {
            Some(next) => StepStatus::Switch { next },
            None => {
                tracing::warn!(next_step = ?wire.next_step, "SWITCH_STEP without a known nextStep");
                StepStatus::Error
            }
        },
        other => {
            tracing::warn!(status = ?other, "Unknown step status, treating as ASK_USER");
            StepStatus::Ask
        }
    };

    let mut payload = StepPayload {
        item_id: wire.item_id.filter(|id| !id.trim().is_empty()),
        period: wire.period.filter(|p| *p != ReservationPeriod::default()),
        locale: wire.locale.filter(|l| !l.trim().is_empty()),
        ..StepPayload::default()
    };
    if let Some(spaces) = wire.available_spaces.filter(|v| !v.is_null()) {
        payload.extra.insert(AVAILABLE_SPACES.to_string(), spaces);
    }

    Ok(StepResponse {
        status,
        user_message: wire.response.filter(|r| !r.trim().is_empty()),
        internal_message: wire.internal_message.filter(|m| !m.trim().is_empty()),
        payload,
    })
}

/// Encode a response in the same shape [`parse_step_response`] reads
pub fn render_step_response<S: WorkflowStep>(response: &StepResponse<S>) -> Result<String, ProtocolError> {
    let wire = WireStepResponse {
        status: Some(response.status.label().to_string()),
        next_step: response.next_step().map(|s| s.name().to_string()),
        internal_message: response.internal_message.clone(),
        response: response.user_message.clone(),
        item_id: response.payload.item_id.clone(),
        period: response.payload.period.clone(),
        locale: response.payload.locale.clone(),
        available_spaces: response.payload.extra.get(AVAILABLE_SPACES).cloned(),
    };
    Ok(serde_json::to_string(&wire)?)
}

/// First balanced `{ ... }` object of `raw`, ignoring fences and
/// surrounding prose. Braces inside JSON strings do not count.
fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in raw.get(start..)?.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return raw.get(start..=start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::ReservationStep;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn test_parses_switch_with_payload() {
        let raw = r#"{
            "status": "SWITCH_STEP",
            "nextStep": "CONFIRM_RESERVATION_SUMMARY",
            "internalMessage": "space and dates collected",
            "response": null,
            "spaceId": "space-42",
            "period": {"startDate": "2025-06-01", "endDate": "2025-06-03", "startTime": "09:00", "endTime": ""},
            "locale": "fr"
        }"#;

        let response: StepResponse<ReservationStep> = parse_step_response(raw).unwrap();

        assert_eq!(
            response.status,
            StepStatus::Switch {
                next: ReservationStep::ConfirmReservationSummary
            }
        );
        assert_eq!(response.internal_message.as_deref(), Some("space and dates collected"));
        assert_eq!(response.user_message, None);
        assert_eq!(response.payload.item_id.as_deref(), Some("space-42"));
        let period = response.payload.period.unwrap();
        assert_eq!(period.start_date, NaiveDate::from_ymd_opt(2025, 6, 1));
        assert_eq!(period.start_time, NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(period.end_time, None);
        assert_eq!(response.payload.locale.as_deref(), Some("fr"));
    }

    #[test]
    fn test_tolerates_fences_and_prose() {
        let raw = "Here is my answer:\n```json\n{\"status\": \"ASK_USER\", \"response\": \"Which dates?\"}\n```\n";
        let response: StepResponse<ReservationStep> = parse_step_response(raw).unwrap();
        assert_eq!(response, StepResponse::ask("Which dates?"));
    }

    #[test]
    fn test_ignores_braces_in_trailing_prose_and_strings() {
        let raw = "```json\n{\"status\": \"ASK_USER\", \"response\": \"Use {dates} like \\\"June 1\\\"?\"}\n```\nNote: I left {placeholders} out.";
        let response: StepResponse<ReservationStep> = parse_step_response(raw).unwrap();
        assert_eq!(response, StepResponse::ask("Use {dates} like \"June 1\"?"));

        assert!(matches!(
            parse_step_response::<ReservationStep>(r#"{"status": "ASK_USER""#),
            Err(ProtocolError::MissingObject)
        ));
    }

    #[test]
    fn test_unknown_status_reads_as_ask() {
        let raw = r#"{"status": "THINKING", "response": "Hmm?"}"#;
        let response: StepResponse<ReservationStep> = parse_step_response(raw).unwrap();
        assert_eq!(response.status, StepStatus::Ask);

        let raw = r#"{"response": "No status at all"}"#;
        let response: StepResponse<ReservationStep> = parse_step_response(raw).unwrap();
        assert_eq!(response.status, StepStatus::Ask);
    }

    #[test]
    fn test_switch_without_known_target_is_error() {
        for raw in [
            r#"{"status": "SWITCH_STEP"}"#,
            r#"{"status": "SWITCH_STEP", "nextStep": "TELEPORT"}"#,
        ] {
            let response: StepResponse<ReservationStep> = parse_step_response(raw).unwrap();
            assert_eq!(response.status, StepStatus::Error, "{raw}");
        }
    }

    #[test]
    fn test_available_spaces_are_kept_in_extra() {
        let raw = r#"{"status": "ASK_USER", "response": "Pick one", "availableSpaces": [{"id": "a"}, {"id": "b"}]}"#;
        let response: StepResponse<ReservationStep> = parse_step_response(raw).unwrap();
        assert_eq!(
            response.payload.extra.get(AVAILABLE_SPACES),
            Some(&serde_json::json!([{"id": "a"}, {"id": "b"}]))
        );
    }

    #[test]
    fn test_rejects_missing_or_malformed_object() {
        assert!(matches!(
            parse_step_response::<ReservationStep>("I could not decide."),
            Err(ProtocolError::MissingObject)
        ));
        assert!(matches!(
            parse_step_response::<ReservationStep>(r#"{"status": "ASK_USER", }"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            parse_step_response::<ReservationStep>(r#"{"period": {"startDate": "next week"}}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_render_uses_wire_labels() {
        let response = StepResponse::switch_to(ReservationStep::CompleteReservation)
            .with_item_id("space-1")
            .with_internal_message("confirmed");
        let json: Value = serde_json::from_str(&render_step_response(&response).unwrap()).unwrap();

        assert_eq!(json["status"], "SWITCH_STEP");
        assert_eq!(json["nextStep"], "COMPLETE_RESERVATION");
        assert_eq!(json["itemId"], "space-1");
        assert_eq!(json["internalMessage"], "confirmed");
    }
}
