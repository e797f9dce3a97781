//! Shared-space reservation workflow
//!
//! Six steps take a resident from "what can I book?" to a paid reservation:
//!
//! ```text
//! REQUEST_SPACE_INFO -> CHOOSE_SPACE -> CONFIRM_RESERVATION_SUMMARY
//!     -> COMPLETE_RESERVATION -> PAYMENT_INSTRUCTIONS (-> PAYMENT_CONFIRMED)
//! ```
//!
//! `PAYMENT_CONFIRMED` is reached from outside the conversation, when the
//! payment provider reports back, so it has no outgoing edges.

use crate::workflow::{keys, Requirement, SessionState, TransitionValidator, WorkflowStep};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress flags written by the steps' backend code
pub mod flags {
    pub const SUMMARY_SHOWN: &str = "summaryShown";
    pub const RESERVATION_CREATED: &str = "reservationCreated";
    pub const PAYMENT_LINK_GENERATED: &str = "paymentLinkGenerated";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStep {
    RequestSpaceInfo,
    ChooseSpace,
    ConfirmReservationSummary,
    CompleteReservation,
    PaymentInstructions,
    PaymentConfirmed,
}

const ALL_STEPS: &[ReservationStep] = &[
    ReservationStep::RequestSpaceInfo,
    ReservationStep::ChooseSpace,
    ReservationStep::ConfirmReservationSummary,
    ReservationStep::CompleteReservation,
    ReservationStep::PaymentInstructions,
    ReservationStep::PaymentConfirmed,
];

impl WorkflowStep for ReservationStep {
    fn name(&self) -> &'static str {
        match self {
            ReservationStep::RequestSpaceInfo => "REQUEST_SPACE_INFO",
            ReservationStep::ChooseSpace => "CHOOSE_SPACE",
            ReservationStep::ConfirmReservationSummary => "CONFIRM_RESERVATION_SUMMARY",
            ReservationStep::CompleteReservation => "COMPLETE_RESERVATION",
            ReservationStep::PaymentInstructions => "PAYMENT_INSTRUCTIONS",
            ReservationStep::PaymentConfirmed => "PAYMENT_CONFIRMED",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        ALL_STEPS.iter().copied().find(|step| step.name() == name.trim())
    }

    fn initial() -> Self {
        ReservationStep::RequestSpaceInfo
    }

    fn all() -> &'static [Self] {
        ALL_STEPS
    }
}

impl fmt::Display for ReservationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Legal edges and required data of the reservation workflow
pub fn transition_validator() -> TransitionValidator<ReservationStep> {
    use ReservationStep::{
        ChooseSpace, CompleteReservation, ConfirmReservationSummary, PaymentConfirmed,
        PaymentInstructions, RequestSpaceInfo,
    };

    TransitionValidator::builder()
        .allow(RequestSpaceInfo, [RequestSpaceInfo, ChooseSpace])
        .allow(ChooseSpace, [ChooseSpace, ConfirmReservationSummary])
        .allow(ConfirmReservationSummary, [ConfirmReservationSummary, CompleteReservation])
        .allow(CompleteReservation, [PaymentInstructions])
        .allow(PaymentInstructions, [PaymentInstructions])
        .allow(PaymentConfirmed, std::iter::empty())
        .require(
            ConfirmReservationSummary,
            [Requirement::ItemId, Requirement::CompletePeriod],
        )
        .require(
            CompleteReservation,
            [Requirement::ItemId, Requirement::CompletePeriod],
        )
        .build()
}

/// Step the next turn should start from.
///
/// The stored marker is reconciled with the data collected so far: a
/// conversation is moved forward when its data shows it is further along,
/// and never moved back because some field looks missing. An unreadable
/// marker restarts the workflow.
pub fn resolve_current_step(session: &SessionState) -> ReservationStep {
    let Some(raw) = session.get(keys::CURRENT_STEP) else {
        return step_from_data(session);
    };
    match ReservationStep::from_name(raw) {
        Some(stored) => reconcile(stored, session),
        None => {
            tracing::warn!(step = raw, "Unknown step marker in session, restarting workflow");
            ReservationStep::initial()
        }
    }
}

fn has_period(session: &SessionState) -> bool {
    session.contains(keys::START_DATE) && session.contains(keys::END_DATE)
}

fn step_from_data(session: &SessionState) -> ReservationStep {
    if session.item_id().is_none() {
        return ReservationStep::initial();
    }
    if !has_period(session) {
        return ReservationStep::ChooseSpace;
    }
    if session.flag(flags::RESERVATION_CREATED) {
        if session.flag(flags::PAYMENT_LINK_GENERATED) {
            return ReservationStep::PaymentInstructions;
        }
        return ReservationStep::CompleteReservation;
    }
    if session.flag(flags::SUMMARY_SHOWN) {
        return ReservationStep::CompleteReservation;
    }
    ReservationStep::ConfirmReservationSummary
}

fn reconcile(stored: ReservationStep, session: &SessionState) -> ReservationStep {
    use ReservationStep::{
        ChooseSpace, CompleteReservation, ConfirmReservationSummary, PaymentConfirmed,
        PaymentInstructions, RequestSpaceInfo,
    };

    let has_item = session.item_id().is_some();
    let reservation_created = session.flag(flags::RESERVATION_CREATED);
    let summary_shown = session.flag(flags::SUMMARY_SHOWN);

    let resolved = if stored == PaymentConfirmed {
        stored
    } else if reservation_created && session.flag(flags::PAYMENT_LINK_GENERATED) {
        PaymentInstructions
    } else if summary_shown && !reservation_created {
        CompleteReservation
    } else if has_item && has_period(session) && !summary_shown {
        ConfirmReservationSummary
    } else if has_item && stored == RequestSpaceInfo {
        ChooseSpace
    } else {
        stored
    };

    if resolved != stored {
        tracing::info!(from = %stored, to = %resolved, "Upgrading step from collected data");
    }
    resolved
}
