//! Property-based tests for the transition engine
//!
//! These tests verify key invariants hold across all step pairs and chain
//! lengths.

use super::testing::{ObservedEvent, RecordingObserver, ScriptedHandler};
use super::*;
use crate::reservation::{self, ReservationStep};
use chrono::NaiveDate;
use proptest::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_step() -> impl Strategy<Value = ReservationStep> {
    proptest::sample::select(ReservationStep::all().to_vec())
}

fn full_payload_switch(to: ReservationStep) -> StepResponse<ReservationStep> {
    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    StepResponse::switch_to(to)
        .with_item_id("space-1")
        .with_period(ReservationPeriod::new(date, date))
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

// ============================================================================
// Validator properties
// ============================================================================

proptest! {
    #[test]
    fn prop_unlisted_edges_are_always_rejected(from in arb_step(), to in arb_step()) {
        let validator = reservation::transition_validator();
        prop_assume!(!validator.is_transition_allowed(from, to));

        let response = full_payload_switch(to);
        let result = validator.validate(from, to, Some(&response), None);
        prop_assert!(!result.is_valid());
        prop_assert_eq!(result.error_code(), Some(ErrorCode::InvalidTransition));
    }

    #[test]
    fn prop_listed_edges_with_full_payload_are_accepted(from in arb_step(), to in arb_step()) {
        let validator = reservation::transition_validator();
        prop_assume!(validator.is_transition_allowed(from, to));

        let response = full_payload_switch(to);
        prop_assert!(validator.validate(from, to, Some(&response), None).is_valid());
    }

    #[test]
    fn prop_allowed_targets_agree_with_is_allowed(from in arb_step(), to in arb_step()) {
        let validator = reservation::transition_validator();
        prop_assert_eq!(
            validator.allowed_targets(from).contains(&to),
            validator.is_transition_allowed(from, to)
        );
    }
}

// ============================================================================
// Chain properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A chain of `switches` self-transitions followed by an answer either
    /// completes with the answer or, past the limit, resolves to the
    /// fallback with exactly one error notification.
    #[test]
    fn prop_chain_is_bounded(switches in 0u32..15) {
        let mut handler = ScriptedHandler::new(ReservationStep::ChooseSpace);
        for _ in 0..switches {
            handler = handler.respond(StepResponse::switch_to(ReservationStep::ChooseSpace));
        }
        handler = handler.respond(StepResponse::answer("done"));
        let calls = handler.calls();
        let registry = HandlerRegistry::from_handlers([handler.into_dyn()]);

        let recorder = Arc::new(RecordingObserver::default());
        let machine = StateMachine::new(
            Arc::new(reservation::transition_validator()),
            ObserverSet::new(vec![recorder.clone()]),
        );
        let auth = AuthContext::anonymous("@bob:example.org");
        let cancel = CancellationToken::new();
        let scope = TurnScope { auth: &auth, registry: &registry, cancel: &cancel };
        let mut session = SessionState::new();

        let start = registry.get(ReservationStep::ChooseSpace).unwrap();
        let response = block_on(machine.process(
            start,
            ReservationStep::ChooseSpace,
            "hi",
            &[],
            &mut session,
            &scope,
        ))
        .unwrap();

        let entered = recorder.count(|e| matches!(e, ObservedEvent::StepEntered(_)));
        let errors = recorder.count(|e| matches!(e, ObservedEvent::Error { .. }));
        if switches < MAX_SWITCH_ITERATIONS {
            prop_assert_eq!(response, StepResponse::answer("done"));
            prop_assert_eq!(entered, switches as usize + 1);
            prop_assert_eq!(errors, 0);
        } else {
            prop_assert!(response.is_error());
            prop_assert_eq!(calls.messages().len(), MAX_SWITCH_ITERATIONS as usize);
            prop_assert_eq!(errors, 1);
        }
        prop_assert!(calls.messages().len() <= MAX_SWITCH_ITERATIONS as usize);
    }
}
