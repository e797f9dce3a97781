//! Per-conversation workflow state
//!
//! A flat string-to-string map so it can be persisted or dumped without
//! knowing the workflow. The engine writes the keys in [`keys`]; handlers may
//! keep their own keys alongside.

use super::period::{format_date, format_time, parse_date, parse_time, ReservationPeriod};
use super::response::StepPayload;
use super::step::WorkflowStep;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Session keys written by the engine
pub mod keys {
    pub const CURRENT_STEP: &str = "currentStep";
    pub const AWAITING_USER_INPUT: &str = "awaitingUserInput";
    pub const AWAITING_STEP: &str = "awaitingStep";
    pub const ITEM_ID: &str = "itemId";
    pub const START_DATE: &str = "startDate";
    pub const END_DATE: &str = "endDate";
    pub const START_TIME: &str = "startTime";
    pub const END_TIME: &str = "endTime";
    pub const LOCALE: &str = "locale";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionState {
    values: BTreeMap<String, String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// `true` when the key holds the literal `true`
    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Stored step marker, if it names a step of workflow `S`
    pub fn current_step<S: WorkflowStep>(&self) -> Option<S> {
        self.get(keys::CURRENT_STEP).and_then(S::from_name)
    }

    pub fn set_current_step<S: WorkflowStep>(&mut self, step: S) {
        self.set(keys::CURRENT_STEP, step.name());
    }

    pub fn awaiting_user_input(&self) -> bool {
        self.flag(keys::AWAITING_USER_INPUT)
    }

    pub fn awaiting_step<S: WorkflowStep>(&self) -> Option<S> {
        self.get(keys::AWAITING_STEP).and_then(S::from_name)
    }

    pub fn mark_awaiting_input<S: WorkflowStep>(&mut self, step: S) {
        self.set(keys::AWAITING_USER_INPUT, "true");
        self.set(keys::AWAITING_STEP, step.name());
    }

    pub fn item_id(&self) -> Option<&str> {
        self.get(keys::ITEM_ID).filter(|id| !id.trim().is_empty())
    }

    /// Period reassembled from the stored date/time fields
    pub fn period(&self) -> Option<ReservationPeriod> {
        let period = ReservationPeriod {
            start_date: self.get(keys::START_DATE).and_then(parse_date),
            end_date: self.get(keys::END_DATE).and_then(parse_date),
            start_time: self.get(keys::START_TIME).and_then(parse_time),
            end_time: self.get(keys::END_TIME).and_then(parse_time),
        };
        (period != ReservationPeriod::default()).then_some(period)
    }

    pub fn locale(&self) -> Option<&str> {
        self.get(keys::LOCALE)
    }

    /// Persist the collected payload fields. Only the identifying item, a
    /// complete period and the locale are stored. A stored period replaces
    /// the previous one entirely, times included.
    pub fn store_payload(&mut self, payload: &StepPayload) {
        if payload.has_item_id() {
            if let Some(item_id) = &payload.item_id {
                self.set(keys::ITEM_ID, item_id.clone());
            }
        }
        if let Some(period) = payload.period.as_ref().filter(|p| p.is_complete()) {
            let fields = [
                (keys::START_DATE, period.start_date.map(format_date)),
                (keys::END_DATE, period.end_date.map(format_date)),
                (keys::START_TIME, period.start_time.map(format_time)),
                (keys::END_TIME, period.end_time.map(format_time)),
            ];
            for (key, value) in fields {
                match value {
                    Some(value) => self.set(key, value),
                    None => {
                        self.remove(key);
                    }
                }
            }
        }
        if let Some(locale) = &payload.locale {
            self.set(keys::LOCALE, locale.clone());
        }
    }

    /// One-line rendering of the workflow position and collected fields
    pub fn debug_summary(&self) -> String {
        let field = |key: &str| self.get(key).unwrap_or("null").to_string();
        format!(
            "[state={}, itemId={}, startDate={}, endDate={}, startTime={}, endTime={}]",
            field(keys::CURRENT_STEP),
            field(keys::ITEM_ID),
            field(keys::START_DATE),
            field(keys::END_DATE),
            field(keys::START_TIME),
            field(keys::END_TIME),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::ReservationStep;
    use chrono::{NaiveDate, NaiveTime};

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    #[test]
    fn test_store_payload_writes_item_and_period() {
        let mut session = SessionState::new();
        let payload = StepPayload {
            item_id: Some("space-42".to_string()),
            period: Some(ReservationPeriod::new(june(1), june(3)).with_times(
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            )),
            locale: Some("fr".to_string()),
            ..StepPayload::default()
        };

        session.store_payload(&payload);

        assert_eq!(session.item_id(), Some("space-42"));
        assert_eq!(session.get(keys::START_DATE), Some("2025-06-01"));
        assert_eq!(session.get(keys::END_DATE), Some("2025-06-03"));
        assert_eq!(session.get(keys::START_TIME), Some("10:00"));
        assert_eq!(session.locale(), Some("fr"));
        assert_eq!(session.period().unwrap().end_date, Some(june(3)));
    }

    #[test]
    fn test_new_period_without_times_drops_previous_times() {
        let mut session = SessionState::new();
        session.store_payload(&StepPayload {
            period: Some(ReservationPeriod::new(june(1), june(3)).with_times(
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            )),
            ..StepPayload::default()
        });

        session.store_payload(&StepPayload {
            period: Some(ReservationPeriod::new(june(8), june(9))),
            ..StepPayload::default()
        });

        assert_eq!(session.period(), Some(ReservationPeriod::new(june(8), june(9))));
        assert!(!session.contains(keys::START_TIME));
        assert!(!session.contains(keys::END_TIME));
    }

    #[test]
    fn test_store_payload_skips_incomplete_period_and_blank_item() {
        let mut session = SessionState::new();
        let payload = StepPayload {
            item_id: Some("   ".to_string()),
            period: Some(ReservationPeriod {
                start_date: Some(june(1)),
                ..ReservationPeriod::default()
            }),
            ..StepPayload::default()
        };

        session.store_payload(&payload);

        assert!(session.is_empty());
        assert!(session.period().is_none());
    }

    #[test]
    fn test_step_markers_round_trip_through_names() {
        let mut session = SessionState::new();
        session.set_current_step(ReservationStep::ChooseSpace);
        session.mark_awaiting_input(ReservationStep::ChooseSpace);

        assert_eq!(session.current_step(), Some(ReservationStep::ChooseSpace));
        assert!(session.awaiting_user_input());
        assert_eq!(session.awaiting_step(), Some(ReservationStep::ChooseSpace));

        session.set(keys::CURRENT_STEP, "NOT_A_STEP");
        assert_eq!(session.current_step::<ReservationStep>(), None);
    }

    #[test]
    fn test_debug_summary_renders_missing_fields_as_null() {
        let mut session = SessionState::new();
        session.set_current_step(ReservationStep::RequestSpaceInfo);
        assert_eq!(
            session.debug_summary(),
            "[state=REQUEST_SPACE_INFO, itemId=null, startDate=null, endDate=null, startTime=null, endTime=null]"
        );
    }
}
