//! Reservation period payload

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M";

/// Dates and times of a reservation as collected from the conversation.
///
/// Dates use `YYYY-MM-DD`, times `HH:mm`. Empty strings coming from the LLM
/// are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationPeriod {
    #[serde(default, with = "lenient_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, with = "lenient_date")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, with = "lenient_time")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "lenient_time")]
    pub end_time: Option<NaiveTime>,
}

impl ReservationPeriod {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
            start_time: None,
            end_time: None,
        }
    }

    pub fn with_times(mut self, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        self.start_time = Some(start_time);
        self.end_time = Some(end_time);
        self
    }

    pub fn has_dates(&self) -> bool {
        self.start_date.is_some() && self.end_date.is_some()
    }

    pub fn has_times(&self) -> bool {
        self.start_time.is_some() && self.end_time.is_some()
    }

    /// A period is complete once both dates are known; times are optional.
    pub fn is_complete(&self) -> bool {
        self.has_dates()
    }
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub(crate) fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

mod lenient_date {
    use super::{format_date, parse_date};
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)] // signature imposed by serde's `with`
    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.serialize_str(&format_date(*date)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse_date(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid date '{raw}', expected YYYY-MM-DD"))),
        }
    }
}

mod lenient_time {
    use super::{format_time, parse_time};
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)] // signature imposed by serde's `with`
    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.serialize_str(&format_time(*time)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse_time(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid time '{raw}', expected HH:mm"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_period_completeness_ignores_times() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let period = ReservationPeriod::new(date, date);
        assert!(period.is_complete());
        assert!(!period.has_times());

        let partial = ReservationPeriod {
            start_date: Some(date),
            ..ReservationPeriod::default()
        };
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_deserialize_treats_empty_strings_as_absent() {
        let period: ReservationPeriod = serde_json::from_value(json!({
            "startDate": "2025-06-01",
            "endDate": "",
            "startTime": "14:00",
            "endTime": null
        }))
        .unwrap();

        assert_eq!(period.start_date, NaiveDate::from_ymd_opt(2025, 6, 1));
        assert_eq!(period.end_date, None);
        assert_eq!(period.start_time, NaiveTime::from_hms_opt(14, 0, 0));
        assert_eq!(period.end_time, None);
    }

    #[test]
    fn test_deserialize_rejects_malformed_date() {
        let result: Result<ReservationPeriod, _> =
            serde_json::from_value(json!({ "startDate": "June 1st" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_uses_short_time_format() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let period = ReservationPeriod::new(date, date).with_times(
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        );
        let value = serde_json::to_value(&period).unwrap();
        assert_eq!(value["startTime"], "09:30");
        assert_eq!(value["endDate"], "2025-06-01");
    }
}
