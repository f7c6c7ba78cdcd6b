//! Validated access events

use super::documents::{RawAccessEvent, UserId};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field names used by older generators for the simulated-anomaly label.
/// Neither matches the canonical `simulated_anomaly_flag`; both are reported
/// and ignored instead of being guessed into place.
pub const LEGACY_FLAG_FIELDS: [&str; 2] = ["es_anomalia_simulda", "es_anomalia_simulada"];

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A single recorded login. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub user_id: UserId,
    /// Login time with the offset it was recorded in
    pub timestamp: DateTime<FixedOffset>,
    pub ip: Option<String>,
    pub device: String,
    pub location: String,
    pub simulated_anomaly_flag: Option<bool>,
}

impl AccessEvent {
    /// Clock hour of the login (0-23) in its recorded offset
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// Why a raw event was dropped at the ingestion boundary
#[derive(Debug, Clone, PartialEq)]
pub enum EventRejection {
    MissingField(&'static str),
    BadTimestamp(String),
}

impl fmt::Display for EventRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventRejection::MissingField(field) => write!(f, "missing field '{}'", field),
            EventRejection::BadTimestamp(raw) => write!(f, "unparseable login_time '{}'", raw),
        }
    }
}

/// Parse an ISO-8601 login time, keeping its offset; naive timestamps get
/// offset zero
pub fn parse_login_time(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, EventRejection> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(EventRejection::MissingField(field)),
    }
}

impl RawAccessEvent {
    /// Validate into an [`AccessEvent`] owned by `user_id`
    pub fn validate(&self, user_id: &UserId) -> Result<AccessEvent, EventRejection> {
        let raw_time = required(&self.login_time, "login_time")?;
        let timestamp =
            parse_login_time(&raw_time).ok_or(EventRejection::BadTimestamp(raw_time))?;

        Ok(AccessEvent {
            user_id: user_id.clone(),
            timestamp,
            ip: self.ip.clone(),
            device: required(&self.device, "device")?,
            location: required(&self.location, "location")?,
            simulated_anomaly_flag: match self.simulated_anomaly_flag {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
        })
    }

    /// Legacy label fields present on this event
    pub fn legacy_flag_fields(&self) -> impl Iterator<Item = &str> {
        self.unknown
            .keys()
            .map(String::as_str)
            .filter(|key| LEGACY_FLAG_FIELDS.contains(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn raw(login_time: &str) -> RawAccessEvent {
        RawAccessEvent {
            login_time: Some(login_time.to_string()),
            ip: Some("10.0.0.1".to_string()),
            device: Some("laptop".to_string()),
            location: Some("coyoacan".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_login_time_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();
        assert_eq!(parse_login_time("2024-03-01 22:00:00"), Some(expected.fixed_offset()));
        assert_eq!(parse_login_time("2024-03-01T22:00:00"), Some(expected.fixed_offset()));
        assert_eq!(parse_login_time("2024-03-01T22:00:00Z"), Some(expected.fixed_offset()));

        let offset = parse_login_time("2024-03-01T16:00:00-06:00").unwrap();
        assert_eq!(offset, expected);
        assert_eq!(offset.offset().local_minus_utc(), -6 * 3600);
        assert_eq!(offset.hour(), 16);

        assert_eq!(parse_login_time("yesterday"), None);
    }

    #[test]
    fn test_hour_uses_recorded_offset() {
        let user = UserId::from("u1");

        let mexico_city = raw("2024-03-01T03:00:00-06:00").validate(&user).unwrap();
        assert_eq!(mexico_city.hour(), 3);

        let utc = raw("2024-03-01T09:00:00Z").validate(&user).unwrap();
        assert_eq!(utc.hour(), 9);
        assert_eq!(mexico_city.timestamp, utc.timestamp);
    }

    #[test]
    fn test_validate_event() {
        let user = UserId::from("u1");
        let event = raw("2024-03-01 03:15:00").validate(&user).unwrap();
        assert_eq!(event.hour(), 3);
        assert_eq!(event.device, "laptop");
        assert_eq!(event.simulated_anomaly_flag, None);
    }

    #[test]
    fn test_validate_rejections() {
        let user = UserId::from("u1");

        let mut missing = raw("2024-03-01 03:15:00");
        missing.device = Some("  ".to_string());
        assert_eq!(
            missing.validate(&user),
            Err(EventRejection::MissingField("device"))
        );

        let bad = raw("not-a-date");
        assert!(matches!(
            bad.validate(&user),
            Err(EventRejection::BadTimestamp(_))
        ));
    }

    #[test]
    fn test_simulated_flag_values() {
        let user = UserId::from("u1");
        let mut event = raw("2024-03-01 03:15:00");

        event.simulated_anomaly_flag = Some(1);
        assert_eq!(event.validate(&user).unwrap().simulated_anomaly_flag, Some(true));

        event.simulated_anomaly_flag = Some(7);
        assert_eq!(event.validate(&user).unwrap().simulated_anomaly_flag, None);
    }

    #[test]
    fn test_legacy_flag_detection() {
        let mut event = raw("2024-03-01 03:15:00");
        event
            .unknown
            .insert("es_anomalia_simulda".to_string(), serde_json::Value::from(1));
        event
            .unknown
            .insert("browser".to_string(), serde_json::Value::from("firefox"));

        let legacy: Vec<&str> = event.legacy_flag_fields().collect();
        assert_eq!(legacy, vec!["es_anomalia_simulda"]);
    }
}
