use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use crate::error::{ShopfloorError, ShopfloorResult};

pub mod analytics;
pub mod auth;
pub mod machines;
pub mod notifications;
pub mod settings;
pub mod shifts;
pub mod stop_reasons;
pub mod stops;
pub mod users;

/// Common query-string filters shared by the analytics and listing routes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    pub machine_id: Option<i32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
}

/// Accepts either a full RFC 3339 timestamp or a bare `YYYY-MM-DD` date
/// (interpreted as UTC midnight).
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(DateTime::from_naive_utc_and_offset(
        date.and_time(NaiveTime::MIN),
        Utc,
    ))
}

impl RangeQuery {
    /// Analytics routes require both ends of the window.
    pub fn required_range(&self) -> ShopfloorResult<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self
            .start_date
            .as_deref()
            .and_then(parse_datetime)
            .ok_or_else(|| {
                ShopfloorError::Validation("Valid startDate and endDate are required".to_string())
            })?;
        let end = self
            .end_date
            .as_deref()
            .and_then(parse_datetime)
            .ok_or_else(|| {
                ShopfloorError::Validation("Valid startDate and endDate are required".to_string())
            })?;
        if end < start {
            return Err(ShopfloorError::Validation(
                "endDate must not precede startDate".to_string(),
            ));
        }
        Ok((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_date_only_as_utc_midnight() {
        let dt = parse_datetime("2026-03-02").unwrap();
        assert_eq!(dt.hour(), 0);
        assert_eq!(dt.to_rfc3339(), "2026-03-02T00:00:00+00:00");
    }

    #[test]
    fn parses_rfc3339() {
        let dt = parse_datetime("2026-03-02T08:30:00+02:00").unwrap();
        assert_eq!(dt.hour(), 6);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_datetime("not-a-date").is_none());
        assert!(parse_datetime("").is_none());
    }

    #[test]
    fn required_range_validates() {
        let q = RangeQuery {
            machine_id: None,
            start_date: Some("2026-03-02".to_string()),
            end_date: Some("2026-03-01".to_string()),
            limit: None,
        };
        assert!(q.required_range().is_err());

        let q = RangeQuery {
            machine_id: None,
            start_date: None,
            end_date: Some("2026-03-01".to_string()),
            limit: None,
        };
        assert!(q.required_range().is_err());
    }
}
