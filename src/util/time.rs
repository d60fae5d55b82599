use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde_json::Value;

// Parse a date-ish string into a calendar date, discarding any time-of-day.
// Accepts "YYYY-MM-DD", "YYYY-MM-DD HH:MM:SS", "YYYY-MM-DDTHH:MM:SS[.f]" and RFC3339.
// The offset of an RFC3339 value is kept as-is; the local date is what counts.
pub fn parse_calendar_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(nd);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    None
}

pub fn date_from_value(v: &Value) -> Option<NaiveDate> {
    match v {
        Value::String(s) => parse_calendar_date(s),
        _ => None,
    }
}

// Ops override wins; otherwise the local wall-clock date.
pub fn today_or(override_date: Option<NaiveDate>) -> NaiveDate {
    override_date.unwrap_or_else(|| Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, day).unwrap() }

    #[test]
    fn parses_plain_and_timestamped_dates() {
        assert_eq!(parse_calendar_date("2025-01-10"), Some(d(2025, 1, 10)));
        assert_eq!(parse_calendar_date("2025-01-10 23:59:59"), Some(d(2025, 1, 10)));
        assert_eq!(parse_calendar_date("2025-01-10T08:00:00.000"), Some(d(2025, 1, 10)));
        assert_eq!(parse_calendar_date(" 2025-01-10 "), Some(d(2025, 1, 10)));
    }

    #[test]
    fn rfc3339_keeps_its_own_calendar_day() {
        // 23:30 at +07:00 is still the 10th locally even though UTC is the 10th 16:30
        assert_eq!(parse_calendar_date("2025-01-10T23:30:00+07:00"), Some(d(2025, 1, 10)));
        assert_eq!(parse_calendar_date("2025-01-10T00:30:00-05:00"), Some(d(2025, 1, 10)));
    }

    #[test]
    fn rejects_garbage_and_non_strings() {
        assert_eq!(parse_calendar_date("10 Jan"), None);
        assert_eq!(parse_calendar_date(""), None);
        assert_eq!(date_from_value(&json!(20250110)), None);
        assert_eq!(date_from_value(&Value::Null), None);
        assert_eq!(date_from_value(&json!("2025-02-01")), Some(d(2025, 2, 1)));
    }

    #[test]
    fn override_wins_over_clock() {
        assert_eq!(today_or(Some(d(2025, 1, 3))), d(2025, 1, 3));
    }
}
