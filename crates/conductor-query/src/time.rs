use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static RELATIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)(m|h|d)$").unwrap());

/// Parses a time-range endpoint per the accepted forms: empty string (no
/// bound), `today`/`yesterday` (local midnight), relative durations like
/// `30m`/`4h`/`2d` (subtracted from now), and the ISO forms RFC3339,
/// `2006-01-02T15:04:05`, and `2006-01-02`.
pub fn parse_time_range(s: &str) -> Result<Option<DateTime<Utc>>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }

    if s.eq_ignore_ascii_case("today") {
        return Ok(Some(local_midnight(0)));
    }
    if s.eq_ignore_ascii_case("yesterday") {
        return Ok(Some(local_midnight(-1)));
    }

    if let Some(caps) = RELATIVE_RE.captures(s) {
        let n: i64 = caps[1].parse().unwrap_or(0);
        let duration = match &caps[2] {
            "m" => chrono::Duration::minutes(n),
            "h" => chrono::Duration::hours(n),
            "d" => chrono::Duration::days(n),
            _ => unreachable!(),
        };
        return Ok(Some(Utc::now() - duration));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Some(Utc.from_utc_datetime(&naive)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0).unwrap();
        return Ok(Some(Utc.from_utc_datetime(&naive)));
    }

    Err(Error::InvalidTimeRange(s.to_string()))
}

fn local_midnight(day_offset: i64) -> DateTime<Utc> {
    let today = Local::now().date_naive() + chrono::Duration::days(day_offset);
    let naive_midnight = today.and_hms_opt(0, 0, 0).unwrap();
    Local
        .from_local_datetime(&naive_midnight)
        .single()
        .unwrap_or_else(|| Local::now())
        .with_timezone(&Utc)
}
