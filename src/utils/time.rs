use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Deserializer};

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parses the timestamp spellings PostgREST and database webhooks emit.
/// Values without an offset are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn deserialize_lenient_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

pub fn parse_clock(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

pub fn format_display_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}

pub fn format_trend_label(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

/// Renders a wall-clock string as `9:05 AM`. Missing values render as `--`;
/// strings that already carry AM/PM or do not parse are returned untouched.
pub fn format_clock(value: Option<&str>) -> String {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return "--".to_string();
    };
    if raw.contains("AM") || raw.contains("PM") {
        return raw.to_string();
    }
    match parse_clock(raw) {
        Some(time) => {
            let (pm, hour) = time.hour12();
            format!("{}:{:02} {}", hour, time.minute(), if pm { "PM" } else { "AM" })
        }
        None => raw.to_string(),
    }
}

/// `"{h}h {m}m"` between check-in and check-out, `None` unless check-out is
/// strictly later.
pub fn compute_duration(check_in: NaiveTime, check_out: NaiveTime) -> Option<String> {
    let diff = check_out.signed_duration_since(check_in);
    if diff <= chrono::Duration::zero() {
        return None;
    }
    let minutes = diff.num_minutes();
    Some(format!("{}h {}m", minutes / 60, minutes % 60))
}
