//! Time-of-day values for activities. Stored as 24-hour `HH:MM`; input may
//! also use the 12-hour `hh:mm AM|PM` form of the activity form.

use chrono::NaiveTime;

const STORED_FORMAT: &str = "%H:%M";
const TWELVE_HOUR_FORMAT: &str = "%I:%M %p";

/// Parses either accepted form and returns the stored `HH:MM` form.
pub fn normalize(raw: &str) -> Option<String> {
    parse(raw).map(|time| time.format(STORED_FORMAT).to_string())
}

pub fn parse(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, STORED_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(trimmed, TWELVE_HOUR_FORMAT))
        .ok()
}

/// Renders a stored time the way the 12-hour form shows it, e.g. `02:30 PM`.
pub fn to_twelve_hour(stored: &str) -> Option<String> {
    parse(stored).map(|time| time.format(TWELVE_HOUR_FORMAT).to_string())
}
