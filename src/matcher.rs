//! Plate comparison and merge policy.
//!
//! Pure functions over plate strings and `HH:MM:SS` time-of-day stamps. The
//! detection window uses these to decide whether a fresh reading belongs to a
//! vehicle it has already seen.

use anyhow::{anyhow, Result};
use chrono::NaiveTime;

/// Format used for sighting timestamps (time of day, one-second precision).
pub const TIME_OF_DAY_FORMAT: &str = "%H:%M:%S";

/// Digit-only subsequence of a plate reading.
pub fn digits_of(plate: &str) -> String {
    plate.chars().filter(|c| c.is_numeric()).collect()
}

fn has_non_digit(plate: &str) -> bool {
    plate.chars().any(|c| !c.is_numeric())
}

/// Returns true when two readings plausibly come from the same vehicle.
///
/// The numeric part of one reading must appear contiguously in the other.
/// Lengths are not compared, so a partial read such as `"234"` still matches
/// `"1234"`. An empty reading never matches.
pub fn is_same_plate(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let digits_a = digits_of(a);
    let digits_b = digits_of(b);
    digits_a.contains(digits_b.as_str()) || digits_b.contains(digits_a.as_str())
}

/// Picks the more complete of two readings of the same plate.
///
/// A reading with letters beats an all-digit one; otherwise the longer one
/// wins and ties keep `a`.
pub fn better_plate<'a>(a: &'a str, b: &'a str) -> &'a str {
    if a.is_empty() {
        return b;
    }
    if b.is_empty() {
        return a;
    }
    match (has_non_digit(a), has_non_digit(b)) {
        (true, false) => a,
        (false, true) => b,
        _ if a.chars().count() >= b.chars().count() => a,
        _ => b,
    }
}

/// Absolute difference in seconds between two `HH:MM:SS` stamps.
///
/// Stamps carry no date, so a pair straddling midnight yields a difference
/// close to 24 hours rather than a few seconds.
pub fn time_diff_seconds(t1: &str, t2: &str) -> Result<f64> {
    let a = parse_time_of_day(t1)?;
    let b = parse_time_of_day(t2)?;
    Ok((b - a).num_seconds().abs() as f64)
}

fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, TIME_OF_DAY_FORMAT)
        .map_err(|e| anyhow!("invalid time of day '{}': {}", value, e))
}
