//! Time sources and the business timezone
//!
//! Schedule comparisons happen against "now" in the business timezone, a
//! fixed UTC offset (São Paulo, which has no daylight saving time). Instants
//! compare the same in any offset; the offset matters when a caller supplies
//! a naive local timestamp and when timestamps are rendered for customers.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use std::sync::Mutex;

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic scheduling
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

const SAO_PAULO_OFFSET_SECS: i32 = -3 * 3600;

/// Accepted layouts for naive schedule timestamps
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// The business timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessTime {
    offset: FixedOffset,
}

impl BusinessTime {
    pub fn new(offset: FixedOffset) -> Self {
        BusinessTime { offset }
    }

    /// America/Sao_Paulo, UTC-03:00
    pub fn sao_paulo() -> Self {
        match FixedOffset::east_opt(SAO_PAULO_OFFSET_SECS) {
            Some(offset) => BusinessTime::new(offset),
            None => unreachable!("-03:00 is within the ±24h offset range"),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Current time from `clock`, expressed in the business timezone
    pub fn now(&self, clock: &dyn Clock) -> DateTime<FixedOffset> {
        self.at(clock.now())
    }

    /// Express an instant in the business timezone
    pub fn at(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset)
    }

    /// Parse a schedule timestamp.
    ///
    /// RFC 3339 input keeps its own offset; naive input is interpreted in the
    /// business timezone.
    pub fn parse_schedule(&self, input: &str) -> Option<DateTime<FixedOffset>> {
        let input = input.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
            return Some(parsed);
        }
        NAIVE_FORMATS.iter().find_map(|format| {
            NaiveDateTime::parse_from_str(input, format)
                .ok()
                .and_then(|naive| self.offset.from_local_datetime(&naive).single())
        })
    }

    /// `YYYY-MM-DD HH:MM:SS` in the business timezone
    pub fn format(&self, instant: DateTime<Utc>) -> String {
        self.at(instant).format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

impl Default for BusinessTime {
    fn default() -> Self {
        BusinessTime::sao_paulo()
    }
}

/// Parse a `±HH:MM` offset
pub fn parse_utc_offset(input: &str) -> Option<FixedOffset> {
    let input = input.trim();
    let (sign, rest) = match input.as_bytes().first()? {
        b'+' => (1, &input[1..]),
        b'-' => (-1, &input[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    if !is_digits(hours) || !is_digits(minutes) {
        return None;
    }
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    let seconds = i32::try_from(hours * 3600 + minutes * 60).ok()?;
    FixedOffset::east_opt(sign * seconds)
}

fn is_digits(field: &str) -> bool {
    !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit())
}
