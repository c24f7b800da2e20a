//! Lengths of time used by span width and gap constraints
//!
//! A `Delta` keeps the components it was built from (so the wire form
//! reads the way it was written) but compares by its total wall-clock
//! length. Months count as 28 days and years as 365 days.

use super::error::{QueryError, QueryResult};
use chrono::Duration;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// A length of time
#[derive(Debug, Clone, Copy, Default)]
pub struct Delta {
    seconds: u64,
    minutes: u64,
    hours: u64,
    days: u64,
    weeks: u64,
    months: u64,
    years: u64,
}

impl Delta {
    /// Zero-length delta
    pub fn zero() -> Self {
        Self::default()
    }

    /// Delta of `n` seconds
    pub fn from_secs(n: u64) -> Self {
        Self::default().seconds(n)
    }

    /// Delta of `n` minutes
    pub fn from_mins(n: u64) -> Self {
        Self::default().minutes(n)
    }

    /// Delta of `n` hours
    pub fn from_hours(n: u64) -> Self {
        Self::default().hours(n)
    }

    /// Delta of `n` days
    pub fn from_days(n: u64) -> Self {
        Self::default().days(n)
    }

    /// Builder: add seconds
    pub fn seconds(mut self, n: u64) -> Self {
        self.seconds = self.seconds.saturating_add(n);
        self
    }

    /// Builder: add minutes
    pub fn minutes(mut self, n: u64) -> Self {
        self.minutes = self.minutes.saturating_add(n);
        self
    }

    /// Builder: add hours
    pub fn hours(mut self, n: u64) -> Self {
        self.hours = self.hours.saturating_add(n);
        self
    }

    /// Builder: add days
    pub fn days(mut self, n: u64) -> Self {
        self.days = self.days.saturating_add(n);
        self
    }

    /// Builder: add weeks
    pub fn weeks(mut self, n: u64) -> Self {
        self.weeks = self.weeks.saturating_add(n);
        self
    }

    /// Builder: add months (28 days each)
    pub fn months(mut self, n: u64) -> Self {
        self.months = self.months.saturating_add(n);
        self
    }

    /// Builder: add years (365 days each)
    pub fn years(mut self, n: u64) -> Self {
        self.years = self.years.saturating_add(n);
        self
    }

    /// Total length in seconds, saturating at `i64::MAX`
    pub fn total_seconds(&self) -> i64 {
        self.checked_seconds().unwrap_or(i64::MAX)
    }

    fn checked_seconds(&self) -> Option<i64> {
        const UNIT_SECONDS: [i64; 7] = [1, 60, 3600, 86_400, 7 * 86_400, 28 * 86_400, 365 * 86_400];
        self.components()
            .iter()
            .zip(UNIT_SECONDS)
            .try_fold(0i64, |total, ((_, n), unit)| {
                i64::try_from(*n)
                    .ok()?
                    .checked_mul(unit)?
                    .checked_add(total)
            })
    }

    /// Convert to a wall-clock duration, failing past `Duration::MAX`
    pub fn try_duration(&self) -> QueryResult<Duration> {
        self.checked_seconds()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| QueryError::DeltaOutOfRange(self.to_string()))
    }

    /// Convert to a wall-clock duration, saturating at `Duration::MAX`
    pub fn to_duration(&self) -> Duration {
        self.try_duration().unwrap_or(Duration::MAX)
    }

    /// Check for a zero-length delta
    pub fn is_zero(&self) -> bool {
        self.total_seconds() == 0
    }

    /// Wire form: the non-zero components, or `{"seconds": 0}`
    pub fn to_ast(&self) -> Value {
        let mut map = Map::new();
        for (name, n) in self.components() {
            if n > 0 {
                map.insert(name.to_string(), json!(n));
            }
        }
        if map.is_empty() {
            map.insert("seconds".to_string(), json!(0));
        }
        Value::Object(map)
    }

    fn components(&self) -> [(&'static str, u64); 7] {
        [
            ("seconds", self.seconds),
            ("minutes", self.minutes),
            ("hours", self.hours),
            ("days", self.days),
            ("weeks", self.weeks),
            ("months", self.months),
            ("years", self.years),
        ]
    }
}

impl PartialEq for Delta {
    fn eq(&self, other: &Self) -> bool {
        self.total_seconds() == other.total_seconds()
    }
}

impl Eq for Delta {}

impl PartialOrd for Delta {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delta {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_seconds().cmp(&other.total_seconds())
    }
}

impl From<Delta> for Duration {
    fn from(delta: Delta) -> Self {
        delta.to_duration()
    }
}

const UNITS: [char; 7] = ['s', 'm', 'h', 'd', 'w', 'M', 'y'];

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .components()
            .iter()
            .zip(UNITS)
            .filter(|((_, n), _)| *n > 0)
            .map(|((_, n), unit)| format!("{}{}", n, unit))
            .collect();
        if parts.is_empty() {
            write!(f, "0s")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

fn delta_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)([smhdwMy])$").ok()).as_ref()
}

impl FromStr for Delta {
    type Err = QueryError;

    /// Parse the `Display` notation, e.g. `"1h 30m"` or `"2d"`
    fn from_str(s: &str) -> QueryResult<Self> {
        let re = delta_regex().ok_or_else(|| QueryError::InvalidDelta(s.to_string()))?;

        let mut delta = Delta::zero();
        let mut seen = false;
        for token in s.split_whitespace() {
            let caps = re
                .captures(token)
                .ok_or_else(|| QueryError::InvalidDelta(s.to_string()))?;
            let n: u64 = caps[1]
                .parse()
                .map_err(|_| QueryError::InvalidDelta(s.to_string()))?;
            delta = match &caps[2] {
                "s" => delta.seconds(n),
                "m" => delta.minutes(n),
                "h" => delta.hours(n),
                "d" => delta.days(n),
                "w" => delta.weeks(n),
                "M" => delta.months(n),
                _ => delta.years(n),
            };
            seen = true;
        }
        if !seen {
            return Err(QueryError::InvalidDelta(s.to_string()));
        }
        delta.try_duration()?;
        Ok(delta)
    }
}
