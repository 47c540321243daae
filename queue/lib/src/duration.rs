//! Wait intervals used by DELAY, WAIT and queue speeds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DurationError;

/// Host ticks per second (the `t` unit).
const TICKS_PER_SECOND: f64 = 20.0;

/// An immutable, non-negative span of time measured in seconds.
///
/// The only constructors validate their input, so a `Duration` is never
/// negative, NaN or infinite. Its canonical text form is `<seconds>s`.
///
/// ## Examples
///
/// ```
/// use script_queue::Duration;
///
/// let wait: Duration = "1.5m".parse().unwrap();
/// assert_eq!(wait.seconds(), 90.0);
/// assert_eq!(wait.to_string(), "90s");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize)]
#[serde(into = "String")]
pub struct Duration(f64);

impl Duration {
    /// A zero-length duration ("no wait").
    pub const ZERO: Duration = Duration(0.0);

    /// Builds a duration from a number of seconds.
    ///
    /// ## Errors
    ///
    /// Returns [`DurationError::Invalid`] for negative or non-finite input.
    pub fn from_secs_f64(seconds: f64) -> Result<Self, DurationError> {
        if !seconds.is_finite() {
            return Err(DurationError::invalid(
                seconds.to_string(),
                "duration must be finite",
            ));
        }
        if seconds < 0.0 {
            return Err(DurationError::invalid(
                seconds.to_string(),
                "duration cannot be negative",
            ));
        }
        // Normalises -0.0 so the canonical form never prints a sign.
        Ok(Self(seconds + 0.0))
    }

    /// Number of seconds in this duration.
    pub fn seconds(&self) -> f64 {
        self.0
    }

    /// Alias of [`seconds`](Self::seconds).
    pub fn to_seconds(&self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    /// Converts to a `std::time::Duration`, saturating on overflow.
    pub fn to_std(&self) -> std::time::Duration {
        std::time::Duration::try_from_secs_f64(self.0).unwrap_or(std::time::Duration::MAX)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl FromStr for Duration {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s)
    }
}

impl TryFrom<String> for Duration {
    type Error = DurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_duration(&value)
    }
}

/// Accepted serialized forms: `"5s"`-style text or a number of seconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Seconds(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match DurationRepr::deserialize(deserializer)? {
            DurationRepr::Seconds(seconds) => Duration::from_secs_f64(seconds),
            DurationRepr::Text(text) => parse_duration(&text),
        }
        .map_err(serde::de::Error::custom)
    }
}

impl From<Duration> for String {
    fn from(value: Duration) -> Self {
        value.to_string()
    }
}

impl From<std::time::Duration> for Duration {
    fn from(value: std::time::Duration) -> Self {
        Self(value.as_secs_f64())
    }
}

/// Parses a duration string into a [`Duration`].
///
/// ## Supported Units
///
/// - `ms` - milliseconds
/// - `t` - host ticks (1/20 of a second)
/// - `s` - seconds (default if no unit specified)
/// - `m` - minutes
/// - `h` - hours
/// - `d` - days
///
/// ## Errors
///
/// Returns [`DurationError::Invalid`] if the text is empty, negative, has no
/// leading number or uses an unknown unit.
///
/// ## Examples
///
/// ```
/// use script_queue::parse_duration;
///
/// assert_eq!(parse_duration("5").unwrap().seconds(), 5.0);
/// assert_eq!(parse_duration("20t").unwrap().seconds(), 1.0);
/// assert!(parse_duration("-1s").is_err());
/// ```
pub fn parse_duration(value: &str) -> Result<Duration, DurationError> {
    let normalized = value.trim().to_lowercase().replace(' ', "");

    if normalized.is_empty() {
        return Err(DurationError::invalid(value, "duration cannot be empty"));
    }

    if normalized.starts_with('-') {
        return Err(DurationError::invalid(value, "duration cannot be negative"));
    }

    let split_index = normalized
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(normalized.len());
    let (amount, unit) = normalized.split_at(split_index);

    if amount.is_empty() {
        return Err(DurationError::invalid(
            value,
            "duration must start with a number",
        ));
    }

    let amount: f64 = amount
        .parse()
        .map_err(|_| DurationError::invalid(value, "duration must be a number"))?;

    let seconds = match unit {
        "" | "s" => amount,
        "ms" => amount / 1_000.0,
        "t" => amount / TICKS_PER_SECOND,
        "m" => amount * 60.0,
        "h" => amount * 3_600.0,
        "d" => amount * 86_400.0,
        _ => {
            return Err(DurationError::invalid(
                value,
                "duration units must be ms, t, s, m, h, or d",
            ));
        }
    };

    Duration::from_secs_f64(seconds)
        .map_err(|_| DurationError::invalid(value, "duration is out of range"))
}
