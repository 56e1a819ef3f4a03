use crate::ControlEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unit a periodic cadence is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Duration of `amount` of this unit, saturating on overflow.
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(amount),
            TimeUnit::Microseconds => Duration::from_micros(amount),
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(amount.saturating_mul(3_600)),
            TimeUnit::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Self::CONSTANTS
            .iter()
            .find(|(_, unit)| unit == self)
            .map(|(name, _)| *name)
            .unwrap_or("UNKNOWN");
        f.write_str(name)
    }
}

impl ControlEnum for TimeUnit {
    const TYPE_NAME: &'static str = "TimeUnit";
    const CONSTANTS: &'static [(&'static str, Self)] = &[
        ("NANOSECONDS", TimeUnit::Nanoseconds),
        ("MICROSECONDS", TimeUnit::Microseconds),
        ("MILLISECONDS", TimeUnit::Milliseconds),
        ("SECONDS", TimeUnit::Seconds),
        ("MINUTES", TimeUnit::Minutes),
        ("HOURS", TimeUnit::Hours),
        ("DAYS", TimeUnit::Days),
    ];
}
