use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClockError {
    #[error("session duration must be > 0 seconds")]
    InvalidDuration,

    #[error("pausing is not allowed under strict timing")]
    PauseNotAllowed,
}

/// Colour band for the remaining time, relative to the full budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUrgency {
    /// More than half of the budget left.
    Plenty,
    /// More than a quarter left.
    Low,
    Critical,
}

/// Countdown for a timed exam, advanced by an external one-second scheduler.
///
/// The clock never goes below zero and reports the zero crossing exactly once.
/// A strict clock (realistic mode) cannot be paused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClock {
    total: u32,
    remaining: u32,
    paused: bool,
    strict: bool,
    expired: bool,
}

impl SessionClock {
    /// Create an idle clock. Call [`SessionClock::start`] before ticking.
    #[must_use]
    pub fn new(strict: bool) -> Self {
        Self {
            total: 0,
            remaining: 0,
            paused: false,
            strict,
            expired: false,
        }
    }

    /// Reset the countdown to `total_seconds` and resume it.
    ///
    /// # Errors
    ///
    /// Returns `ClockError::InvalidDuration` if `total_seconds` is 0.
    pub fn start(&mut self, total_seconds: u32) -> Result<(), ClockError> {
        if total_seconds == 0 {
            return Err(ClockError::InvalidDuration);
        }
        self.total = total_seconds;
        self.remaining = total_seconds;
        self.paused = false;
        self.expired = false;
        Ok(())
    }

    /// Advance the clock by one second.
    ///
    /// Returns `true` only on the call that brings the remaining time to zero.
    pub fn tick(&mut self) -> bool {
        if self.paused || self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        if self.remaining == 0 && !self.expired {
            self.expired = true;
            return true;
        }
        false
    }

    /// Freeze the countdown. Pausing an already paused clock is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ClockError::PauseNotAllowed` on a strict clock.
    pub fn pause(&mut self) -> Result<(), ClockError> {
        if self.strict {
            return Err(ClockError::PauseNotAllowed);
        }
        self.paused = true;
        Ok(())
    }

    /// Unfreeze the countdown.
    ///
    /// # Errors
    ///
    /// Returns `ClockError::PauseNotAllowed` on a strict clock.
    pub fn resume(&mut self) -> Result<(), ClockError> {
        if self.strict {
            return Err(ClockError::PauseNotAllowed);
        }
        self.paused = false;
        Ok(())
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn elapsed(&self) -> u32 {
        self.total - self.remaining
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    #[must_use]
    pub fn has_expired(&self) -> bool {
        self.expired
    }

    #[must_use]
    pub fn urgency(&self) -> TimeUrgency {
        if self.total == 0 {
            return TimeUrgency::Critical;
        }
        // remaining / total > 1/2 and > 1/4 without floats
        let remaining = u64::from(self.remaining);
        let total = u64::from(self.total);
        if remaining * 2 > total {
            TimeUrgency::Plenty
        } else if remaining * 4 > total {
            TimeUrgency::Low
        } else {
            TimeUrgency::Critical
        }
    }
}

/// Format seconds as `m:ss`.
#[must_use]
pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
