//! Cadence configuration for the tracked commitment.
//!
//! # Responsibility
//! - Define the period length and reset-of-day time shared by every boundary
//!   computation.
//! - Validate user-supplied values before they reach persistence.
//!
//! # Invariants
//! - `period_days` is in `1..=90`.
//! - `reset_hour` is in `0..=23`, `reset_minute` in `0..=59`.
//! - Absent configuration falls back to `PeriodConfig::default()` (1 day, 04:00).

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const DEFAULT_PERIOD_DAYS: u16 = 1;
pub const MIN_PERIOD_DAYS: u16 = 1;
pub const MAX_PERIOD_DAYS: u16 = 90;
pub const DEFAULT_RESET_HOUR: u8 = 4;
pub const DEFAULT_RESET_MINUTE: u8 = 0;

/// Validation error for cadence configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    PeriodDaysOutOfRange(i64),
    ResetHourOutOfRange(i64),
    ResetMinuteOutOfRange(i64),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PeriodDaysOutOfRange(value) => write!(
                f,
                "period_days must be in {MIN_PERIOD_DAYS}..={MAX_PERIOD_DAYS}, got {value}"
            ),
            Self::ResetHourOutOfRange(value) => {
                write!(f, "reset_hour must be in 0..=23, got {value}")
            }
            Self::ResetMinuteOutOfRange(value) => {
                write!(f, "reset_minute must be in 0..=59, got {value}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Period length plus the daily wall-clock instant that closes a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodConfig {
    pub period_days: u16,
    pub reset_hour: u8,
    pub reset_minute: u8,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            period_days: DEFAULT_PERIOD_DAYS,
            reset_hour: DEFAULT_RESET_HOUR,
            reset_minute: DEFAULT_RESET_MINUTE,
        }
    }
}

impl PeriodConfig {
    /// Builds a validated configuration.
    ///
    /// Inputs are taken as wide integers so host-provided values can be
    /// range-checked without lossy casts at the call site.
    pub fn new(period_days: i64, reset_hour: i64, reset_minute: i64) -> Result<Self, ConfigError> {
        let period_days = u16::try_from(period_days)
            .ok()
            .filter(|days| (MIN_PERIOD_DAYS..=MAX_PERIOD_DAYS).contains(days))
            .ok_or(ConfigError::PeriodDaysOutOfRange(period_days))?;
        let reset_hour = u8::try_from(reset_hour)
            .ok()
            .filter(|hour| *hour <= 23)
            .ok_or(ConfigError::ResetHourOutOfRange(reset_hour))?;
        let reset_minute = u8::try_from(reset_minute)
            .ok()
            .filter(|minute| *minute <= 59)
            .ok_or(ConfigError::ResetMinuteOutOfRange(reset_minute))?;

        Ok(Self {
            period_days,
            reset_hour,
            reset_minute,
        })
    }

    /// Re-checks a value that may have been built field by field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::new(
            i64::from(self.period_days),
            i64::from(self.reset_hour),
            i64::from(self.reset_minute),
        )
        .map(|_| ())
    }
}
