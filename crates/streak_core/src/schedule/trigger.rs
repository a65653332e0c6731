//! Wake-up scheduling for periodic finalization.
//!
//! # Responsibility
//! - Compute the next daily reset-of-day instant and hand it to the external
//!   wake-up mechanism.
//! - Degrade to manual-only operation when wake-ups are refused.
//!
//! # Invariants
//! - There is at most one pending wake-up: re-arming supersedes, never adds.
//! - A refused wake-up is reported, not raised.
//! - Nothing here assumes a wake-up survives a reboot; boot handling re-arms.

use crate::config::PeriodConfig;
use crate::schedule::boundary::{next_wakeup_from_now, BoundaryResult};
use chrono::{DateTime, TimeZone};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, PoisonError};

/// Delay used for the one-off check requested on app/widget start.
pub const IMMEDIATE_CHECK_DELAY_MS: i64 = 1_000;

/// The wake-up mechanism declined to schedule (e.g. precise alarms disabled).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeupDenied {
    pub reason: String,
}

impl Display for WakeupDenied {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "wake-up denied: {}", self.reason)
    }
}

impl Error for WakeupDenied {}

/// External best-effort wake-up facility.
pub trait WakeupMechanism {
    /// Replaces any pending wake-up with one at `at_ms` (epoch milliseconds).
    fn schedule_at(&self, at_ms: i64) -> Result<(), WakeupDenied>;
    /// Drops the pending wake-up, if any.
    fn cancel(&self);
}

/// Result of asking for a wake-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled { at_ms: i64 },
    Denied { reason: String },
}

impl ScheduleOutcome {
    pub fn scheduled_at(&self) -> Option<i64> {
        match self {
            Self::Scheduled { at_ms } => Some(*at_ms),
            Self::Denied { .. } => None,
        }
    }
}

/// Arms the wake-up mechanism for the next reset-of-day instant.
pub struct TriggerScheduler<W: WakeupMechanism> {
    wakeup: W,
}

impl<W: WakeupMechanism> TriggerScheduler<W> {
    pub fn new(wakeup: W) -> Self {
        Self { wakeup }
    }

    /// Borrow of the underlying mechanism.
    pub fn wakeup(&self) -> &W {
        &self.wakeup
    }

    /// Replaces the pending wake-up with the next daily reset after `now`.
    ///
    /// Period length plays no part here: every daily tick re-evaluates.
    pub fn rearm<Tz: TimeZone>(
        &self,
        config: &PeriodConfig,
        now: &DateTime<Tz>,
    ) -> BoundaryResult<ScheduleOutcome> {
        let at_ms = next_wakeup_from_now(now, config)?.timestamp_millis();
        Ok(self.request(at_ms, now.timestamp_millis(), "rearm"))
    }

    /// Replaces the pending wake-up with a check shortly after `now`.
    pub fn schedule_immediate_check<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> ScheduleOutcome {
        let now_ms = now.timestamp_millis();
        self.request(now_ms + IMMEDIATE_CHECK_DELAY_MS, now_ms, "immediate")
    }

    pub fn cancel(&self) {
        self.wakeup.cancel();
        info!("event=wakeup_cancel module=schedule status=ok");
    }

    fn request(&self, at_ms: i64, now_ms: i64, kind: &'static str) -> ScheduleOutcome {
        match self.wakeup.schedule_at(at_ms) {
            Ok(()) => {
                info!(
                    "event=wakeup_rearm module=schedule status=ok kind={kind} at_ms={at_ms} in_s={}",
                    (at_ms - now_ms) / 1000
                );
                ScheduleOutcome::Scheduled { at_ms }
            }
            Err(denied) => {
                warn!(
                    "event=wakeup_rearm module=schedule status=denied kind={kind} at_ms={at_ms} reason={}",
                    denied.reason
                );
                ScheduleOutcome::Denied {
                    reason: denied.reason,
                }
            }
        }
    }
}

/// Single-slot wake-up whose pending instant is read back by the host shell.
///
/// The host owns the real OS alarm; this type records what it should be set
/// to and whether precise wake-ups are currently permitted.
#[derive(Debug)]
pub struct HostWakeup {
    exact_allowed: bool,
    pending: Mutex<Option<i64>>,
}

impl HostWakeup {
    pub fn new(exact_allowed: bool) -> Self {
        Self {
            exact_allowed,
            pending: Mutex::new(None),
        }
    }

    /// Instant of the pending wake-up, if one is armed.
    pub fn pending(&self) -> Option<i64> {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WakeupMechanism for HostWakeup {
    fn schedule_at(&self, at_ms: i64) -> Result<(), WakeupDenied> {
        if !self.exact_allowed {
            return Err(WakeupDenied {
                reason: "exact wake-ups not permitted".to_string(),
            });
        }
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(at_ms);
        Ok(())
    }

    fn cancel(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
