//! Finalization engine: the periodic reconciliation pass.
//!
//! # Responsibility
//! - Decide from persisted state whether a period boundary has been crossed.
//! - Record the outcome of every crossed boundary exactly once.
//! - Clear a stale `is_done` and re-arm the next wake-up.
//!
//! # Invariants
//! - Outcomes are derived from persisted state only; the engine never trusts
//!   that it was invoked at the "right" time.
//! - Each crossed boundary is finalized separately, in ascending order; none
//!   are merged or skipped.
//! - A storage failure leaves the watermark where the last successful
//!   boundary put it, and the state untouched; the next evaluation retries.
//! - The scheduler is re-armed on every exit path.

use crate::config::ConfigError;
use crate::model::history::{FinalizedDay, MetadataKey};
use crate::model::state::WidgetState;
use crate::repo::history_repo::HistoryStore;
use crate::repo::state_repo::{update_state, RepoError, StateStore};
use crate::schedule::boundary::{crossed_boundaries, should_reset, BoundaryError};
use crate::schedule::trigger::{ScheduleOutcome, TriggerScheduler, WakeupMechanism};
use chrono::{DateTime, NaiveDate, TimeZone};
use log::{debug, error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TrackerResult<T> = Result<T, TrackerError>;

/// Service-level error for tracker use-cases.
#[derive(Debug)]
pub enum TrackerError {
    Repo(RepoError),
    Boundary(BoundaryError),
    Config(ConfigError),
    /// Calendar query with `start > end`.
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

impl Display for TrackerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Boundary(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::InvalidDateRange { start, end } => {
                write!(f, "invalid date range: {start} is after {end}")
            }
        }
    }
}

impl Error for TrackerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Boundary(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::InvalidDateRange { .. } => None,
        }
    }
}

impl From<RepoError> for TrackerError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<BoundaryError> for TrackerError {
    fn from(value: BoundaryError) -> Self {
        Self::Boundary(value)
    }
}

impl From<ConfigError> for TrackerError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Outcome recorded for one crossed boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedBoundary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub completed: bool,
    /// Day rows actually inserted; days finalized earlier are not rewritten.
    pub days_written: usize,
}

/// Result of one evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationReport {
    pub reset_due: bool,
    pub finalized: Vec<FinalizedBoundary>,
    /// Whether this pass cleared a stale `is_done`.
    pub auto_reset: bool,
    pub schedule: ScheduleOutcome,
    /// State as stored after the pass.
    pub state: WidgetState,
}

/// Periodic evaluation over injected stores and scheduler.
pub struct FinalizationEngine<'a, S, H, W>
where
    S: StateStore,
    H: HistoryStore,
    W: WakeupMechanism,
{
    state: &'a S,
    history: &'a H,
    scheduler: &'a TriggerScheduler<W>,
}

impl<'a, S, H, W> FinalizationEngine<'a, S, H, W>
where
    S: StateStore,
    H: HistoryStore,
    W: WakeupMechanism,
{
    pub fn new(state: &'a S, history: &'a H, scheduler: &'a TriggerScheduler<W>) -> Self {
        Self {
            state,
            history,
            scheduler,
        }
    }

    /// Wake-up entry point: finalize crossed boundaries, clear a stale Done,
    /// re-arm.
    pub fn evaluate<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> TrackerResult<EvaluationReport> {
        let now_ms = now.timestamp_millis();
        let snapshot = self.state.load()?;
        let loaded = snapshot.state;
        let reset_due = should_reset(loaded.last_changed, &loaded.config, now)?;

        if !reset_due {
            let schedule = self.scheduler.rearm(&loaded.config, now)?;
            debug!("event=evaluate module=service status=skip now_ms={now_ms}");
            return Ok(EvaluationReport {
                reset_due,
                finalized: Vec::new(),
                auto_reset: false,
                schedule,
                state: loaded,
            });
        }

        let finalized = match self.finalize_pending(&loaded, now) {
            Ok(finalized) => finalized,
            Err(err) => return Err(self.rearm_after_failure(&loaded, now, err)),
        };

        let cleared = update_state(
            self.state,
            |current: &WidgetState| -> TrackerResult<(Option<WidgetState>, bool)> {
                let due = should_reset(current.last_changed, &current.config, now)?;
                if current.is_done && due {
                    Ok((Some(current.reset_at(now_ms)), true))
                } else {
                    Ok((None, false))
                }
            },
        );
        let (auto_reset, stored) = match cleared {
            Ok(result) => result,
            Err(err) => return Err(self.rearm_after_failure(&loaded, now, err)),
        };
        if auto_reset {
            info!("event=auto_reset module=service status=ok now_ms={now_ms}");
        }

        let schedule = self.scheduler.rearm(&stored.config, now)?;
        info!(
            "event=evaluate module=service status=ok boundaries={} auto_reset={}",
            finalized.len(),
            auto_reset
        );

        Ok(EvaluationReport {
            reset_due,
            finalized,
            auto_reset,
            schedule,
            state: stored,
        })
    }

    /// Boot entry point: re-arm from persisted configuration, then evaluate
    /// once, since wake-ups armed before the restart are gone.
    pub fn handle_boot<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> TrackerResult<EvaluationReport> {
        let snapshot = self.state.load()?;
        self.scheduler.rearm(&snapshot.state.config, now)?;
        info!(
            "event=boot module=service status=start now_ms={}",
            now.timestamp_millis()
        );
        self.evaluate(now)
    }

    /// Writes outcomes for every boundary crossed since `state.last_changed`
    /// that lies beyond the `last_finalized_date` watermark.
    ///
    /// Does nothing until tracking has started. Safe to call repeatedly.
    pub fn finalize_pending<Tz: TimeZone>(
        &self,
        state: &WidgetState,
        now: &DateTime<Tz>,
    ) -> TrackerResult<Vec<FinalizedBoundary>> {
        if self
            .history
            .metadata(MetadataKey::TrackingStartDate)?
            .is_none()
        {
            debug!("event=finalize_boundary module=service status=skip reason=tracking_not_started");
            return Ok(Vec::new());
        }
        let watermark = self.history.metadata(MetadataKey::LastFinalizedDate)?;

        let mut finalized = Vec::new();
        let pending = crossed_boundaries(state.last_changed, &state.config, now)?
            .into_iter()
            .filter(|window| watermark.map_or(true, |mark| window.end_date > mark));
        for window in pending {
            let completed = !self
                .history
                .completions_in_range(window.start.timestamp_millis(), window.end.timestamp_millis())?
                .is_empty();
            let days = window
                .dates()
                .map(|date| FinalizedDay { date, completed })
                .collect::<Vec<_>>();
            let days_written = self.history.finalize_period(&days, window.end_date)?;
            info!(
                "event=finalize_boundary module=service status=ok start_date={} end_date={} completed={} days_written={}",
                window.start_date, window.end_date, completed, days_written
            );
            finalized.push(FinalizedBoundary {
                start_date: window.start_date,
                end_date: window.end_date,
                completed,
                days_written,
            });
        }

        if finalized.len() > 1 {
            info!(
                "event=finalize_catch_up module=service status=ok boundaries={}",
                finalized.len()
            );
        }
        Ok(finalized)
    }

    fn rearm_after_failure<Tz: TimeZone>(
        &self,
        state: &WidgetState,
        now: &DateTime<Tz>,
        err: TrackerError,
    ) -> TrackerError {
        error!("event=evaluate module=service status=error error={err}");
        if let Err(rearm_err) = self.scheduler.rearm(&state.config, now) {
            error!("event=wakeup_rearm module=service status=error error={rearm_err}");
        }
        err
    }
}
