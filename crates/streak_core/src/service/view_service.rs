//! Read models for the widget face and the history calendar.
//!
//! # Responsibility
//! - Derive what the widget should show from persisted state and `now`.
//! - Assemble the calendar view from finalized days and tracking metadata.
//!
//! # Invariants
//! - Read-only: nothing here writes to either store.
//! - A stored Done whose period has ended is shown as not done, even before
//!   any wake-up ran.

use crate::config::PeriodConfig;
use crate::model::history::{FinalizedDay, MetadataKey};
use crate::repo::history_repo::HistoryStore;
use crate::repo::state_repo::StateStore;
use crate::schedule::boundary::{current_period_start, next_reset_instant, should_reset};
use crate::service::finalize_service::{TrackerError, TrackerResult};
use chrono::{DateTime, NaiveDate, TimeZone};
use serde::Serialize;

/// What the widget should render at a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayState {
    /// Effective state: stored Done and the period still open.
    pub is_done: bool,
    pub stored_is_done: bool,
    pub reset_due: bool,
    pub config: PeriodConfig,
    pub current_period_start_date: NaiveDate,
    /// End of the anchored period; `None` when never engaged.
    pub next_reset_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarView {
    /// Finalized days within the requested range, ascending.
    pub days: Vec<FinalizedDay>,
    pub tracking_start_date: Option<NaiveDate>,
    pub last_finalized_date: Option<NaiveDate>,
    pub current_period_start_date: NaiveDate,
}

pub struct ViewService<'a, S, H>
where
    S: StateStore,
    H: HistoryStore,
{
    state: &'a S,
    history: &'a H,
}

impl<'a, S, H> ViewService<'a, S, H>
where
    S: StateStore,
    H: HistoryStore,
{
    pub fn new(state: &'a S, history: &'a H) -> Self {
        Self { state, history }
    }

    pub fn display_state<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> TrackerResult<DisplayState> {
        let state = self.state.load()?.state;
        let reset_due = should_reset(state.last_changed, &state.config, now)?;
        let next_reset_ms = if state.is_engaged() {
            let next = next_reset_instant(&now.timezone(), state.last_changed, &state.config)?;
            Some(next.timestamp_millis())
        } else {
            None
        };

        Ok(DisplayState {
            is_done: state.is_done && !reset_due,
            stored_is_done: state.is_done,
            reset_due,
            config: state.config,
            current_period_start_date: current_period_start(now, &state.config)?.date_naive(),
            next_reset_ms,
        })
    }

    /// Calendar data for `start..=end`.
    pub fn calendar<Tz: TimeZone>(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        now: &DateTime<Tz>,
    ) -> TrackerResult<CalendarView> {
        if start > end {
            return Err(TrackerError::InvalidDateRange { start, end });
        }
        let config = self.state.load()?.state.config;

        Ok(CalendarView {
            days: self.history.finalized_days_in_range(start, end)?,
            tracking_start_date: self.history.metadata(MetadataKey::TrackingStartDate)?,
            last_finalized_date: self.history.metadata(MetadataKey::LastFinalizedDate)?,
            current_period_start_date: current_period_start(now, &config)?.date_naive(),
        })
    }
}
