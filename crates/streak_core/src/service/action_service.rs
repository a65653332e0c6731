//! User-triggered transitions: mark done, undo, clear history.
//!
//! # Responsibility
//! - Apply the single "mark done" transition atomically.
//! - Undo a mark within the still-open period.
//! - Wipe history on explicit request.
//!
//! # Invariants
//! - Crossed-but-unfinalized boundaries are finalized before the anchor moves,
//!   so a tap after missed wake-ups cannot erase a period's outcome.
//! - A tap on a stale Done acknowledges the rollover instead of marking.
//! - Exactly one completion event is appended per Do -> Done transition.
//! - Undo never touches finalized-day rows; clear never touches the current
//!   state.

use crate::model::state::WidgetState;
use crate::repo::history_repo::HistoryStore;
use crate::repo::state_repo::{update_state, StateStore};
use crate::schedule::boundary::{current_period_start, should_reset};
use crate::schedule::trigger::{ScheduleOutcome, TriggerScheduler, WakeupMechanism};
use crate::service::finalize_service::{
    FinalizationEngine, FinalizedBoundary, TrackerError, TrackerResult,
};
use chrono::{DateTime, TimeZone};
use log::{error, info};

/// What a mark-done tap did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkDoneOutcome {
    /// `is_done` was stale; the tap cleared it like an automatic reset would.
    AcknowledgedReset,
    /// Do -> Done, with the id of the appended completion event.
    MarkedDone { event_id: i64 },
    /// Already Done within the open period; nothing changed.
    AlreadyDone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkDoneReport {
    pub outcome: MarkDoneOutcome,
    /// Boundaries finalized as catch-up before the transition.
    pub finalized: Vec<FinalizedBoundary>,
    /// `None` when nothing changed and no re-arm was needed.
    pub schedule: Option<ScheduleOutcome>,
    pub state: WidgetState,
}

/// What an undo request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    Undone { events_deleted: usize },
    /// Not marked done; nothing to undo.
    NothingToUndo,
    /// The marked period already ended; its outcome belongs to finalization.
    PeriodEnded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoReport {
    pub outcome: UndoOutcome,
    pub schedule: Option<ScheduleOutcome>,
    pub state: WidgetState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    AcknowledgeReset,
    MarkDone { previous: WidgetState },
    Noop,
}

/// Handler for user gestures against the current state.
pub struct ActionHandler<'a, S, H, W>
where
    S: StateStore,
    H: HistoryStore,
    W: WakeupMechanism,
{
    state: &'a S,
    history: &'a H,
    scheduler: &'a TriggerScheduler<W>,
}

impl<'a, S, H, W> ActionHandler<'a, S, H, W>
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

    /// Handles the "mark done" gesture at `now`.
    ///
    /// # Errors
    /// - Catch-up finalization failure aborts before any state change.
    /// - A failed completion append rolls the state back when no other writer
    ///   has touched it since.
    pub fn mark_done<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> TrackerResult<MarkDoneReport> {
        let now_ms = now.timestamp_millis();
        let finalized = self.catch_up(now)?;

        let (transition, stored) = update_state(
            self.state,
            |current: &WidgetState| -> TrackerResult<(Option<WidgetState>, Transition)> {
                let due = should_reset(current.last_changed, &current.config, now)?;
                Ok(match (current.is_done, due) {
                    (true, true) => (Some(current.reset_at(now_ms)), Transition::AcknowledgeReset),
                    (false, _) => (
                        Some(current.marked_done(now_ms)),
                        Transition::MarkDone { previous: *current },
                    ),
                    (true, false) => (None, Transition::Noop),
                })
            },
        )?;

        let outcome = match transition {
            Transition::AcknowledgeReset => {
                info!("event=mark_done module=service status=ok action=acknowledge_reset now_ms={now_ms}");
                MarkDoneOutcome::AcknowledgedReset
            }
            Transition::MarkDone { previous } => {
                let event_id = self.record_completion(&previous, &stored, now)?;
                info!("event=mark_done module=service status=ok action=mark event_id={event_id} now_ms={now_ms}");
                MarkDoneOutcome::MarkedDone { event_id }
            }
            Transition::Noop => {
                info!("event=mark_done module=service status=skip reason=already_done");
                return Ok(MarkDoneReport {
                    outcome: MarkDoneOutcome::AlreadyDone,
                    finalized,
                    schedule: None,
                    state: stored,
                });
            }
        };

        let schedule = self.scheduler.rearm(&stored.config, now)?;
        Ok(MarkDoneReport {
            outcome,
            finalized,
            schedule: Some(schedule),
            state: stored,
        })
    }

    /// Reverts a mark made in the still-open period ("reset to Do").
    ///
    /// Deletes completion events in `[current_period_start, now]`, then clears
    /// `is_done`. Unavailable once the period has ended. A failed delete leaves
    /// the state untouched so the undo can be retried.
    pub fn undo_current_period<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> TrackerResult<UndoReport> {
        let now_ms = now.timestamp_millis();
        let snapshot = self.state.load()?;
        if let Some(outcome) = undo_refusal(&snapshot.state, now)? {
            info!("event=undo module=service status=skip outcome={outcome:?}");
            return Ok(UndoReport {
                outcome,
                schedule: None,
                state: snapshot.state,
            });
        }

        let period_start = current_period_start(now, &snapshot.state.config)?.timestamp_millis();
        let events_deleted = self
            .history
            .delete_completions_in_range(period_start, now_ms + 1)
            .map_err(|err| {
                error!("event=undo module=service status=error step=delete error={err}");
                err
            })?;

        let (refusal, stored) = update_state(
            self.state,
            |current: &WidgetState| -> TrackerResult<(Option<WidgetState>, Option<UndoOutcome>)> {
                Ok(match undo_refusal(current, now)? {
                    Some(outcome) => (None, Some(outcome)),
                    None => (Some(current.reset_at(now_ms)), None),
                })
            },
        )?;
        if let Some(outcome) = refusal {
            info!("event=undo module=service status=skip outcome={outcome:?} events_deleted={events_deleted}");
            return Ok(UndoReport {
                outcome,
                schedule: None,
                state: stored,
            });
        }
        info!(
            "event=undo module=service status=ok period_start_ms={period_start} events_deleted={events_deleted}"
        );

        let schedule = self.scheduler.rearm(&stored.config, now)?;
        Ok(UndoReport {
            outcome: UndoOutcome::Undone { events_deleted },
            schedule: Some(schedule),
            state: stored,
        })
    }

    /// Deletes all completion events, finalized days and metadata.
    ///
    /// The current state (is_done, anchor, cadence) is left as is.
    pub fn clear_history(&self) -> TrackerResult<()> {
        self.history.clear_all()?;
        info!("event=clear_history module=service status=ok");
        Ok(())
    }

    fn catch_up<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> TrackerResult<Vec<FinalizedBoundary>> {
        let snapshot = self.state.load()?;
        if !should_reset(snapshot.state.last_changed, &snapshot.state.config, now)? {
            return Ok(Vec::new());
        }
        FinalizationEngine::new(self.state, self.history, self.scheduler)
            .finalize_pending(&snapshot.state, now)
    }

    fn record_completion<Tz: TimeZone>(
        &self,
        previous: &WidgetState,
        written: &WidgetState,
        now: &DateTime<Tz>,
    ) -> TrackerResult<i64> {
        let recorded = self.history.record_completion(
            now.timestamp_millis(),
            written.config.period_days,
            now.date_naive(),
        );

        match recorded {
            Ok(event_id) => Ok(event_id),
            Err(err) => {
                error!("event=mark_done module=service status=error step=record error={err}");
                self.roll_back_mark(previous, written)?;
                Err(TrackerError::Repo(err))
            }
        }
    }

    /// Restores `previous` if the state still holds the mark we wrote.
    fn roll_back_mark(&self, previous: &WidgetState, written: &WidgetState) -> TrackerResult<()> {
        update_state(
            self.state,
            |current: &WidgetState| -> TrackerResult<(Option<WidgetState>, ())> {
                if current == written {
                    Ok((Some(*previous), ()))
                } else {
                    Ok((None, ()))
                }
            },
        )
        .map(|_| ())
        .map_err(|err| {
            error!("event=mark_done module=service status=error step=rollback error={err}");
            err
        })
    }
}

/// Why undo does not apply to `state` at `now`, if it does not.
fn undo_refusal<Tz: TimeZone>(
    state: &WidgetState,
    now: &DateTime<Tz>,
) -> TrackerResult<Option<UndoOutcome>> {
    if !state.is_done {
        return Ok(Some(UndoOutcome::NothingToUndo));
    }
    if should_reset(state.last_changed, &state.config, now)? {
        return Ok(Some(UndoOutcome::PeriodEnded));
    }
    Ok(None)
}
