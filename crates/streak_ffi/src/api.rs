//! FFI use-case API for the widget and app shells.
//!
//! # Responsibility
//! - Expose the tracker entry points (tap, wake-up, boot, settings, history)
//!   as sync FRB calls over the shared on-device database.
//! - Hand the host the wake-up instant it must arm after every call.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - Every call re-derives truth from persisted state; nothing is cached
//!   between calls except the database path.
//! - `next_wakeup_ms` is `None` when no wake-up should be (re)armed, either
//!   because the call did not touch scheduling or exact wake-ups are denied.

use chrono::{Local, NaiveDate};
use log::warn;
use streak_core::db::open_db;
use streak_core::{
    core_version as core_version_inner, default_log_level as default_log_level_inner,
    init_logging as init_logging_inner, ping as ping_inner, ActionHandler, FinalizationEngine,
    HostWakeup, MarkDoneOutcome, PeriodConfig, SettingsService, SqliteHistoryStore,
    SqliteStateStore, TrackerResult, TriggerScheduler, UndoOutcome, ViewService,
};
use std::path::PathBuf;
use std::sync::OnceLock;

const TRACKER_DB_FILE_NAME: &str = "streak.sqlite3";
const DATE_FORMAT: &str = "%Y-%m-%d";
static TRACKER_DB_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Log level the host should pass to [`init_logging`] absent a user choice.
#[flutter_rust_bridge::frb(sync)]
pub fn default_log_level() -> String {
    default_log_level_inner().to_owned()
}

/// Result envelope for state-changing tracker calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerActionResponse {
    /// Whether the call succeeded.
    pub ok: bool,
    /// Stored `is_done` after the call.
    pub is_done: bool,
    /// Epoch millis the host should arm its wake-up for.
    pub next_wakeup_ms: Option<i64>,
    /// Short machine-friendly outcome or error message.
    pub message: String,
}

impl TrackerActionResponse {
    fn success(message: impl Into<String>, is_done: bool, next_wakeup_ms: Option<i64>) -> Self {
        Self {
            ok: true,
            is_done,
            next_wakeup_ms,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>, next_wakeup_ms: Option<i64>) -> Self {
        Self {
            ok: false,
            is_done: false,
            next_wakeup_ms,
            message: message.into(),
        }
    }
}

/// What the widget face should show right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerDisplayResponse {
    pub ok: bool,
    /// Effective Done: stored Done whose period is still open.
    pub is_done: bool,
    pub period_days: u16,
    pub reset_hour: u8,
    pub reset_minute: u8,
    /// `YYYY-MM-DD` start date of the period containing now.
    pub current_period_start_date: String,
    pub next_reset_ms: Option<i64>,
    pub message: String,
}

/// One finalized calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDayItem {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub completed: bool,
}

/// Calendar response for a `start..=end` date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerCalendarResponse {
    pub ok: bool,
    pub days: Vec<CalendarDayItem>,
    pub tracking_start_date: Option<String>,
    pub last_finalized_date: Option<String>,
    pub message: String,
}

/// Handles a tap on the widget.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Finalizes any missed boundaries before applying the tap.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_mark_done(exact_alarms_allowed: bool) -> TrackerActionResponse {
    let now = Local::now();
    run_tracker_call(
        "tracker_mark_done",
        exact_alarms_allowed,
        |state, history, scheduler| {
            let report = ActionHandler::new(state, history, scheduler).mark_done(&now)?;
            let message = match report.outcome {
                MarkDoneOutcome::AcknowledgedReset => "acknowledged_reset",
                MarkDoneOutcome::MarkedDone { .. } => "marked_done",
                MarkDoneOutcome::AlreadyDone => "already_done",
            };
            Ok((message, report.state.is_done))
        },
    )
}

/// Wake-up callback: finalize crossed boundaries, clear a stale Done, re-arm.
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_on_wakeup(exact_alarms_allowed: bool) -> TrackerActionResponse {
    let now = Local::now();
    run_tracker_call(
        "tracker_on_wakeup",
        exact_alarms_allowed,
        |state, history, scheduler| {
            let report = FinalizationEngine::new(state, history, scheduler).evaluate(&now)?;
            let message = if report.auto_reset {
                "reset"
            } else if report.reset_due {
                "finalized"
            } else {
                "idle"
            };
            Ok((message, report.state.is_done))
        },
    )
}

/// Boot signal: re-arm from persisted configuration and evaluate once.
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_on_boot(exact_alarms_allowed: bool) -> TrackerActionResponse {
    let now = Local::now();
    run_tracker_call(
        "tracker_on_boot",
        exact_alarms_allowed,
        |state, history, scheduler| {
            let report = FinalizationEngine::new(state, history, scheduler).handle_boot(&now)?;
            Ok(("booted", report.state.is_done))
        },
    )
}

/// Reverts a mark made in the still-open period.
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_undo(exact_alarms_allowed: bool) -> TrackerActionResponse {
    let now = Local::now();
    run_tracker_call("tracker_undo", exact_alarms_allowed, |state, history, scheduler| {
        let report = ActionHandler::new(state, history, scheduler).undo_current_period(&now)?;
        let message = match report.outcome {
            UndoOutcome::Undone { .. } => "undone",
            UndoOutcome::NothingToUndo => "nothing_to_undo",
            UndoOutcome::PeriodEnded => "period_ended",
        };
        Ok((message, report.state.is_done))
    })
}

/// Validates and stores a new cadence, then re-arms.
///
/// Out-of-range values are rejected with a message naming the field.
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_update_settings(
    period_days: i64,
    reset_hour: i64,
    reset_minute: i64,
    exact_alarms_allowed: bool,
) -> TrackerActionResponse {
    let config = match PeriodConfig::new(period_days, reset_hour, reset_minute) {
        Ok(config) => config,
        Err(err) => {
            return TrackerActionResponse::failure(
                format!("tracker_update_settings failed: {err}"),
                None,
            );
        }
    };
    let now = Local::now();
    run_tracker_call(
        "tracker_update_settings",
        exact_alarms_allowed,
        |state, _history, scheduler| {
            let report = SettingsService::new(state, scheduler).update_config(config, &now)?;
            let message = if report.changed { "updated" } else { "unchanged" };
            Ok((message, report.state.is_done))
        },
    )
}

/// Asks for an evaluation about a second from now, e.g. right after exact
/// wake-ups were granted.
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_schedule_immediate_check(exact_alarms_allowed: bool) -> TrackerActionResponse {
    let now = Local::now();
    run_tracker_call(
        "tracker_schedule_immediate_check",
        exact_alarms_allowed,
        |state, history, scheduler| {
            let stored = ViewService::new(state, history).display_state(&now)?;
            scheduler.schedule_immediate_check(&now);
            Ok(("scheduled", stored.stored_is_done))
        },
    )
}

/// Drops the pending wake-up, e.g. when the last widget instance is removed.
///
/// Returns message `cancelled` with no `next_wakeup_ms`; the host cancels its
/// OS alarm. Stored state is not touched.
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_cancel() -> TrackerActionResponse {
    run_tracker_call("tracker_cancel", false, |state, history, scheduler| {
        scheduler.cancel();
        let stored = ViewService::new(state, history).display_state(&Local::now())?;
        Ok(("cancelled", stored.stored_is_done))
    })
}

/// Deletes completion events, finalized days and tracking metadata.
///
/// The current state is left as is, so no wake-up change is requested.
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_clear_history() -> TrackerActionResponse {
    run_tracker_call("tracker_clear_history", false, |state, history, scheduler| {
        ActionHandler::new(state, history, scheduler).clear_history()?;
        let stored = ViewService::new(state, history).display_state(&Local::now())?;
        Ok(("cleared", stored.stored_is_done))
    })
}

/// Widget face state at the current instant.
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_display_state() -> TrackerDisplayResponse {
    let now = Local::now();
    let display = with_tracker_db(|state, history| {
        ViewService::new(state, history)
            .display_state(&now)
            .map_err(|err| err.to_string())
    });

    match display {
        Ok(display) => TrackerDisplayResponse {
            ok: true,
            is_done: display.is_done,
            period_days: display.config.period_days,
            reset_hour: display.config.reset_hour,
            reset_minute: display.config.reset_minute,
            current_period_start_date: format_date(display.current_period_start_date),
            next_reset_ms: display.next_reset_ms,
            message: String::new(),
        },
        Err(err) => {
            warn!("event=ffi_call module=ffi status=error op=tracker_display_state error={err}");
            let defaults = PeriodConfig::default();
            TrackerDisplayResponse {
                ok: false,
                is_done: false,
                period_days: defaults.period_days,
                reset_hour: defaults.reset_hour,
                reset_minute: defaults.reset_minute,
                current_period_start_date: String::new(),
                next_reset_ms: None,
                message: format!("tracker_display_state failed: {err}"),
            }
        }
    }
}

/// Finalized days in `start_date..=end_date` (`YYYY-MM-DD`, inclusive).
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_calendar(start_date: String, end_date: String) -> TrackerCalendarResponse {
    let range = parse_date(&start_date).and_then(|start| Ok((start, parse_date(&end_date)?)));
    let calendar = range.and_then(|(start, end)| {
        with_tracker_db(|state, history| {
            ViewService::new(state, history)
                .calendar(start, end, &Local::now())
                .map_err(|err| err.to_string())
        })
    });

    match calendar {
        Ok(view) => TrackerCalendarResponse {
            ok: true,
            days: view
                .days
                .into_iter()
                .map(|day| CalendarDayItem {
                    date: format_date(day.date),
                    completed: day.completed,
                })
                .collect(),
            tracking_start_date: view.tracking_start_date.map(format_date),
            last_finalized_date: view.last_finalized_date.map(format_date),
            message: String::new(),
        },
        Err(err) => TrackerCalendarResponse {
            ok: false,
            days: Vec::new(),
            tracking_start_date: None,
            last_finalized_date: None,
            message: format!("tracker_calendar failed: {err}"),
        },
    }
}

type SchedulerHandle = TriggerScheduler<HostWakeup>;

fn run_tracker_call(
    op: &'static str,
    exact_alarms_allowed: bool,
    f: impl FnOnce(
        &SqliteStateStore<'_>,
        &SqliteHistoryStore<'_>,
        &SchedulerHandle,
    ) -> TrackerResult<(&'static str, bool)>,
) -> TrackerActionResponse {
    let scheduler = TriggerScheduler::new(HostWakeup::new(exact_alarms_allowed));
    let result = with_tracker_db(|state, history| {
        f(state, history, &scheduler).map_err(|err| err.to_string())
    });
    // A failed pass may still have re-armed; the host must honour that.
    let next_wakeup_ms = scheduler.wakeup().pending();

    match result {
        Ok((message, is_done)) => TrackerActionResponse::success(message, is_done, next_wakeup_ms),
        Err(err) => {
            warn!("event=ffi_call module=ffi status=error op={op} error={err}");
            TrackerActionResponse::failure(format!("{op} failed: {err}"), next_wakeup_ms)
        }
    }
}

fn with_tracker_db<T>(
    f: impl FnOnce(&SqliteStateStore<'_>, &SqliteHistoryStore<'_>) -> Result<T, String>,
) -> Result<T, String> {
    let db_path = resolve_tracker_db_path();
    let conn = open_db(&db_path).map_err(|err| format!("tracker DB open failed: {err}"))?;
    let state = SqliteStateStore::try_new(&conn)
        .map_err(|err| format!("state store init failed: {err}"))?;
    let history = SqliteHistoryStore::try_new(&conn)
        .map_err(|err| format!("history store init failed: {err}"))?;
    f(&state, &history)
}

fn resolve_tracker_db_path() -> PathBuf {
    TRACKER_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("STREAK_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(TRACKER_DB_FILE_NAME)
        })
        .clone()
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| format!("invalid date `{}`; expected YYYY-MM-DD", raw.trim()))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
