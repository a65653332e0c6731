//! Core logic for a periodic "did I do the thing" tracker.
//!
//! Owns the reset-boundary arithmetic, the finalization state machine and the
//! scheduling/reconciliation discipline around them. Host shells (widget,
//! app, CLI) only call into the services exported here.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schedule;
pub mod service;

pub use config::{ConfigError, PeriodConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::history::{CompletionEvent, FinalizedDay, MetadataKey};
pub use model::state::{StateSnapshot, WidgetState};
pub use repo::history_repo::{HistoryStore, SqliteHistoryStore};
pub use repo::state_repo::{
    update_state, RepoError, RepoResult, SqliteStateStore, StateStore,
};
pub use schedule::boundary::{BoundaryError, PeriodWindow};
pub use schedule::trigger::{
    HostWakeup, ScheduleOutcome, TriggerScheduler, WakeupDenied, WakeupMechanism,
};
pub use service::action_service::{
    ActionHandler, MarkDoneOutcome, MarkDoneReport, UndoOutcome, UndoReport,
};
pub use service::finalize_service::{
    EvaluationReport, FinalizationEngine, FinalizedBoundary, TrackerError, TrackerResult,
};
pub use service::settings_service::{SettingsReport, SettingsService};
pub use service::view_service::{CalendarView, DisplayState, ViewService};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
