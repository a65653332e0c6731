//! History records.
//!
//! # Responsibility
//! - Define completion events, finalized days and tracking metadata keys.
//!
//! # Invariants
//! - A `FinalizedDay` is keyed by calendar date and is write-once.
//! - `LastFinalizedDate` never moves backward.
//! - `TrackingStartDate` is set once, on the first-ever completion.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One successful "mark done" transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub id: i64,
    /// Epoch milliseconds of the mark-done action.
    pub timestamp_ms: i64,
    /// Cadence in effect when the event was recorded.
    pub period_days: u16,
}

/// Immutable outcome for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedDay {
    pub date: NaiveDate,
    pub completed: bool,
}

/// Single-valued tracking metadata entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    TrackingStartDate,
    LastFinalizedDate,
}

impl MetadataKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TrackingStartDate => "tracking_start_date",
            Self::LastFinalizedDate => "last_finalized_date",
        }
    }
}
