//! Current-state record.
//!
//! # Responsibility
//! - Hold `is_done`, the `last_changed` anchor and the cadence configuration.
//!
//! # Invariants
//! - `last_changed` anchors the currently open period and changes only on a
//!   mark-done or on a reset clearing `is_done`.
//! - `last_changed == 0` with `is_done == false` is the unused initial state.

use crate::config::PeriodConfig;
use serde::{Deserialize, Serialize};

/// Persisted widget state, one record per install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WidgetState {
    pub is_done: bool,
    /// Epoch milliseconds; `0` means never set.
    pub last_changed: i64,
    #[serde(flatten)]
    pub config: PeriodConfig,
}

impl WidgetState {
    /// Whether the tracker has ever been engaged.
    pub fn is_engaged(&self) -> bool {
        self.last_changed != 0
    }

    /// Copy with `is_done` set and the anchor stamped at `now_ms`.
    pub fn marked_done(&self, now_ms: i64) -> Self {
        Self {
            is_done: true,
            last_changed: now_ms,
            config: self.config,
        }
    }

    /// Copy with `is_done` cleared and the anchor stamped at `now_ms`.
    pub fn reset_at(&self, now_ms: i64) -> Self {
        Self {
            is_done: false,
            last_changed: now_ms,
            config: self.config,
        }
    }
}

/// A consistent read of the state plus the revision it was read at.
///
/// Writers hand `revision` back to `compare_and_set`; a mismatch means
/// another writer got there first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    pub state: WidgetState,
    pub revision: u64,
}
