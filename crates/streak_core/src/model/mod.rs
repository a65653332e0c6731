//! Domain records for the tracked commitment.
//!
//! # Responsibility
//! - `state`: the mutable current-state record and its snapshot envelope.
//! - `history`: append-only completion events, write-once finalized days and
//!   tracking metadata keys.
//!
//! # Invariants
//! - Finalized days are never updated once written.
//! - Completion events are only removed by undo or a full history wipe.

pub mod history;
pub mod state;
