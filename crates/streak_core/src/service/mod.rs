//! Core use-case services.
//!
//! # Responsibility
//! - `finalize_service`: wake-up/boot reconciliation and period finalization.
//! - `action_service`: mark done, undo, clear history.
//! - `settings_service`: cadence configuration updates.
//! - `view_service`: widget and calendar read models.
//!
//! # Invariants
//! - Services depend on store traits only and stay storage-agnostic.
//! - Every current-state mutation goes through `update_state`.

pub mod action_service;
pub mod finalize_service;
pub mod settings_service;
pub mod view_service;
