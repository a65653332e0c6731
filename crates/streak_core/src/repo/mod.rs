//! Repository layer: store contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define the capability sets the services depend on (`StateStore`,
//!   `HistoryStore`) so tests can substitute in-memory fakes.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`InvalidData`, `Conflict`) in
//!   addition to DB transport errors.

pub mod history_repo;
pub mod state_repo;
