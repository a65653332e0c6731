//! Time-boundary arithmetic and wake-up scheduling.
//!
//! # Responsibility
//! - `boundary`: pure reset-boundary calculations over injected `now`.
//! - `trigger`: re-armable single-slot wake-up scheduling.
//!
//! # Invariants
//! - Nothing in this module reads the system clock.

pub mod boundary;
pub mod trigger;
