//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `streak_core` linkage.
//! - Print where the next wake-up would land under the default cadence.

use chrono::Local;
use streak_core::db::open_db_in_memory;
use streak_core::{
    FinalizationEngine, HostWakeup, SqliteHistoryStore, SqliteStateStore, TriggerScheduler,
};

fn main() {
    println!("streak_core ping={}", streak_core::ping());
    println!("streak_core version={}", streak_core::core_version());

    match probe_next_wakeup() {
        Ok(Some(at_ms)) => println!("streak_core next_wakeup_ms={at_ms}"),
        Ok(None) => println!("streak_core next_wakeup_ms=none"),
        Err(err) => {
            eprintln!("streak_core probe failed: {err}");
            std::process::exit(1);
        }
    }
}

/// Runs one evaluation against a throwaway database and returns the armed
/// wake-up instant.
fn probe_next_wakeup() -> Result<Option<i64>, Box<dyn std::error::Error>> {
    let conn = open_db_in_memory()?;
    let state = SqliteStateStore::try_new(&conn)?;
    let history = SqliteHistoryStore::try_new(&conn)?;
    let scheduler = TriggerScheduler::new(HostWakeup::new(true));

    FinalizationEngine::new(&state, &history, &scheduler).evaluate(&Local::now())?;
    Ok(scheduler.wakeup().pending())
}
