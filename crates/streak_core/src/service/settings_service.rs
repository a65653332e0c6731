//! Cadence configuration updates.
//!
//! # Invariants
//! - Only the three config keys change; `is_done` and the anchor are kept.
//! - The next boundary is always recomputed from the configuration in force,
//!   including for a period that was opened under the old one.
//! - The wake-up is re-armed from the new reset-of-day time.

use crate::config::PeriodConfig;
use crate::model::state::WidgetState;
use crate::repo::state_repo::{update_state, StateStore};
use crate::schedule::trigger::{ScheduleOutcome, TriggerScheduler, WakeupMechanism};
use crate::service::finalize_service::TrackerResult;
use chrono::{DateTime, TimeZone};
use log::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsReport {
    pub changed: bool,
    pub schedule: ScheduleOutcome,
    pub state: WidgetState,
}

pub struct SettingsService<'a, S, W>
where
    S: StateStore,
    W: WakeupMechanism,
{
    state: &'a S,
    scheduler: &'a TriggerScheduler<W>,
}

impl<'a, S, W> SettingsService<'a, S, W>
where
    S: StateStore,
    W: WakeupMechanism,
{
    pub fn new(state: &'a S, scheduler: &'a TriggerScheduler<W>) -> Self {
        Self { state, scheduler }
    }

    /// Current persisted configuration (defaults when never configured).
    pub fn config(&self) -> TrackerResult<PeriodConfig> {
        Ok(self.state.load()?.state.config)
    }

    /// Validates and stores `config`, then re-arms the wake-up.
    pub fn update_config<Tz: TimeZone>(
        &self,
        config: PeriodConfig,
        now: &DateTime<Tz>,
    ) -> TrackerResult<SettingsReport> {
        config.validate()?;

        let (changed, stored) = update_state(
            self.state,
            |current: &WidgetState| -> TrackerResult<(Option<WidgetState>, bool)> {
                if current.config == config {
                    return Ok((None, false));
                }
                Ok((
                    Some(WidgetState {
                        config,
                        ..*current
                    }),
                    true,
                ))
            },
        )?;

        let schedule = self.scheduler.rearm(&stored.config, now)?;
        info!(
            "event=settings_update module=service status=ok changed={changed} period_days={} reset_hour={} reset_minute={}",
            stored.config.period_days, stored.config.reset_hour, stored.config.reset_minute
        );

        Ok(SettingsReport {
            changed,
            schedule,
            state: stored,
        })
    }
}
