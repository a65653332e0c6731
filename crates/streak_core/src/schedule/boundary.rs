//! Reset-boundary arithmetic.
//!
//! # Responsibility
//! - Turn `(last_changed, period, reset-of-day, now)` into boundary instants,
//!   period windows and wake-up instants.
//!
//! # Invariants
//! - Every function is pure: the time zone and `now` are always parameters.
//! - Day arithmetic happens on calendar dates and is re-resolved in `tz`, so
//!   wall-clock reset time is preserved across DST shifts.
//! - A `last_changed` earlier than its own day's reset instant belongs to the
//!   previous logical day.

use crate::config::{ConfigError, PeriodConfig};
use chrono::{DateTime, Days, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Longest DST gap we step across when a reset time does not exist locally.
const MAX_GAP_MINUTES: u32 = 180;

pub type BoundaryResult<T> = Result<T, BoundaryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryError {
    /// Epoch milliseconds outside chrono's representable range.
    OutOfRange(i64),
    /// Day arithmetic starting from this date left the representable range.
    DateOutOfRange(NaiveDate),
    /// A hand-built configuration that never went through validation.
    InvalidConfig(ConfigError),
    /// No valid local instant within `MAX_GAP_MINUTES` of the reset time.
    UnresolvableLocalTime(NaiveDateTime),
}

impl Display for BoundaryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange(value) => write!(f, "timestamp {value} is out of range"),
            Self::DateOutOfRange(date) => write!(f, "day arithmetic from {date} is out of range"),
            Self::InvalidConfig(err) => write!(f, "{err}"),
            Self::UnresolvableLocalTime(local) => {
                write!(f, "local reset time {local} cannot be resolved")
            }
        }
    }
}

impl Error for BoundaryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidConfig(err) => Some(err),
            Self::OutOfRange(_) | Self::DateOutOfRange(_) | Self::UnresolvableLocalTime(_) => None,
        }
    }
}

impl From<ConfigError> for BoundaryError {
    fn from(value: ConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}

/// One period closed by a reset boundary.
///
/// `start..end` is the instant window used to look up completion events;
/// `start_date..=end_date` are the calendar days the outcome is recorded for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodWindow<Tz: TimeZone> {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl<Tz: TimeZone> PeriodWindow<Tz> {
    /// Calendar days covered by this period, ascending.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start_date
            .iter_days()
            .take_while(move |date| *date <= self.end_date)
    }
}

/// Converts stored epoch milliseconds into an instant in `tz`.
pub fn instant_from_millis<Tz: TimeZone>(tz: &Tz, epoch_ms: i64) -> BoundaryResult<DateTime<Tz>> {
    tz.timestamp_millis_opt(epoch_ms)
        .single()
        .ok_or(BoundaryError::OutOfRange(epoch_ms))
}

/// Resolves `reset_hour:reset_minute` on `date` in `tz`.
///
/// Ambiguous local times take the earliest instant; nonexistent ones take the
/// first valid minute after the requested time.
pub fn reset_instant_on<Tz: TimeZone>(
    tz: &Tz,
    date: NaiveDate,
    config: &PeriodConfig,
) -> BoundaryResult<DateTime<Tz>> {
    config.validate()?;
    let time = NaiveTime::from_hms_opt(
        u32::from(config.reset_hour),
        u32::from(config.reset_minute),
        0,
    )
    .ok_or(BoundaryError::InvalidConfig(ConfigError::ResetHourOutOfRange(
        i64::from(config.reset_hour),
    )))?;
    let requested = date.and_time(time);
    let mut local = requested;

    for _ in 0..=MAX_GAP_MINUTES {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(instant) => return Ok(instant),
            LocalResult::Ambiguous(earliest, _) => return Ok(earliest),
            LocalResult::None => {
                local = local
                    .checked_add_signed(Duration::minutes(1))
                    .ok_or(BoundaryError::UnresolvableLocalTime(requested))?;
            }
        }
    }

    Err(BoundaryError::UnresolvableLocalTime(requested))
}

/// Instant at which the period anchored at `last_changed_ms` ends.
pub fn next_reset_instant<Tz: TimeZone>(
    tz: &Tz,
    last_changed_ms: i64,
    config: &PeriodConfig,
) -> BoundaryResult<DateTime<Tz>> {
    let date = first_boundary_date(tz, last_changed_ms, config)?;
    reset_instant_on(tz, date, config)
}

/// Whether the period anchored at `last_changed_ms` has ended at `now`.
///
/// `last_changed_ms == 0` means the tracker was never engaged.
pub fn should_reset<Tz: TimeZone>(
    last_changed_ms: i64,
    config: &PeriodConfig,
    now: &DateTime<Tz>,
) -> BoundaryResult<bool> {
    if last_changed_ms == 0 {
        return Ok(false);
    }
    let next = next_reset_instant(&now.timezone(), last_changed_ms, config)?;
    Ok(*now >= next)
}

/// Start instant of the period that contains `now`.
///
/// Only used to bound undo deletions and for display.
pub fn current_period_start<Tz: TimeZone>(
    now: &DateTime<Tz>,
    config: &PeriodConfig,
) -> BoundaryResult<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();
    let logical_today = if *now < reset_instant_on(&tz, today, config)? {
        sub_days(today, 1)?
    } else {
        today
    };
    let start_date = sub_days(logical_today, days_after_first(config)?)?;
    reset_instant_on(&tz, start_date, config)
}

/// Next daily reset-of-day instant strictly after `now`, regardless of cadence.
pub fn next_wakeup_from_now<Tz: TimeZone>(
    now: &DateTime<Tz>,
    config: &PeriodConfig,
) -> BoundaryResult<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();
    let candidate = reset_instant_on(&tz, today, config)?;
    if candidate > *now {
        return Ok(candidate);
    }
    reset_instant_on(&tz, add_days(today, 1)?, config)
}

/// Window of the period that closes at the reset instant on `boundary_date`.
///
/// The last day is the calendar date of the millisecond before the boundary:
/// a midnight reset on the 10th closes the 9th, a 04:00 reset closes the 10th.
pub fn period_window_ending_on<Tz: TimeZone>(
    tz: &Tz,
    boundary_date: NaiveDate,
    config: &PeriodConfig,
) -> BoundaryResult<PeriodWindow<Tz>> {
    let end = reset_instant_on(tz, boundary_date, config)?;
    let start = reset_instant_on(
        tz,
        sub_days(boundary_date, u64::from(config.period_days))?,
        config,
    )?;
    let last_ms = end.timestamp_millis() - 1;
    let end_date = instant_from_millis(tz, last_ms)?.date_naive();
    let start_date = sub_days(end_date, days_after_first(config)?)?;

    Ok(PeriodWindow {
        start,
        end,
        start_date,
        end_date,
    })
}

/// Every period boundary crossed between the anchor and `now`, ascending.
///
/// The first boundary is `next_reset_instant(last_changed)`; each following
/// one is `period_days` calendar days later. Empty when never engaged.
pub fn crossed_boundaries<Tz: TimeZone>(
    last_changed_ms: i64,
    config: &PeriodConfig,
    now: &DateTime<Tz>,
) -> BoundaryResult<Vec<PeriodWindow<Tz>>> {
    let mut windows = Vec::new();
    if last_changed_ms == 0 {
        return Ok(windows);
    }

    let tz = now.timezone();
    let step = u64::from(config.period_days);
    let mut boundary_date = first_boundary_date(&tz, last_changed_ms, config)?;
    loop {
        let window = period_window_ending_on(&tz, boundary_date, config)?;
        if window.end > *now {
            break;
        }
        windows.push(window);
        boundary_date = add_days(boundary_date, step)?;
    }

    Ok(windows)
}

fn first_boundary_date<Tz: TimeZone>(
    tz: &Tz,
    last_changed_ms: i64,
    config: &PeriodConfig,
) -> BoundaryResult<NaiveDate> {
    let last_changed = instant_from_millis(tz, last_changed_ms)?;
    let anchor_date = last_changed.date_naive();
    let same_day_reset = reset_instant_on(tz, anchor_date, config)?;
    let offset = if last_changed < same_day_reset {
        days_after_first(config)?
    } else {
        u64::from(config.period_days)
    };
    add_days(anchor_date, offset)
}

/// Days in a period after its first one.
fn days_after_first(config: &PeriodConfig) -> BoundaryResult<u64> {
    u64::from(config.period_days)
        .checked_sub(1)
        .ok_or(BoundaryError::InvalidConfig(ConfigError::PeriodDaysOutOfRange(
            i64::from(config.period_days),
        )))
}

fn add_days(date: NaiveDate, days: u64) -> BoundaryResult<NaiveDate> {
    date.checked_add_days(Days::new(days))
        .ok_or(BoundaryError::DateOutOfRange(date))
}

fn sub_days(date: NaiveDate, days: u64) -> BoundaryResult<NaiveDate> {
    date.checked_sub_days(Days::new(days))
        .ok_or(BoundaryError::DateOutOfRange(date))
}

#[cfg(test)]
mod tests {
    use super::{
        crossed_boundaries, current_period_start, next_reset_instant, next_wakeup_from_now,
        period_window_ending_on, should_reset, BoundaryError,
    };
    use crate::config::{ConfigError, PeriodConfig};
    use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone};

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        tz().with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn config(period_days: i64, hour: i64, minute: i64) -> PeriodConfig {
        PeriodConfig::new(period_days, hour, minute).unwrap()
    }

    #[test]
    fn mark_before_reset_attaches_to_previous_cycle() {
        let cfg = config(1, 4, 0);
        let marked = at(10, 3, 0).timestamp_millis();
        assert_eq!(next_reset_instant(&tz(), marked, &cfg).unwrap(), at(10, 4, 0));
    }

    #[test]
    fn mark_at_or_after_reset_waits_full_period() {
        let cfg = config(1, 4, 0);
        let exactly = at(10, 4, 0).timestamp_millis();
        let later = at(10, 22, 30).timestamp_millis();
        assert_eq!(next_reset_instant(&tz(), exactly, &cfg).unwrap(), at(11, 4, 0));
        assert_eq!(next_reset_instant(&tz(), later, &cfg).unwrap(), at(11, 4, 0));
    }

    #[test]
    fn multi_day_period_shifts_by_period_or_period_minus_one() {
        let cfg = config(7, 4, 0);
        let before = at(10, 1, 0).timestamp_millis();
        let after = at(10, 5, 0).timestamp_millis();
        assert_eq!(next_reset_instant(&tz(), before, &cfg).unwrap(), at(16, 4, 0));
        assert_eq!(next_reset_instant(&tz(), after, &cfg).unwrap(), at(17, 4, 0));
    }

    #[test]
    fn every_minute_of_a_day_follows_the_pre_boundary_rule() {
        let cfg = config(3, 6, 30);
        for minute_of_day in (0..24 * 60).step_by(17) {
            let instant = at(12, minute_of_day / 60, minute_of_day % 60);
            let expected = if instant < at(12, 6, 30) {
                at(14, 6, 30)
            } else {
                at(15, 6, 30)
            };
            let next = next_reset_instant(&tz(), instant.timestamp_millis(), &cfg).unwrap();
            assert_eq!(next, expected, "minute_of_day={minute_of_day}");
        }
    }

    #[test]
    fn should_reset_is_false_when_never_engaged() {
        for period in [1, 7, 90] {
            let cfg = config(period, 0, 0);
            assert!(!should_reset(0, &cfg, &at(20, 12, 0)).unwrap());
        }
    }

    #[test]
    fn should_reset_flips_exactly_at_boundary() {
        let cfg = config(1, 4, 0);
        let marked = at(10, 9, 0).timestamp_millis();
        let boundary = at(11, 4, 0);
        let just_before = boundary - chrono::Duration::milliseconds(1);
        assert!(!should_reset(marked, &cfg, &just_before).unwrap());
        assert!(should_reset(marked, &cfg, &boundary).unwrap());
    }

    #[test]
    fn current_period_start_before_and_after_reset() {
        let cfg = config(1, 4, 0);
        assert_eq!(current_period_start(&at(10, 3, 59), &cfg).unwrap(), at(9, 4, 0));
        assert_eq!(current_period_start(&at(10, 4, 0), &cfg).unwrap(), at(10, 4, 0));

        let weekly = config(7, 4, 0);
        assert_eq!(current_period_start(&at(10, 12, 0), &weekly).unwrap(), at(4, 4, 0));
    }

    #[test]
    fn next_wakeup_is_strictly_after_now() {
        let cfg = config(7, 4, 0);
        assert_eq!(next_wakeup_from_now(&at(10, 3, 0), &cfg).unwrap(), at(10, 4, 0));
        assert_eq!(next_wakeup_from_now(&at(10, 4, 0), &cfg).unwrap(), at(11, 4, 0));
        assert_eq!(next_wakeup_from_now(&at(10, 23, 0), &cfg).unwrap(), at(11, 4, 0));
    }

    #[test]
    fn window_end_date_is_date_of_last_millisecond() {
        let cfg = config(1, 4, 0);
        let window = period_window_ending_on(&tz(), date(10), &cfg).unwrap();
        assert_eq!(window.start, at(9, 4, 0));
        assert_eq!(window.end, at(10, 4, 0));
        assert_eq!(window.start_date, date(10));
        assert_eq!(window.end_date, date(10));
    }

    #[test]
    fn midnight_reset_window_covers_previous_days() {
        let cfg = config(3, 0, 0);
        let window = period_window_ending_on(&tz(), date(10), &cfg).unwrap();
        assert_eq!(window.start_date, date(7));
        assert_eq!(window.end_date, date(9));
        let days: Vec<u32> = window.dates().map(|d| d.day()).collect();
        assert_eq!(days, vec![7, 8, 9]);
    }

    #[test]
    fn crossed_boundaries_lists_each_boundary_once() {
        let cfg = config(1, 4, 0);
        let marked = at(10, 9, 0).timestamp_millis();
        let windows = crossed_boundaries(marked, &cfg, &at(13, 12, 0)).unwrap();
        let end_dates: Vec<NaiveDate> = windows.iter().map(|w| w.end_date).collect();
        assert_eq!(end_dates, vec![date(11), date(12), date(13)]);
        assert_eq!(windows[0].start, at(10, 4, 0));
        assert_eq!(windows[2].end, at(13, 4, 0));
    }

    #[test]
    fn crossed_boundaries_steps_by_period() {
        let cfg = config(7, 4, 0);
        let marked = at(1, 9, 0).timestamp_millis();
        let windows = crossed_boundaries(marked, &cfg, &at(20, 12, 0)).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start, at(1, 4, 0));
        assert_eq!(windows[0].start_date, date(2));
        assert_eq!(windows[0].end_date, date(8));
        assert_eq!(windows[1].start_date, date(9));
        assert_eq!(windows[1].end_date, date(15));
    }

    #[test]
    fn crossed_boundaries_empty_before_first_boundary_or_when_unused() {
        let cfg = config(1, 4, 0);
        let marked = at(10, 9, 0).timestamp_millis();
        assert!(crossed_boundaries(marked, &cfg, &at(11, 3, 59)).unwrap().is_empty());
        assert!(crossed_boundaries(0, &cfg, &at(11, 3, 59)).unwrap().is_empty());
    }

    #[test]
    fn unvalidated_zero_day_config_is_an_error() {
        let cfg = PeriodConfig {
            period_days: 0,
            reset_hour: 4,
            reset_minute: 0,
        };
        let marked = at(10, 9, 0).timestamp_millis();
        let expected = BoundaryError::InvalidConfig(ConfigError::PeriodDaysOutOfRange(0));

        assert_eq!(current_period_start(&at(10, 12, 0), &cfg), Err(expected));
        assert_eq!(period_window_ending_on(&tz(), date(10), &cfg), Err(expected));
        assert_eq!(next_reset_instant(&tz(), marked, &cfg), Err(expected));
        assert_eq!(crossed_boundaries(marked, &cfg, &at(13, 12, 0)), Err(expected));
    }

    #[test]
    fn date_overflow_reports_the_starting_date() {
        let cfg = config(90, 4, 0);
        let err = period_window_ending_on(&tz(), NaiveDate::MIN, &cfg).unwrap_err();
        assert_eq!(err, BoundaryError::DateOutOfRange(NaiveDate::MIN));
    }
}
