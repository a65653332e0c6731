#![allow(dead_code)]

use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone,
    Utc,
};
use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use streak_core::{
    CompletionEvent, FinalizedDay, HistoryStore, MetadataKey, RepoError, RepoResult,
    SqliteHistoryStore, SqliteStateStore, StateSnapshot, StateStore, WidgetState,
};

pub fn tz() -> FixedOffset {
    FixedOffset::east_opt(3600).unwrap()
}

/// Instant on day `day` of March 2026 in the test zone.
pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    tz().with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

pub fn ms(instant: DateTime<FixedOffset>) -> i64 {
    instant.timestamp_millis()
}

/// Both SQLite stores over one migrated connection.
pub fn sqlite_stores(conn: &Connection) -> (SqliteStateStore<'_>, SqliteHistoryStore<'_>) {
    (
        SqliteStateStore::try_new(conn).unwrap(),
        SqliteHistoryStore::try_new(conn).unwrap(),
    )
}

/// UTC+1 zone with summer time (UTC+2) from 2026-03-29 01:00Z to
/// 2026-10-25 01:00Z: local 02:00-03:00 on 29 March does not exist and local
/// 02:00-03:00 on 25 October happens twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstZone;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstOffset(FixedOffset);

impl Offset for DstOffset {
    fn fix(&self) -> FixedOffset {
        self.0
    }
}

impl Display for DstOffset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn standard_offset() -> FixedOffset {
    FixedOffset::east_opt(3600).unwrap()
}

fn summer_offset() -> FixedOffset {
    FixedOffset::east_opt(7200).unwrap()
}

fn offset_at_utc(utc: &NaiveDateTime) -> FixedOffset {
    let summer_start = Utc.with_ymd_and_hms(2026, 3, 29, 1, 0, 0).unwrap().naive_utc();
    let summer_end = Utc.with_ymd_and_hms(2026, 10, 25, 1, 0, 0).unwrap().naive_utc();
    if *utc >= summer_start && *utc < summer_end {
        summer_offset()
    } else {
        standard_offset()
    }
}

impl TimeZone for DstZone {
    type Offset = DstOffset;

    fn from_offset(_offset: &DstOffset) -> Self {
        DstZone
    }

    fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<DstOffset> {
        self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap())
    }

    fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<DstOffset> {
        // Earlier instant first, matching how ambiguous times are reported.
        let valid = [summer_offset(), standard_offset()]
            .into_iter()
            .filter(|offset| {
                let utc = *local - Duration::seconds(i64::from(offset.local_minus_utc()));
                offset_at_utc(&utc) == *offset
            })
            .map(DstOffset)
            .collect::<Vec<_>>();
        match valid.as_slice() {
            [] => LocalResult::None,
            [single] => LocalResult::Single(*single),
            [earlier, later, ..] => LocalResult::Ambiguous(*earlier, *later),
        }
    }

    fn offset_from_utc_date(&self, utc: &NaiveDate) -> DstOffset {
        self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> DstOffset {
        DstOffset(offset_at_utc(utc))
    }
}

/// Wall-clock instant in `DstZone`; panics on nonexistent or ambiguous input.
pub fn dst_at(month: u32, day: u32, hour: u32, minute: u32) -> DateTime<DstZone> {
    DstZone
        .with_ymd_and_hms(2026, month, day, hour, minute, 0)
        .unwrap()
}

pub fn utc_ms(month: u32, day: u32, hour: u32, minute: u32) -> i64 {
    Utc.with_ymd_and_hms(2026, month, day, hour, minute, 0)
        .unwrap()
        .timestamp_millis()
}

/// In-memory current-state store with injectable competing writes.
#[derive(Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<Option<StateSnapshot>>,
    interference: Mutex<Vec<WidgetState>>,
}

impl MemoryStateStore {
    pub fn with_state(state: WidgetState) -> Self {
        let store = Self::default();
        *store.snapshot.lock().unwrap() = Some(StateSnapshot { state, revision: 1 });
        store
    }

    pub fn current(&self) -> WidgetState {
        self.load().unwrap().state
    }

    pub fn revision(&self) -> u64 {
        self.load().unwrap().revision
    }

    /// The next `compare_and_set` first sees `state` written by someone else.
    pub fn interfere_once(&self, state: WidgetState) {
        self.interference.lock().unwrap().push(state);
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> RepoResult<StateSnapshot> {
        Ok(self
            .snapshot
            .lock()
            .unwrap()
            .unwrap_or(StateSnapshot {
                state: WidgetState::default(),
                revision: 0,
            }))
    }

    fn compare_and_set(&self, expected_revision: u64, next: &WidgetState) -> RepoResult<bool> {
        let current = self.load()?;
        let mut slot = self.snapshot.lock().unwrap();
        let mut revision = current.revision;
        if let Some(competing) = self.interference.lock().unwrap().pop() {
            revision += 1;
            *slot = Some(StateSnapshot {
                state: competing,
                revision,
            });
        }
        if revision != expected_revision {
            return Ok(false);
        }
        *slot = Some(StateSnapshot {
            state: *next,
            revision: revision + 1,
        });
        Ok(true)
    }
}

#[derive(Default)]
struct HistoryData {
    events: Vec<CompletionEvent>,
    next_event_id: i64,
    days: BTreeMap<NaiveDate, bool>,
    metadata: HashMap<MetadataKey, NaiveDate>,
    finalize_calls: usize,
}

/// In-memory history store with injectable storage failures.
#[derive(Default)]
pub struct MemoryHistoryStore {
    data: Mutex<HistoryData>,
    fail_finalize_from_call: Mutex<Option<usize>>,
    fail_appends: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryHistoryStore {
    /// `finalize_period` calls numbered `call` and later (0-based) fail.
    pub fn fail_finalize_from(&self, call: usize) {
        *self.fail_finalize_from_call.lock().unwrap() = Some(call);
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        *self.fail_finalize_from_call.lock().unwrap() = None;
        self.fail_appends(false);
        self.fail_deletes(false);
    }

    pub fn days(&self) -> Vec<FinalizedDay> {
        self.data
            .lock()
            .unwrap()
            .days
            .iter()
            .map(|(date, completed)| FinalizedDay {
                date: *date,
                completed: *completed,
            })
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.data.lock().unwrap().events.len()
    }

    pub fn seed_metadata(&self, key: MetadataKey, value: NaiveDate) {
        self.data.lock().unwrap().metadata.insert(key, value);
    }
}

fn unavailable(what: &str) -> RepoError {
    RepoError::Unavailable(format!("injected {what} failure"))
}

impl HistoryStore for MemoryHistoryStore {
    fn record_completion(
        &self,
        timestamp_ms: i64,
        period_days: u16,
        tracking_start: NaiveDate,
    ) -> RepoResult<i64> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(unavailable("append"));
        }
        let mut data = self.data.lock().unwrap();
        data.metadata
            .entry(MetadataKey::TrackingStartDate)
            .or_insert(tracking_start);
        data.next_event_id += 1;
        let id = data.next_event_id;
        data.events.push(CompletionEvent {
            id,
            timestamp_ms,
            period_days,
        });
        Ok(id)
    }

    fn completions_in_range(&self, start_ms: i64, end_ms: i64) -> RepoResult<Vec<CompletionEvent>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .events
            .iter()
            .filter(|event| event.timestamp_ms >= start_ms && event.timestamp_ms < end_ms)
            .copied()
            .collect())
    }

    fn delete_completions_in_range(&self, start_ms: i64, end_ms: i64) -> RepoResult<usize> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(unavailable("delete"));
        }
        let mut data = self.data.lock().unwrap();
        let before = data.events.len();
        data.events
            .retain(|event| !(event.timestamp_ms >= start_ms && event.timestamp_ms < end_ms));
        Ok(before - data.events.len())
    }

    fn finalize_period(&self, days: &[FinalizedDay], period_end: NaiveDate) -> RepoResult<usize> {
        let mut data = self.data.lock().unwrap();
        let call = data.finalize_calls;
        data.finalize_calls += 1;
        if let Some(from) = *self.fail_finalize_from_call.lock().unwrap() {
            if call >= from {
                return Err(unavailable("finalize"));
            }
        }

        let mut inserted = 0;
        for day in days {
            if !data.days.contains_key(&day.date) {
                data.days.insert(day.date, day.completed);
                inserted += 1;
            }
        }
        let watermark = data
            .metadata
            .entry(MetadataKey::LastFinalizedDate)
            .or_insert(period_end);
        if period_end > *watermark {
            *watermark = period_end;
        }
        Ok(inserted)
    }

    fn finalized_days_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RepoResult<Vec<FinalizedDay>> {
        Ok(self
            .days()
            .into_iter()
            .filter(|day| day.date >= start && day.date <= end)
            .collect())
    }

    fn metadata(&self, key: MetadataKey) -> RepoResult<Option<NaiveDate>> {
        Ok(self.data.lock().unwrap().metadata.get(&key).copied())
    }

    fn clear_all(&self) -> RepoResult<()> {
        let mut data = self.data.lock().unwrap();
        data.events.clear();
        data.days.clear();
        data.metadata.clear();
        Ok(())
    }
}
