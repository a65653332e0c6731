//! History store contract and SQLite implementation.
//!
//! # Responsibility
//! - Append and range-query completion events.
//! - Record finalized days with insert-if-absent semantics.
//! - Hold the tracking metadata (start date, finalization watermark).
//!
//! # Invariants
//! - `finalize_period` never overwrites an existing day row and writes the
//!   day rows and the watermark advance in one transaction.
//! - `last_finalized_date` only moves forward.
//! - A completion event is never stored without `tracking_start_date`.
//! - `clear_all` never touches the current-state record.

use crate::model::history::{CompletionEvent, FinalizedDay, MetadataKey};
use crate::repo::state_repo::{ensure_table, RepoError, RepoResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Durable storage for completion events, finalized days and metadata.
pub trait HistoryStore {
    /// Appends one completion event and sets `tracking_start_date` to
    /// `tracking_start` if it has no value yet, in one transaction. Returns
    /// the event id.
    fn record_completion(
        &self,
        timestamp_ms: i64,
        period_days: u16,
        tracking_start: NaiveDate,
    ) -> RepoResult<i64>;
    /// Events with `start_ms <= timestamp < end_ms`, ascending.
    fn completions_in_range(&self, start_ms: i64, end_ms: i64)
        -> RepoResult<Vec<CompletionEvent>>;
    /// Deletes events with `start_ms <= timestamp < end_ms`; returns the count.
    fn delete_completions_in_range(&self, start_ms: i64, end_ms: i64) -> RepoResult<usize>;
    /// Inserts each day only if absent, then advances `last_finalized_date`
    /// to `period_end` if that moves it forward. Returns rows inserted.
    fn finalize_period(&self, days: &[FinalizedDay], period_end: NaiveDate) -> RepoResult<usize>;
    /// Finalized days in `start..=end`, ascending.
    fn finalized_days_in_range(&self, start: NaiveDate, end: NaiveDate)
        -> RepoResult<Vec<FinalizedDay>>;
    fn metadata(&self, key: MetadataKey) -> RepoResult<Option<NaiveDate>>;
    /// Wipes events, finalized days and metadata in one transaction.
    fn clear_all(&self) -> RepoResult<()>;
}

/// SQLite-backed history store.
pub struct SqliteHistoryStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHistoryStore<'conn> {
    /// Constructs a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        for table in ["completion_events", "finalized_days", "tracking_metadata"] {
            ensure_table(conn, table)?;
        }
        Ok(Self { conn })
    }
}

impl HistoryStore for SqliteHistoryStore<'_> {
    fn record_completion(
        &self,
        timestamp_ms: i64,
        period_days: u16,
        tracking_start: NaiveDate,
    ) -> RepoResult<i64> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO completion_events (timestamp_ms, period_days) VALUES (?1, ?2);",
            params![timestamp_ms, period_days],
        )?;
        let event_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT OR IGNORE INTO tracking_metadata (key, value) VALUES (?1, ?2);",
            params![
                MetadataKey::TrackingStartDate.as_str(),
                format_date(tracking_start)
            ],
        )?;
        tx.commit()?;
        Ok(event_id)
    }

    fn completions_in_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> RepoResult<Vec<CompletionEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp_ms, period_days
             FROM completion_events
             WHERE timestamp_ms >= ?1 AND timestamp_ms < ?2
             ORDER BY timestamp_ms ASC, id ASC;",
        )?;
        let mut rows = stmt.query(params![start_ms, end_ms])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }
        Ok(events)
    }

    fn delete_completions_in_range(&self, start_ms: i64, end_ms: i64) -> RepoResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM completion_events WHERE timestamp_ms >= ?1 AND timestamp_ms < ?2;",
            params![start_ms, end_ms],
        )?;
        Ok(deleted)
    }

    fn finalize_period(&self, days: &[FinalizedDay], period_end: NaiveDate) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut inserted = 0;
        for day in days {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO finalized_days (date, completed) VALUES (?1, ?2);",
                params![format_date(day.date), i64::from(day.completed)],
            )?;
        }
        tx.execute(
            "INSERT INTO tracking_metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value
             WHERE excluded.value > tracking_metadata.value;",
            params![
                MetadataKey::LastFinalizedDate.as_str(),
                format_date(period_end)
            ],
        )?;
        tx.commit()?;
        Ok(inserted)
    }

    fn finalized_days_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RepoResult<Vec<FinalizedDay>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, completed
             FROM finalized_days
             WHERE date >= ?1 AND date <= ?2
             ORDER BY date ASC;",
        )?;
        let mut rows = stmt.query(params![format_date(start), format_date(end)])?;
        let mut days = Vec::new();
        while let Some(row) = rows.next()? {
            days.push(parse_day_row(row)?);
        }
        Ok(days)
    }

    fn metadata(&self, key: MetadataKey) -> RepoResult<Option<NaiveDate>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM tracking_metadata WHERE key = ?1 LIMIT 1;",
                [key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|raw| parse_date(&raw, "tracking_metadata.value"))
            .transpose()
    }

    fn clear_all(&self) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute_batch(
            "DELETE FROM completion_events;
             DELETE FROM finalized_days;
             DELETE FROM tracking_metadata;",
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<CompletionEvent> {
    let period_days: i64 = row.get("period_days")?;
    let period_days = u16::try_from(period_days).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid period_days `{period_days}` in completion_events.period_days"
        ))
    })?;
    Ok(CompletionEvent {
        id: row.get("id")?,
        timestamp_ms: row.get("timestamp_ms")?,
        period_days,
    })
}

fn parse_day_row(row: &Row<'_>) -> RepoResult<FinalizedDay> {
    let raw: String = row.get("date")?;
    let completed = match row.get::<_, i64>("completed")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid completed value `{other}` in finalized_days.completed"
            )));
        }
    };
    Ok(FinalizedDay {
        date: parse_date(&raw, "finalized_days.date")?,
        completed,
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(raw: &str, column: &str) -> RepoResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| RepoError::InvalidData(format!("invalid date `{raw}` in {column}")))
}
