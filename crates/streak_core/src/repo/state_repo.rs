//! Current-state store contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist the widget state as a small key/value record.
//! - Provide compare-and-set writes so concurrent writers never interleave.
//!
//! # Invariants
//! - Absent keys read back as defaults; present-but-invalid values are
//!   rejected instead of masked.
//! - Every successful write bumps `revision` by exactly one.
//! - `compare_and_set` writes nothing when the stored revision moved.

use crate::config::{ConfigError, PeriodConfig};
use crate::db::DbError;
use crate::model::state::{StateSnapshot, WidgetState};
use log::debug;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Upper bound on read-transform-write retries under contention.
pub const MAX_STATE_UPDATE_ATTEMPTS: u32 = 8;

const KEY_IS_DONE: &str = "is_done";
const KEY_LAST_CHANGED: &str = "last_changed";
const KEY_PERIOD_DAYS: &str = "period_days";
const KEY_RESET_HOUR: &str = "reset_hour";
const KEY_RESET_MINUTE: &str = "reset_minute";
const KEY_REVISION: &str = "revision";

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage error shared by the state and history repositories.
#[derive(Debug)]
pub enum RepoError {
    Validation(ConfigError),
    Db(DbError),
    InvalidData(String),
    MissingRequiredTable(&'static str),
    /// Compare-and-set kept losing to other writers.
    Conflict { attempts: u32 },
    /// Backend refused the operation (used by non-SQLite stores).
    Unavailable(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::Conflict { attempts } => {
                write!(f, "state update lost {attempts} compare-and-set races")
            }
            Self::Unavailable(message) => write!(f, "storage unavailable: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for RepoError {
    fn from(value: ConfigError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Key/value store holding the single current-state record.
pub trait StateStore {
    /// Reads a consistent snapshot of the record.
    fn load(&self) -> RepoResult<StateSnapshot>;
    /// Writes `next` only if the stored revision still equals
    /// `expected_revision`. Returns `false` when another writer won.
    fn compare_and_set(&self, expected_revision: u64, next: &WidgetState) -> RepoResult<bool>;
}

/// Runs one atomic read-modify-write against `store`.
///
/// `transform` sees the freshest snapshot and returns the replacement state
/// (`None` to leave it untouched) plus a caller outcome. It is re-run on
/// every lost race, so it must not have side effects of its own.
///
/// Returns the outcome and the state now stored.
pub fn update_state<S, T, E, F>(store: &S, mut transform: F) -> Result<(T, WidgetState), E>
where
    S: StateStore + ?Sized,
    E: From<RepoError>,
    F: FnMut(&WidgetState) -> Result<(Option<WidgetState>, T), E>,
{
    for attempt in 1..=MAX_STATE_UPDATE_ATTEMPTS {
        let snapshot = store.load()?;
        let (next, outcome) = transform(&snapshot.state)?;
        let Some(next) = next else {
            return Ok((outcome, snapshot.state));
        };
        if next == snapshot.state {
            return Ok((outcome, next));
        }
        if store.compare_and_set(snapshot.revision, &next)? {
            return Ok((outcome, next));
        }
        debug!(
            "event=state_cas_conflict module=repo status=retry attempt={} revision={}",
            attempt, snapshot.revision
        );
    }

    Err(RepoError::Conflict {
        attempts: MAX_STATE_UPDATE_ATTEMPTS,
    }
    .into())
}

/// SQLite-backed current-state store over the `widget_state` table.
pub struct SqliteStateStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStateStore<'conn> {
    /// Constructs a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table(conn, "widget_state")?;
        Ok(Self { conn })
    }
}

impl StateStore for SqliteStateStore<'_> {
    fn load(&self) -> RepoResult<StateSnapshot> {
        read_snapshot(self.conn)
    }

    fn compare_and_set(&self, expected_revision: u64, next: &WidgetState) -> RepoResult<bool> {
        next.config.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = read_snapshot(&tx)?;
        if current.revision != expected_revision {
            return Ok(false);
        }

        let next_revision = expected_revision + 1;
        let rows = [
            (KEY_IS_DONE, bool_to_text(next.is_done).to_string()),
            (KEY_LAST_CHANGED, next.last_changed.to_string()),
            (KEY_PERIOD_DAYS, next.config.period_days.to_string()),
            (KEY_RESET_HOUR, next.config.reset_hour.to_string()),
            (KEY_RESET_MINUTE, next.config.reset_minute.to_string()),
            (KEY_REVISION, next_revision.to_string()),
        ];
        for (key, value) in rows {
            tx.execute(
                "INSERT INTO widget_state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
                params![key, value],
            )?;
        }
        tx.commit()?;

        Ok(true)
    }
}

fn read_snapshot(conn: &Connection) -> RepoResult<StateSnapshot> {
    let mut stmt = conn.prepare("SELECT key, value FROM widget_state;")?;
    let mut rows = stmt.query([])?;
    let mut values = HashMap::new();
    while let Some(row) = rows.next()? {
        let key: String = row.get(0)?;
        let value: String = row.get(1)?;
        values.insert(key, value);
    }

    let defaults = PeriodConfig::default();
    let period_days = parse_int(&values, KEY_PERIOD_DAYS)?.unwrap_or(i64::from(defaults.period_days));
    let reset_hour = parse_int(&values, KEY_RESET_HOUR)?.unwrap_or(i64::from(defaults.reset_hour));
    let reset_minute =
        parse_int(&values, KEY_RESET_MINUTE)?.unwrap_or(i64::from(defaults.reset_minute));
    let config = PeriodConfig::new(period_days, reset_hour, reset_minute)
        .map_err(|err| RepoError::InvalidData(format!("widget_state config: {err}")))?;

    let is_done = match values.get(KEY_IS_DONE).map(String::as_str) {
        None | Some("0") => false,
        Some("1") => true,
        Some(other) => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_done value `{other}` in widget_state"
            )));
        }
    };
    let last_changed = parse_int(&values, KEY_LAST_CHANGED)?.unwrap_or(0);
    if last_changed < 0 {
        return Err(RepoError::InvalidData(format!(
            "negative last_changed value `{last_changed}` in widget_state"
        )));
    }
    let revision = match parse_int(&values, KEY_REVISION)? {
        Some(value) => u64::try_from(value).map_err(|_| {
            RepoError::InvalidData(format!("invalid revision value `{value}` in widget_state"))
        })?,
        None => 0,
    };

    Ok(StateSnapshot {
        state: WidgetState {
            is_done,
            last_changed,
            config,
        },
        revision,
    })
}

fn parse_int(values: &HashMap<String, String>, key: &str) -> RepoResult<Option<i64>> {
    values
        .get(key)
        .map(|raw| {
            raw.trim().parse::<i64>().map_err(|_| {
                RepoError::InvalidData(format!("invalid {key} value `{raw}` in widget_state"))
            })
        })
        .transpose()
}

fn bool_to_text(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

pub(crate) fn ensure_table(conn: &Connection, table: &'static str) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(RepoError::MissingRequiredTable(table));
    }
    Ok(())
}
