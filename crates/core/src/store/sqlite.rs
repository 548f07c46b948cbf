//! SQLite-backed user state store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{SeenRecord, StoreError, UserReset, UserStateStore, UserStats};
use crate::strategy::SearchCursor;

/// Fixed-width UTC timestamp, so text comparison matches time order.
pub(crate) fn to_db_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// SQLite-backed user state store.
pub struct SqliteUserStateStore {
    conn: Mutex<Connection>,
}

impl SqliteUserStateStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            -- One row per (user, repository) ever shown
            CREATE TABLE IF NOT EXISTS seen_records (
                user_id TEXT NOT NULL,
                repo_id TEXT NOT NULL,
                first_seen_at TEXT NOT NULL,
                last_shown_at TEXT NOT NULL,
                times_shown INTEGER NOT NULL DEFAULT 1,
                last_run_id TEXT,
                PRIMARY KEY (user_id, repo_id)
            );

            CREATE INDEX IF NOT EXISTS idx_seen_records_last_shown ON seen_records(last_shown_at);

            -- Pagination state per (user, strategy)
            CREATE TABLE IF NOT EXISTS search_cursors (
                user_id TEXT NOT NULL,
                strategy_id TEXT NOT NULL,
                token TEXT,
                query_fingerprint TEXT NOT NULL,
                last_used_at TEXT NOT NULL,
                exhausted INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, strategy_id)
            );
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_seen(row: &rusqlite::Row) -> rusqlite::Result<SeenRecord> {
        let first_seen: String = row.get(2)?;
        let last_shown: String = row.get(3)?;
        Ok(SeenRecord {
            user_id: row.get(0)?,
            repo_id: row.get(1)?,
            first_seen_at: from_db_time(&first_seen)?,
            last_shown_at: from_db_time(&last_shown)?,
            times_shown: row.get(4)?,
        })
    }

    fn row_to_cursor(row: &rusqlite::Row) -> rusqlite::Result<SearchCursor> {
        let last_used: String = row.get(4)?;
        Ok(SearchCursor {
            user_id: row.get(0)?,
            strategy_id: row.get(1)?,
            token: row.get(2)?,
            query_fingerprint: row.get(3)?,
            last_used_at: from_db_time(&last_used)?,
            exhausted: row.get::<_, i64>(5)? != 0,
        })
    }
}

const SEEN_COLUMNS: &str = "user_id, repo_id, first_seen_at, last_shown_at, times_shown";
const CURSOR_COLUMNS: &str =
    "user_id, strategy_id, token, query_fingerprint, last_used_at, exhausted";

impl UserStateStore for SqliteUserStateStore {
    fn get_seen_records(
        &self,
        user_id: &str,
        repo_ids: &[String],
    ) -> Result<Vec<SeenRecord>, StoreError> {
        let conn = self.conn()?;

        let sql = if repo_ids.is_empty() {
            format!("SELECT {} FROM seen_records WHERE user_id = ?1", SEEN_COLUMNS)
        } else {
            let placeholders: Vec<String> =
                (0..repo_ids.len()).map(|i| format!("?{}", i + 2)).collect();
            format!(
                "SELECT {} FROM seen_records WHERE user_id = ?1 AND repo_id IN ({})",
                SEEN_COLUMNS,
                placeholders.join(", ")
            )
        };

        let mut values: Vec<&str> = Vec::with_capacity(repo_ids.len() + 1);
        values.push(user_id);
        values.extend(repo_ids.iter().map(String::as_str));

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(values), Self::row_to_seen)
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(db_err)?);
        }
        Ok(records)
    }

    fn upsert_seen_record(
        &self,
        user_id: &str,
        repo_id: &str,
        run_id: &str,
        shown_at: DateTime<Utc>,
    ) -> Result<SeenRecord, StoreError> {
        let conn = self.conn()?;
        let shown = to_db_time(shown_at);

        conn.execute(
            "INSERT INTO seen_records (user_id, repo_id, first_seen_at, last_shown_at, times_shown, last_run_id)
             VALUES (?1, ?2, ?3, ?3, 1, ?4)
             ON CONFLICT(user_id, repo_id) DO UPDATE SET
                times_shown = CASE
                    WHEN seen_records.last_run_id IS excluded.last_run_id THEN seen_records.times_shown
                    ELSE seen_records.times_shown + 1
                END,
                last_shown_at = CASE
                    WHEN excluded.last_shown_at > seen_records.last_shown_at THEN excluded.last_shown_at
                    ELSE seen_records.last_shown_at
                END,
                last_run_id = excluded.last_run_id",
            params![user_id, repo_id, shown, run_id],
        )
        .map_err(db_err)?;

        conn.query_row(
            &format!(
                "SELECT {} FROM seen_records WHERE user_id = ?1 AND repo_id = ?2",
                SEEN_COLUMNS
            ),
            params![user_id, repo_id],
            Self::row_to_seen,
        )
        .map_err(db_err)
    }

    fn get_cursor(
        &self,
        user_id: &str,
        strategy_id: &str,
    ) -> Result<Option<SearchCursor>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM search_cursors WHERE user_id = ?1 AND strategy_id = ?2",
                CURSOR_COLUMNS
            ),
            params![user_id, strategy_id],
            Self::row_to_cursor,
        )
        .optional()
        .map_err(db_err)
    }

    fn list_cursors(&self, user_id: &str) -> Result<Vec<SearchCursor>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM search_cursors WHERE user_id = ?1 ORDER BY strategy_id",
                CURSOR_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id], Self::row_to_cursor)
            .map_err(db_err)?;

        let mut cursors = Vec::new();
        for row in rows {
            cursors.push(row.map_err(db_err)?);
        }
        Ok(cursors)
    }

    fn upsert_cursor(&self, cursor: &SearchCursor) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO search_cursors (user_id, strategy_id, token, query_fingerprint, last_used_at, exhausted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id, strategy_id) DO UPDATE SET
                token = excluded.token,
                query_fingerprint = excluded.query_fingerprint,
                last_used_at = excluded.last_used_at,
                exhausted = excluded.exhausted",
            params![
                cursor.user_id,
                cursor.strategy_id,
                cursor.token,
                cursor.query_fingerprint,
                to_db_time(cursor.last_used_at),
                cursor.exhausted as i64,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn reset_cursors(&self, user_id: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE search_cursors SET exhausted = 0, token = NULL WHERE user_id = ?1",
            params![user_id],
        )
        .map_err(db_err)
    }

    fn purge_seen_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM seen_records WHERE last_shown_at < ?1",
                params![to_db_time(cutoff)],
            )
            .map_err(db_err)?;
        Ok(removed as u64)
    }

    fn user_stats(
        &self,
        user_id: &str,
        window_start: DateTime<Utc>,
    ) -> Result<UserStats, StoreError> {
        let conn = self.conn()?;

        let (seen, in_window, exposures, last_shown): (i64, i64, i64, Option<String>) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN last_shown_at >= ?2 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(times_shown), 0),
                        MAX(last_shown_at)
                 FROM seen_records WHERE user_id = ?1",
                params![user_id, to_db_time(window_start)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map_err(db_err)?;

        let (used, exhausted): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(exhausted), 0)
                 FROM search_cursors WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(db_err)?;

        let last_shown_at = match last_shown {
            Some(s) => Some(from_db_time(&s).map_err(|e| StoreError::InvalidData(e.to_string()))?),
            None => None,
        };

        Ok(UserStats {
            user_id: user_id.to_string(),
            seen_repositories: seen as u64,
            shown_in_window: in_window as u64,
            total_exposures: exposures as u64,
            strategies_used: used as u64,
            strategies_exhausted: exhausted as u64,
            last_shown_at,
        })
    }

    fn reset_user(&self, user_id: &str) -> Result<UserReset, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;
        let seen = tx
            .execute("DELETE FROM seen_records WHERE user_id = ?1", params![user_id])
            .map_err(db_err)?;
        let cursors = tx
            .execute("DELETE FROM search_cursors WHERE user_id = ?1", params![user_id])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        Ok(UserReset {
            seen_records_removed: seen as u64,
            cursors_removed: cursors as u64,
        })
    }
}
