//! SQLite-backed analysis cache.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::{AnalysisCache, CacheError, CacheStats, CachedAnalysis};
use crate::scoring::ScoreBreakdown;
use crate::upstream::IssueSummary;
use crate::store::{from_db_time, to_db_time};

fn db_err(e: rusqlite::Error) -> CacheError {
    CacheError::Database(e.to_string())
}

/// SQLite-backed analysis cache.
pub struct SqliteAnalysisCache {
    conn: Mutex<Connection>,
}

impl SqliteAnalysisCache {
    /// Open (or create) the cache table in the database at `path`.
    pub fn new(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_cache (
                repo_id TEXT NOT NULL,
                last_commit_at TEXT NOT NULL,
                breakdown TEXT NOT NULL,
                issues TEXT,
                stored_at TEXT NOT NULL,
                PRIMARY KEY (repo_id, last_commit_at)
            );

            CREATE INDEX IF NOT EXISTS idx_analysis_cache_stored ON analysis_cache(stored_at);
            "#,
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Database("connection lock poisoned".to_string()))
    }

    /// Insert a raw payload (used to simulate corruption in tests).
    #[cfg(test)]
    fn put_raw(&self, repo_id: &str, last_commit_at: DateTime<Utc>, payload: &str) {
        let conn = self.conn().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO analysis_cache (repo_id, last_commit_at, breakdown, stored_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![repo_id, to_db_time(last_commit_at), payload, to_db_time(Utc::now())],
        )
        .unwrap();
    }
}

fn decode_entry(payload: &str, issues: Option<&str>) -> Result<CachedAnalysis, serde_json::Error> {
    let breakdown: ScoreBreakdown = serde_json::from_str(payload)?;
    let issues = issues
        .map(serde_json::from_str::<IssueSummary>)
        .transpose()?;
    Ok(CachedAnalysis { breakdown, issues })
}

impl AnalysisCache for SqliteAnalysisCache {
    fn get(
        &self,
        repo_id: &str,
        last_commit_at: DateTime<Utc>,
    ) -> Result<Option<CachedAnalysis>, CacheError> {
        let conn = self.conn()?;
        let key = to_db_time(last_commit_at);

        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT breakdown, issues FROM analysis_cache
                 WHERE repo_id = ?1 AND last_commit_at = ?2",
                params![repo_id, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        let Some((payload, issues)) = row else {
            return Ok(None);
        };

        match decode_entry(&payload, issues.as_deref()) {
            Ok(analysis) if analysis.breakdown.is_consistent() => Ok(Some(analysis)),
            outcome => {
                let reason = match outcome {
                    Err(e) => e.to_string(),
                    Ok(_) => "overall does not match sub-scores".to_string(),
                };
                warn!(repo_id = %repo_id, reason = %reason, "Discarding inconsistent cache entry");
                conn.execute(
                    "DELETE FROM analysis_cache WHERE repo_id = ?1 AND last_commit_at = ?2",
                    params![repo_id, key],
                )
                .map_err(db_err)?;
                Err(CacheError::Inconsistent(repo_id.to_string()))
            }
        }
    }

    fn put(
        &self,
        repo_id: &str,
        last_commit_at: DateTime<Utc>,
        analysis: &CachedAnalysis,
    ) -> Result<(), CacheError> {
        let encode = |e: serde_json::Error| CacheError::Database(e.to_string());
        let payload = serde_json::to_string(&analysis.breakdown).map_err(encode)?;
        let issues = analysis
            .issues
            .map(|issues| serde_json::to_string(&issues))
            .transpose()
            .map_err(encode)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO analysis_cache (repo_id, last_commit_at, breakdown, issues, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(repo_id, last_commit_at) DO UPDATE SET
                breakdown = excluded.breakdown,
                issues = excluded.issues,
                stored_at = excluded.stored_at",
            params![
                repo_id,
                to_db_time(last_commit_at),
                payload,
                issues,
                to_db_time(analysis.breakdown.computed_at)
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn sweep(&self, cutoff: DateTime<Utc>) -> Result<u64, CacheError> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM analysis_cache WHERE stored_at < ?1",
                params![to_db_time(cutoff)],
            )
            .map_err(db_err)?;
        Ok(removed as u64)
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let conn = self.conn()?;
        let (entries, oldest): (i64, Option<String>) = conn
            .query_row(
                "SELECT COUNT(*), MIN(stored_at) FROM analysis_cache",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(db_err)?;

        let oldest_stored_at = match oldest {
            Some(s) => Some(from_db_time(&s).map_err(db_err)?),
            None => None,
        };
        Ok(CacheStats {
            entries: entries as u64,
            oldest_stored_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn commit() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn breakdown() -> ScoreBreakdown {
        ScoreBreakdown::new(4.0, 3.5, 5.0, 2.0, commit())
    }

    fn entry(breakdown: ScoreBreakdown) -> CachedAnalysis {
        CachedAnalysis {
            breakdown,
            issues: Some(IssueSummary {
                good_first_issues: 3,
                help_wanted_issues: 1,
                bug_issues: 0,
            }),
        }
    }

    #[test]
    fn test_hit_requires_exact_commit() {
        let cache = SqliteAnalysisCache::in_memory().unwrap();
        cache.put("octo/a", commit(), &entry(breakdown())).unwrap();

        let hit = cache.get("octo/a", commit()).unwrap().unwrap();
        assert_eq!(hit, entry(breakdown()));

        let newer = commit() + Duration::seconds(1);
        assert!(cache.get("octo/a", newer).unwrap().is_none());
        assert!(cache.get("octo/b", commit()).unwrap().is_none());
    }

    #[test]
    fn test_put_overwrites_same_key() {
        let cache = SqliteAnalysisCache::in_memory().unwrap();
        cache.put("octo/a", commit(), &entry(breakdown())).unwrap();
        let replacement = CachedAnalysis {
            breakdown: ScoreBreakdown::new(1.0, 1.0, 1.0, 1.0, commit()),
            issues: None,
        };
        cache.put("octo/a", commit(), &replacement).unwrap();

        assert_eq!(cache.get("octo/a", commit()).unwrap().unwrap(), replacement);
        assert_eq!(cache.stats().unwrap().entries, 1);
    }

    #[test]
    fn test_corrupt_entry_is_discarded() {
        let cache = SqliteAnalysisCache::in_memory().unwrap();
        cache.put_raw("octo/a", commit(), "{not json");

        let err = cache.get("octo/a", commit()).unwrap_err();
        assert!(matches!(err, CacheError::Inconsistent(_)));
        // Entry removed, so the next lookup is a plain miss
        assert!(cache.get("octo/a", commit()).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_issue_counts_are_discarded() {
        let cache = SqliteAnalysisCache::in_memory().unwrap();
        cache.put("octo/a", commit(), &entry(breakdown())).unwrap();
        cache
            .conn()
            .unwrap()
            .execute("UPDATE analysis_cache SET issues = 'oops'", [])
            .unwrap();

        assert!(matches!(
            cache.get("octo/a", commit()),
            Err(CacheError::Inconsistent(_))
        ));
        assert!(cache.get("octo/a", commit()).unwrap().is_none());
    }

    #[test]
    fn test_tampered_overall_is_discarded() {
        let cache = SqliteAnalysisCache::in_memory().unwrap();
        let mut tampered = breakdown();
        tampered.overall = 5.0;
        cache.put_raw(
            "octo/a",
            commit(),
            &serde_json::to_string(&tampered).unwrap(),
        );

        assert!(matches!(
            cache.get("octo/a", commit()),
            Err(CacheError::Inconsistent(_))
        ));
        assert_eq!(cache.stats().unwrap().entries, 0);
    }

    #[test]
    fn test_sweep_removes_old_entries() {
        let cache = SqliteAnalysisCache::in_memory().unwrap();
        let old = ScoreBreakdown::new(1.0, 1.0, 1.0, 1.0, Utc::now() - Duration::days(40));
        let fresh = ScoreBreakdown::new(1.0, 1.0, 1.0, 1.0, Utc::now());
        cache.put("octo/old", commit(), &entry(old)).unwrap();
        cache.put("octo/fresh", commit(), &entry(fresh)).unwrap();

        let removed = cache.sweep(Utc::now() - Duration::days(30)).unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("octo/old", commit()).unwrap().is_none());
        assert!(cache.get("octo/fresh", commit()).unwrap().is_some());
    }

    #[test]
    fn test_shares_database_file_with_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reposcout.db");
        let _store = crate::store::SqliteUserStateStore::new(&path).unwrap();
        let cache = SqliteAnalysisCache::new(&path).unwrap();
        cache.put("octo/a", commit(), &entry(breakdown())).unwrap();

        let reopened = SqliteAnalysisCache::new(&path).unwrap();
        assert!(reopened.get("octo/a", commit()).unwrap().is_some());
    }
}
