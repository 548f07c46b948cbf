//! Analysis cache keyed by repository and last commit.
//!
//! A breakdown is only reused for the exact upstream state it was computed
//! from; a new commit produces a new key, so stale entries are never hit and
//! only need to be swept eventually. The issue counts the breakdown was
//! computed from are stored with it.

mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scoring::ScoreBreakdown;
use crate::upstream::IssueSummary;

pub use sqlite::SqliteAnalysisCache;

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entries stored longer ago than this are removed by a sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

/// One cached analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAnalysis {
    pub breakdown: ScoreBreakdown,
    pub issues: Option<IssueSummary>,
}

/// Cache size summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_stored_at: Option<DateTime<Utc>>,
}

/// Errors from the analysis cache.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(String),

    /// A stored entry could not be trusted; it has been discarded.
    #[error("Inconsistent cache entry for {0}")]
    Inconsistent(String),
}

/// Trait for analysis cache backends.
pub trait AnalysisCache: Send + Sync {
    /// Analysis for exactly this `(repo_id, last_commit_at)`, if stored.
    fn get(
        &self,
        repo_id: &str,
        last_commit_at: DateTime<Utc>,
    ) -> Result<Option<CachedAnalysis>, CacheError>;

    fn put(
        &self,
        repo_id: &str,
        last_commit_at: DateTime<Utc>,
        analysis: &CachedAnalysis,
    ) -> Result<(), CacheError>;

    /// Remove entries stored before `cutoff`. Returns entries removed.
    fn sweep(&self, cutoff: DateTime<Utc>) -> Result<u64, CacheError>;

    fn stats(&self) -> Result<CacheStats, CacheError>;
}
