//! User state storage types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::SearchCursor;

/// Exposure history of one repository for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenRecord {
    pub user_id: String,
    pub repo_id: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_shown_at: DateTime<Utc>,
    pub times_shown: u32,
}

/// Aggregate view of a user's stored state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    /// Distinct repositories ever shown.
    pub seen_repositories: u64,
    /// Repositories shown since the requested window start.
    pub shown_in_window: u64,
    /// Sum of all exposure counts.
    pub total_exposures: u64,
    pub strategies_used: u64,
    pub strategies_exhausted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_shown_at: Option<DateTime<Utc>>,
}

/// Rows removed by a user reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReset {
    pub seen_records_removed: u64,
    pub cursors_removed: u64,
}

/// Errors from the user state store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

/// Trait for per-user persistent state backends.
///
/// Every write is atomic per record; concurrent runs for the same user never
/// lose an exposure or leave a half-written cursor.
pub trait UserStateStore: Send + Sync {
    /// Seen records for the given repositories (all records if `repo_ids` is empty).
    fn get_seen_records(
        &self,
        user_id: &str,
        repo_ids: &[String],
    ) -> Result<Vec<SeenRecord>, StoreError>;

    /// Record that `repo_id` was shown to `user_id` in run `run_id`.
    ///
    /// Repeating the call with the same run id does not count twice.
    fn upsert_seen_record(
        &self,
        user_id: &str,
        repo_id: &str,
        run_id: &str,
        shown_at: DateTime<Utc>,
    ) -> Result<SeenRecord, StoreError>;

    fn get_cursor(
        &self,
        user_id: &str,
        strategy_id: &str,
    ) -> Result<Option<SearchCursor>, StoreError>;

    fn list_cursors(&self, user_id: &str) -> Result<Vec<SearchCursor>, StoreError>;

    fn upsert_cursor(&self, cursor: &SearchCursor) -> Result<(), StoreError>;

    /// Clear exhaustion flags and tokens. Returns cursors touched.
    fn reset_cursors(&self, user_id: &str) -> Result<usize, StoreError>;

    /// Delete seen records last shown before `cutoff`. Returns rows removed.
    fn purge_seen_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    fn user_stats(
        &self,
        user_id: &str,
        window_start: DateTime<Utc>,
    ) -> Result<UserStats, StoreError>;

    /// Delete every record and cursor for a user.
    fn reset_user(&self, user_id: &str) -> Result<UserReset, StoreError>;
}
