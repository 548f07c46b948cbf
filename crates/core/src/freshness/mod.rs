//! Per-user no-repeat filter.
//!
//! A repository shown to a user is suppressed for that user until its last
//! exposure falls outside the freshness window, unless the caller forces a
//! refresh.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::store::{SeenRecord, StoreError, UserStateStore};
use crate::upstream::{RepoId, RepositoryCandidate};

/// Result of filtering one batch of candidates.
#[derive(Debug, Default)]
pub struct FreshnessOutcome {
    /// Candidates the user may be shown, in input order.
    pub admitted: Vec<RepositoryCandidate>,
    /// Admitted repositories the user has seen before (stale or forced).
    pub previously_seen: HashSet<String>,
    /// Candidates withheld because they were shown within the window.
    pub suppressed: usize,
}

/// Start of a `window_days` window ending at `now`, clamped to the Unix epoch.
pub fn window_start(window_days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    Duration::try_days(window_days as i64)
        .and_then(|window| now.checked_sub_signed(window))
        .map_or(epoch, |start| start.max(epoch))
}

/// Whether a seen record still blocks the repository at `now`.
pub fn is_recent(record: &SeenRecord, window_days: u32, now: DateTime<Utc>) -> bool {
    record.last_shown_at >= window_start(window_days, now)
}

/// Filters candidates against a user's exposure history.
pub struct FreshnessFilter {
    store: Arc<dyn UserStateStore>,
}

impl FreshnessFilter {
    pub fn new(store: Arc<dyn UserStateStore>) -> Self {
        Self { store }
    }

    /// Admit candidates that are unseen, stale, or forced.
    pub fn filter(
        &self,
        user_id: &str,
        candidates: Vec<RepositoryCandidate>,
        window_days: u32,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> Result<FreshnessOutcome, StoreError> {
        if candidates.is_empty() {
            return Ok(FreshnessOutcome::default());
        }

        let ids: Vec<String> = candidates.iter().map(|c| c.id.to_string()).collect();
        let seen: HashMap<String, SeenRecord> = self
            .store
            .get_seen_records(user_id, &ids)?
            .into_iter()
            .map(|r| (r.repo_id.clone(), r))
            .collect();

        let mut outcome = FreshnessOutcome::default();
        for candidate in candidates {
            match seen.get(candidate.id.as_str()) {
                None => outcome.admitted.push(candidate),
                Some(record) => {
                    if !force_refresh && is_recent(record, window_days, now) {
                        outcome.suppressed += 1;
                        continue;
                    }
                    outcome.previously_seen.insert(candidate.id.to_string());
                    outcome.admitted.push(candidate);
                }
            }
        }

        debug!(
            user_id = %user_id,
            admitted = outcome.admitted.len(),
            suppressed = outcome.suppressed,
            force_refresh = force_refresh,
            "Freshness filter applied"
        );
        Ok(outcome)
    }

    /// Record that `repo_ids` were shown to the user in run `run_id`.
    ///
    /// Duplicate ids within one call are recorded once. Repeating the call
    /// for the same run leaves the exposure counts unchanged.
    pub fn record_shown(
        &self,
        user_id: &str,
        run_id: &str,
        repo_ids: &[RepoId],
        now: DateTime<Utc>,
    ) -> Result<Vec<SeenRecord>, StoreError> {
        let mut unique = HashSet::new();
        let mut records = Vec::with_capacity(repo_ids.len());
        for id in repo_ids {
            if unique.insert(id.as_str()) {
                records.push(
                    self.store
                        .upsert_seen_record(user_id, id.as_str(), run_id, now)?,
                );
            }
        }
        Ok(records)
    }
}
