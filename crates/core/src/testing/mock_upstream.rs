//! Mock upstream client for testing.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::upstream::{
    CandidatePage, IssueSummary, RateLimitInfo, RepoId, RepositoryCandidate, SearchQuery,
    SortOrder, UpstreamClient, UpstreamError, UpstreamResponse,
};

/// Which trait method a recorded call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Search,
    Repository,
    IssueSummary,
}

/// A recorded upstream call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub query: Option<SearchQuery>,
    pub cursor: Option<String>,
    pub repo_id: Option<String>,
}

/// Mock implementation of the UpstreamClient trait.
///
/// Behaves like a small in-memory repository host:
/// - Search filters the configured repositories by star range and topic,
///   sorts them per the query, and pages with offset cursors
/// - Search and repository responses omit issue summaries, like the real
///   adapter; `fetch_issue_summary` returns the configured counts
/// - Every response carries rate-limit metadata from a decrementing counter
/// - Errors can be queued and repositories can be marked missing
///
/// # Example
///
/// ```rust,ignore
/// use reposcout_core::testing::{MockUpstreamClient, fixtures};
///
/// let upstream = MockUpstreamClient::new();
/// upstream.set_repositories(fixtures::candidates("octo", 40, 150)).await;
/// upstream.push_error(UpstreamError::Timeout).await;
///
/// // ... run discovery ...
///
/// let calls = upstream.recorded_calls().await;
/// assert!(calls.iter().any(|c| c.kind == CallKind::Search));
/// ```
pub struct MockUpstreamClient {
    repositories: Arc<RwLock<Vec<RepositoryCandidate>>>,
    missing: Arc<RwLock<HashSet<String>>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    errors: Arc<RwLock<VecDeque<UpstreamError>>>,
    remaining: Arc<RwLock<u32>>,
    reset_at: Arc<RwLock<DateTime<Utc>>>,
    cost: Arc<RwLock<u32>>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl std::fmt::Debug for MockUpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockUpstreamClient")
            .field("repositories", &"<repositories>")
            .field("calls", &"<calls>")
            .field("errors", &"<errors>")
            .finish()
    }
}

impl Default for MockUpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUpstreamClient {
    pub fn new() -> Self {
        Self {
            repositories: Arc::new(RwLock::new(Vec::new())),
            missing: Arc::new(RwLock::new(HashSet::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            errors: Arc::new(RwLock::new(VecDeque::new())),
            remaining: Arc::new(RwLock::new(5000)),
            reset_at: Arc::new(RwLock::new(Utc::now() + ChronoDuration::hours(1))),
            cost: Arc::new(RwLock::new(1)),
            delay: Arc::new(RwLock::new(None)),
        }
    }

    /// Replace the hosted repositories.
    pub async fn set_repositories(&self, repositories: Vec<RepositoryCandidate>) {
        *self.repositories.write().await = repositories;
    }

    /// Make a repository behave as deleted or private.
    pub async fn mark_missing(&self, repo_id: &str) {
        self.missing.write().await.insert(repo_id.to_string());
    }

    /// Queue an error; each call consumes one queued error before succeeding.
    pub async fn push_error(&self, error: UpstreamError) {
        self.errors.write().await.push_back(error);
    }

    /// Set the remaining quota reported by subsequent responses.
    pub async fn set_remaining(&self, remaining: u32) {
        *self.remaining.write().await = remaining;
    }

    /// Set the cost reported per call.
    pub async fn set_cost(&self, cost: u32) {
        *self.cost.write().await = cost;
    }

    /// Delay every call by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self, kind: CallKind) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.kind == kind)
            .count()
    }

    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }

    /// Record, delay, pop a queued error, and charge the quota.
    async fn begin(&self, call: RecordedCall) -> Result<RateLimitInfo, UpstreamError> {
        self.calls.write().await.push(call);

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.errors.write().await.pop_front() {
            return Err(error);
        }

        let cost = *self.cost.read().await;
        let mut remaining = self.remaining.write().await;
        if *remaining == 0 {
            return Err(UpstreamError::RateLimited {
                reset_at: Some(*self.reset_at.read().await),
            });
        }
        *remaining = remaining.saturating_sub(cost);

        Ok(RateLimitInfo {
            remaining: *remaining,
            limit: Some(5000),
            reset_at: *self.reset_at.read().await,
            cost: Some(cost),
        })
    }

    async fn find(&self, id: &RepoId) -> Result<RepositoryCandidate, UpstreamError> {
        if self.missing.read().await.contains(id.as_str()) {
            return Err(UpstreamError::NotFound(id.to_string()));
        }
        self.repositories
            .read()
            .await
            .iter()
            .find(|r| r.id == *id)
            .cloned()
            .ok_or_else(|| UpstreamError::NotFound(id.to_string()))
    }
}

fn matches_query(candidate: &RepositoryCandidate, query: &SearchQuery) -> bool {
    candidate.stars >= query.min_stars
        && candidate.stars <= query.max_stars
        && query
            .topic
            .as_ref()
            .map_or(true, |t| candidate.topics.iter().any(|c| c == t))
}

#[async_trait]
impl UpstreamClient for MockUpstreamClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_candidates(
        &self,
        query: &SearchQuery,
        cursor: Option<&str>,
    ) -> Result<UpstreamResponse<CandidatePage>, UpstreamError> {
        let rate_limit = self
            .begin(RecordedCall {
                kind: CallKind::Search,
                query: Some(query.clone()),
                cursor: cursor.map(str::to_string),
                repo_id: None,
            })
            .await?;

        let offset: usize = match cursor {
            Some(c) => c
                .strip_prefix("offset:")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| UpstreamError::InvalidResponse(format!("bad cursor {}", c)))?,
            None => 0,
        };

        let mut matching: Vec<RepositoryCandidate> = self
            .repositories
            .read()
            .await
            .iter()
            .filter(|r| matches_query(r, query))
            .cloned()
            .collect();

        match query.sort {
            SortOrder::Stars => matching.sort_by(|a, b| b.stars.cmp(&a.stars).then(a.id.cmp(&b.id))),
            SortOrder::Updated => matching.sort_by(|a, b| {
                b.last_commit_at
                    .cmp(&a.last_commit_at)
                    .then(a.id.cmp(&b.id))
            }),
            SortOrder::Created => matching.sort_by(|a, b| b.id.cmp(&a.id)),
        }

        let page_size = query.page_size.max(1) as usize;
        let end = (offset + page_size).min(matching.len());
        let candidates: Vec<RepositoryCandidate> = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .cloned()
            .map(|mut c| {
                c.issues = None;
                c
            })
            .collect();
        let next_cursor = (end < matching.len()).then(|| format!("offset:{}", end));

        Ok(UpstreamResponse {
            data: CandidatePage {
                candidates,
                next_cursor,
            },
            rate_limit,
        })
    }

    async fn fetch_repository(
        &self,
        id: &RepoId,
    ) -> Result<UpstreamResponse<RepositoryCandidate>, UpstreamError> {
        let rate_limit = self
            .begin(RecordedCall {
                kind: CallKind::Repository,
                query: None,
                cursor: None,
                repo_id: Some(id.to_string()),
            })
            .await?;

        let mut candidate = self.find(id).await?;
        candidate.issues = None;
        Ok(UpstreamResponse {
            data: candidate,
            rate_limit,
        })
    }

    async fn fetch_issue_summary(
        &self,
        id: &RepoId,
    ) -> Result<UpstreamResponse<IssueSummary>, UpstreamError> {
        let rate_limit = self
            .begin(RecordedCall {
                kind: CallKind::IssueSummary,
                query: None,
                cursor: None,
                repo_id: Some(id.to_string()),
            })
            .await?;

        let candidate = self.find(id).await?;
        Ok(UpstreamResponse {
            data: candidate.issues.unwrap_or_default(),
            rate_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn query(min: u32, max: u32, page_size: u32) -> SearchQuery {
        SearchQuery {
            min_stars: min,
            max_stars: max,
            sort: SortOrder::Stars,
            topic: None,
            page_size,
        }
    }

    #[tokio::test]
    async fn test_pages_through_results() {
        let upstream = MockUpstreamClient::new();
        upstream
            .set_repositories(fixtures::candidates("octo", 5, 100))
            .await;

        let first = upstream
            .fetch_candidates(&query(0, 1000, 3), None)
            .await
            .unwrap();
        assert_eq!(first.data.candidates.len(), 3);
        assert_eq!(first.data.candidates[0].stars, 104);
        assert!(first.data.candidates.iter().all(|c| c.issues.is_none()));
        assert_eq!(first.rate_limit.remaining, 4999);

        let cursor = first.data.next_cursor.unwrap();
        let second = upstream
            .fetch_candidates(&query(0, 1000, 3), Some(&cursor))
            .await
            .unwrap();
        assert_eq!(second.data.candidates.len(), 2);
        assert!(second.data.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_star_range_and_topic_filter() {
        let upstream = MockUpstreamClient::new();
        let mut tagged = fixtures::candidate("octo/ml", 500);
        tagged.topics = vec!["machine-learning".to_string()];
        upstream
            .set_repositories(vec![tagged, fixtures::candidate("octo/plain", 500)])
            .await;

        let mut q = query(100, 1000, 10);
        q.topic = Some("machine-learning".to_string());
        let page = upstream.fetch_candidates(&q, None).await.unwrap();
        assert_eq!(page.data.candidates.len(), 1);
        assert_eq!(page.data.candidates[0].id.as_str(), "octo/ml");

        let page = upstream
            .fetch_candidates(&query(600, 1000, 10), None)
            .await
            .unwrap();
        assert!(page.data.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_queued_errors_and_missing() {
        let upstream = MockUpstreamClient::new();
        upstream
            .set_repositories(vec![fixtures::candidate("octo/a", 10)])
            .await;
        upstream.push_error(UpstreamError::Timeout).await;

        let id: RepoId = "octo/a".parse().unwrap();
        assert!(matches!(
            upstream.fetch_repository(&id).await,
            Err(UpstreamError::Timeout)
        ));
        assert!(upstream.fetch_repository(&id).await.is_ok());

        upstream.mark_missing("octo/a").await;
        assert!(matches!(
            upstream.fetch_issue_summary(&id).await,
            Err(UpstreamError::NotFound(_))
        ));
        assert_eq!(upstream.call_count(CallKind::Repository).await, 2);
    }

    #[tokio::test]
    async fn test_zero_quota_is_rate_limited() {
        let upstream = MockUpstreamClient::new();
        upstream.set_remaining(0).await;
        let result = upstream.fetch_candidates(&query(0, 10, 10), None).await;
        assert!(matches!(result, Err(UpstreamError::RateLimited { .. })));
    }
}
