//! Discovery orchestrator implementation.
//!
//! One run loops over strategy rounds:
//! - Rotation: pick the next strategy and resume its cursor
//! - Fetch: one page through the upstream gate
//! - Filter: run de-duplication, freshness, domain rules
//! - Score: cache first, otherwise issue summary + scorer
//!
//! It stops at the limit, when strategies run out, at the round cap, or on
//! deadline/budget/upstream failure, then records the exposures it returns.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::budget::UpstreamGate;
use crate::cache::{AnalysisCache, CacheConfig, CacheError, CachedAnalysis};
use crate::config::{Config, RetentionConfig};
use crate::freshness::{window_start, FreshnessFilter};
use crate::metrics;
use crate::scoring::{rank_order, ScoreBreakdown, SuitabilityScorer};
use crate::store::{StoreError, UserReset, UserStateStore, UserStats};
use crate::strategy::{CursorAdvance, RotationSlot, SearchStrategyRotator, StrategyStatus};
use crate::upstream::{IssueSummary, RepoId, RepositoryCandidate, UpstreamClient};

use super::filters::DomainFilter;
use super::types::{
    CleanupReport, DiscoveryDiagnostics, DiscoveryError, DiscoveryRequest, EngineDiagnostics,
    RankedRepository, RankedResult, RepositoryAnalysis, RunCriteria, StopReason,
};
use super::DiscoveryConfig;

/// Mutable state of one run. Survives deadline cancellation of the loop.
#[derive(Default)]
struct RunState {
    considered: HashSet<String>,
    accumulated: Vec<RankedRepository>,
    diagnostics: DiscoveryDiagnostics,
    error: Option<DiscoveryError>,
}

impl RunState {
    fn consulted(&mut self, strategy_id: &str) {
        if !self
            .diagnostics
            .strategies_consulted
            .iter()
            .any(|s| s == strategy_id)
        {
            self.diagnostics
                .strategies_consulted
                .push(strategy_id.to_string());
        }
    }
}

/// A candidate with its resolved breakdown.
struct Scored {
    candidate: RepositoryCandidate,
    score: ScoreBreakdown,
    from_cache: bool,
}

/// Outcome of scoring one batch.
#[derive(Default)]
struct ScoredBatch {
    scored: Vec<Scored>,
    upstream_calls: u32,
    cache_hits: u32,
    cache_misses: u32,
    skipped_unavailable: u32,
    /// Budget or upstream failure that should end the run.
    fatal: Option<DiscoveryError>,
}

/// Composes rotation, freshness, caching and scoring into discovery runs.
pub struct DiscoveryOrchestrator {
    config: DiscoveryConfig,
    cache_config: CacheConfig,
    upstream: Arc<dyn UpstreamClient>,
    store: Arc<dyn UserStateStore>,
    cache: Arc<dyn AnalysisCache>,
    gate: Arc<UpstreamGate>,
    rotator: SearchStrategyRotator,
    freshness: FreshnessFilter,
    domain: DomainFilter,
    scorer: SuitabilityScorer,
    last_sweep: Mutex<Option<Instant>>,
}

impl DiscoveryOrchestrator {
    pub fn new(
        config: &Config,
        upstream: Arc<dyn UpstreamClient>,
        store: Arc<dyn UserStateStore>,
        cache: Arc<dyn AnalysisCache>,
        gate: Arc<UpstreamGate>,
    ) -> Self {
        Self {
            config: config.discovery.clone(),
            cache_config: config.cache.clone(),
            rotator: SearchStrategyRotator::new(config.strategies.clone(), store.clone()),
            freshness: FreshnessFilter::new(store.clone()),
            domain: DomainFilter::new(&config.filters),
            scorer: SuitabilityScorer::new(config.scoring.clone()),
            upstream,
            store,
            cache,
            gate,
            last_sweep: Mutex::new(None),
        }
    }

    pub fn gate(&self) -> &Arc<UpstreamGate> {
        &self.gate
    }

    /// Discover up to `limit` repositories the user has not seen recently.
    pub async fn discover(&self, request: DiscoveryRequest) -> Result<RankedResult, DiscoveryError> {
        let started = Instant::now();
        let criteria = request.resolve(&self.config)?;
        let run_id = Uuid::new_v4().to_string();

        info!(
            run_id = %run_id,
            user_id = %request.user_id,
            min_stars = request.min_stars,
            max_stars = request.max_stars,
            limit = criteria.limit,
            window_days = criteria.window_days,
            force_refresh = request.force_refresh,
            "Starting discovery run"
        );

        if request.force_refresh {
            let cleared = self.rotator.reset(&request.user_id)?;
            debug!(user_id = %request.user_id, cleared = cleared, "Strategy flags cleared");
        }

        let mut run = RunState::default();
        let deadline = tokio::time::Instant::now() + criteria.deadline;
        let rounds =
            tokio::time::timeout_at(deadline, self.run_rounds(&request, &criteria, &mut run)).await;
        let stop = match rounds {
            Ok(Ok(reason)) => reason,
            Ok(Err(e)) => {
                metrics::record_discovery_run("failed", started.elapsed().as_secs_f64(), 0);
                return Err(e);
            }
            Err(_) => {
                warn!(run_id = %run_id, "Discovery deadline exceeded, returning partial result");
                run.error = Some(DiscoveryError::DeadlineExceeded);
                StopReason::DeadlineExceeded
            }
        };

        let mut repositories = std::mem::take(&mut run.accumulated);
        repositories.sort_by(|a, b| {
            rank_order((&a.score, &a.repository), (&b.score, &b.repository))
        });
        repositories.truncate(criteria.limit);

        if repositories.is_empty() && stop.is_partial() {
            metrics::record_discovery_run("failed", started.elapsed().as_secs_f64(), 0);
            return Err(run.error.take().unwrap_or(DiscoveryError::DeadlineExceeded));
        }

        let shown: Vec<RepoId> = repositories
            .iter()
            .map(|r| r.repository.id.clone())
            .collect();
        self.freshness
            .record_shown(&request.user_id, &run_id, &shown, Utc::now())?;

        let snapshot = self.gate.snapshot().await;
        let mut diagnostics = run.diagnostics;
        diagnostics.limit_satisfied = repositories.len() >= criteria.limit;
        diagnostics.partial = stop.is_partial();
        diagnostics.stop_reason = stop;
        diagnostics.budget_remaining = snapshot.remaining;
        diagnostics.elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = if diagnostics.partial {
            "partial"
        } else {
            "complete"
        };
        metrics::record_discovery_run(
            outcome,
            started.elapsed().as_secs_f64(),
            repositories.len(),
        );

        info!(
            run_id = %run_id,
            user_id = %request.user_id,
            returned = repositories.len(),
            rounds = diagnostics.rounds,
            upstream_calls = diagnostics.upstream_calls,
            stop_reason = ?stop,
            "Discovery run finished"
        );

        self.maybe_sweep_cache().await;

        Ok(RankedResult {
            run_id,
            user_id: request.user_id,
            repositories,
            diagnostics,
        })
    }

    async fn run_rounds(
        &self,
        request: &DiscoveryRequest,
        criteria: &RunCriteria,
        run: &mut RunState,
    ) -> Result<StopReason, DiscoveryError> {
        for _ in 0..self.config.max_rounds {
            if run.accumulated.len() >= criteria.limit {
                return Ok(StopReason::LimitReached);
            }

            let Some(slot) = self.rotator.next(
                &request.user_id,
                request.min_stars,
                request.max_stars,
                self.config.page_size,
            )?
            else {
                return Ok(StopReason::StrategiesExhausted);
            };

            run.diagnostics.rounds += 1;
            run.consulted(&slot.strategy.id);
            if let Some(reason) = self.run_round(request, criteria, &slot, run).await? {
                return Ok(reason);
            }
        }

        if run.accumulated.len() >= criteria.limit {
            Ok(StopReason::LimitReached)
        } else {
            Ok(StopReason::RoundCapReached)
        }
    }

    /// One fetch-filter-score round. Returns a stop reason when the run must end.
    async fn run_round(
        &self,
        request: &DiscoveryRequest,
        criteria: &RunCriteria,
        slot: &RotationSlot,
        run: &mut RunState,
    ) -> Result<Option<StopReason>, DiscoveryError> {
        let user_id = request.user_id.as_str();

        run.diagnostics.upstream_calls += 1;
        let page = match self
            .gate
            .call("search", || {
                self.upstream
                    .fetch_candidates(&slot.query, slot.cursor.as_deref())
            })
            .await
        {
            Ok(page) => page,
            Err(e) => {
                let e = DiscoveryError::from(e);
                warn!(user_id = %user_id, strategy = %slot.strategy.id, error = %e, "Search failed");
                let reason = stop_reason_for(&e);
                run.error = Some(e);
                return Ok(Some(reason));
            }
        };

        run.diagnostics.candidates_seen += page.candidates.len() as u32;
        let unconsidered: Vec<RepositoryCandidate> = page
            .candidates
            .into_iter()
            .filter(|c| run.considered.insert(c.id.to_string()))
            .collect();

        let now = Utc::now();
        let freshness = self.freshness.filter(
            user_id,
            unconsidered,
            criteria.window_days,
            request.force_refresh,
            now,
        )?;
        run.diagnostics.suppressed_by_freshness += freshness.suppressed as u32;
        let new_candidates = freshness.admitted.len();

        // Score the whole page; the cursor advances past all of it and the
        // final ranking picks the top `limit`.
        let mut eligible = Vec::new();
        for candidate in freshness.admitted {
            match self
                .domain
                .check(&candidate, request.min_stars, request.max_stars)
            {
                Ok(()) => eligible.push(candidate),
                Err(rejection) => {
                    run.diagnostics.filtered_out += 1;
                    debug!(repo = %candidate.id, reason = %rejection, "Candidate filtered out");
                }
            }
        }

        let batch = self.score_batch(eligible, now).await;
        run.diagnostics.upstream_calls += batch.upstream_calls;
        run.diagnostics.cache_hits += batch.cache_hits;
        run.diagnostics.cache_misses += batch.cache_misses;
        run.diagnostics.skipped_unavailable += batch.skipped_unavailable;

        for scored in batch.scored {
            let previously_shown = freshness
                .previously_seen
                .contains(scored.candidate.id.as_str());
            run.accumulated.push(RankedRepository {
                verdict: scored.score.verdict(),
                repository: scored.candidate,
                score: scored.score,
                strategy_id: slot.strategy.id.clone(),
                from_cache: scored.from_cache,
                previously_shown,
            });
        }

        let advance = match page.next_cursor {
            Some(token) if new_candidates > 0 => CursorAdvance::Next(token),
            _ => CursorAdvance::Exhausted,
        };
        self.rotator.advance(user_id, slot, advance, now)?;

        debug!(
            user_id = %user_id,
            strategy = %slot.strategy.id,
            new_candidates = new_candidates,
            accumulated = run.accumulated.len(),
            "Discovery round complete"
        );

        if let Some(e) = batch.fatal {
            let reason = stop_reason_for(&e);
            run.error = Some(e);
            return Ok(Some(reason));
        }
        Ok(None)
    }

    /// Resolve breakdowns for a batch: cache hits first, then concurrent
    /// issue-summary fetches for the misses.
    async fn score_batch(&self, candidates: Vec<RepositoryCandidate>, now: DateTime<Utc>) -> ScoredBatch {
        let mut batch = ScoredBatch::default();
        let mut misses = Vec::new();

        for mut candidate in candidates {
            match self.cached_analysis(&candidate) {
                Some(cached) => {
                    batch.cache_hits += 1;
                    candidate.issues = candidate.issues.or(cached.issues);
                    batch.scored.push(Scored {
                        candidate,
                        score: cached.breakdown,
                        from_cache: true,
                    });
                }
                None => {
                    batch.cache_misses += 1;
                    misses.push(candidate);
                }
            }
        }

        let summaries = join_all(misses.iter().map(|c| self.issue_summary(c))).await;
        for (mut candidate, summary) in misses.into_iter().zip(summaries) {
            if candidate.issues.is_none() {
                batch.upstream_calls += 1;
            }
            match summary {
                Ok(issues) => {
                    candidate.issues = Some(issues);
                    let score = self.score_and_store(&candidate, now);
                    batch.scored.push(Scored {
                        candidate,
                        score,
                        from_cache: false,
                    });
                }
                Err(DiscoveryError::RepositoryUnavailable(id)) => {
                    batch.skipped_unavailable += 1;
                    debug!(repo = %id, "Repository unavailable, skipped");
                }
                Err(e) => {
                    batch.skipped_unavailable += 1;
                    warn!(repo = %candidate.id, error = %e, "Issue summary failed");
                    if batch.fatal.is_none() {
                        batch.fatal = Some(e);
                    }
                }
            }
        }

        batch
    }

    async fn issue_summary(
        &self,
        candidate: &RepositoryCandidate,
    ) -> Result<IssueSummary, DiscoveryError> {
        if let Some(issues) = candidate.issues {
            return Ok(issues);
        }
        let id = &candidate.id;
        Ok(self
            .gate
            .call("issues", || self.upstream.fetch_issue_summary(id))
            .await?)
    }

    /// Cache lookup. Inconsistent entries and cache failures count as misses.
    fn cached_analysis(&self, candidate: &RepositoryCandidate) -> Option<CachedAnalysis> {
        let last_commit = candidate.last_commit_at?;
        match self.cache.get(candidate.id.as_str(), last_commit) {
            Ok(Some(cached)) => {
                metrics::record_cache_lookup("hit");
                Some(cached)
            }
            Ok(None) => {
                metrics::record_cache_lookup("miss");
                None
            }
            Err(CacheError::Inconsistent(id)) => {
                metrics::record_cache_lookup("inconsistent");
                debug!(repo = %id, "Inconsistent cache entry treated as miss");
                None
            }
            Err(e) => {
                metrics::record_cache_lookup("miss");
                warn!(repo = %candidate.id, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    fn score_and_store(&self, candidate: &RepositoryCandidate, now: DateTime<Utc>) -> ScoreBreakdown {
        let score = self.scorer.score(candidate, now);
        if let Some(last_commit) = candidate.last_commit_at {
            let entry = CachedAnalysis {
                breakdown: score.clone(),
                issues: candidate.issues,
            };
            if let Err(e) = self.cache.put(candidate.id.as_str(), last_commit, &entry) {
                warn!(repo = %candidate.id, error = %e, "Failed to cache breakdown");
            }
        }
        score
    }

    /// Score a single repository. No freshness filtering, no cursor changes.
    pub async fn analyze(&self, repo_id: &RepoId) -> Result<RepositoryAnalysis, DiscoveryError> {
        let mut candidate = self
            .gate
            .call("repository", || self.upstream.fetch_repository(repo_id))
            .await?;

        let (score, from_cache) = match self.cached_analysis(&candidate) {
            Some(cached) => {
                candidate.issues = candidate.issues.or(cached.issues);
                (cached.breakdown, true)
            }
            None => {
                candidate.issues = Some(self.issue_summary(&candidate).await?);
                (self.score_and_store(&candidate, Utc::now()), false)
            }
        };

        debug!(repo = %repo_id, overall = score.overall, from_cache = from_cache, "Repository analyzed");
        Ok(RepositoryAnalysis {
            verdict: score.verdict(),
            suitable: score.is_suitable(),
            repository: candidate,
            score,
            from_cache,
        })
    }

    /// Budget, worker pool, catalogue and cache state.
    pub async fn diagnostics(&self) -> EngineDiagnostics {
        let cache = match self.cache.stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "Failed to read cache stats");
                None
            }
        };
        EngineDiagnostics {
            upstream: self.upstream.name().to_string(),
            budget: self.gate.snapshot().await,
            workers_available: self.gate.available_workers(),
            workers_capacity: self.gate.capacity(),
            strategies: self
                .rotator
                .catalogue()
                .iter()
                .map(|s| s.id.clone())
                .collect(),
            cache,
        }
    }

    pub fn user_stats(&self, user_id: &str, window_days: u32) -> Result<UserStats, StoreError> {
        self.store
            .user_stats(user_id, window_start(window_days, Utc::now()))
    }

    pub fn reset_user(&self, user_id: &str) -> Result<UserReset, StoreError> {
        let reset = self.store.reset_user(user_id)?;
        info!(
            user_id = %user_id,
            seen_records = reset.seen_records_removed,
            cursors = reset.cursors_removed,
            "User state reset"
        );
        Ok(reset)
    }

    pub fn strategy_status(&self, user_id: &str) -> Result<Vec<StrategyStatus>, StoreError> {
        self.rotator.status(user_id)
    }

    pub fn reset_strategies(&self, user_id: &str) -> Result<usize, StoreError> {
        self.rotator.reset(user_id)
    }

    /// Purge stale exposure history and sweep the analysis cache.
    pub async fn cleanup(&self, retention: &RetentionConfig) -> Result<CleanupReport, DiscoveryError> {
        let now = Utc::now();
        let seen_cutoff = now - ChronoDuration::days(retention.seen_retention_days as i64);
        let seen_records_removed = self.store.purge_seen_before(seen_cutoff)?;
        let cache_entries_removed = self.sweep_cache(now)?;
        *self.last_sweep.lock().await = Some(Instant::now());

        info!(
            seen_records_removed = seen_records_removed,
            cache_entries_removed = cache_entries_removed,
            "Retention cleanup complete"
        );
        Ok(CleanupReport {
            seen_records_removed,
            cache_entries_removed,
        })
    }

    fn sweep_cache(&self, now: DateTime<Utc>) -> Result<u64, CacheError> {
        let cutoff = now - ChronoDuration::days(self.cache_config.retention_days as i64);
        self.cache.sweep(cutoff)
    }

    /// Sweep at most once per configured interval.
    async fn maybe_sweep_cache(&self) {
        let interval = std::time::Duration::from_secs(self.config.cache_sweep_interval_secs);
        let mut last = self.last_sweep.lock().await;
        if last.is_some_and(|at| at.elapsed() < interval) {
            return;
        }
        *last = Some(Instant::now());
        match self.sweep_cache(Utc::now()) {
            Ok(0) => {}
            Ok(removed) => debug!(removed = removed, "Cache sweep removed stale entries"),
            Err(e) => warn!(error = %e, "Cache sweep failed"),
        }
    }
}

fn stop_reason_for(error: &DiscoveryError) -> StopReason {
    match error {
        DiscoveryError::RateLimitExceeded { .. } => StopReason::BudgetExhausted,
        DiscoveryError::DeadlineExceeded => StopReason::DeadlineExceeded,
        _ => StopReason::UpstreamUnavailable,
    }
}
