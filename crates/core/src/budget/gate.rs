//! Single entry point for all upstream calls.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::metrics;
use crate::upstream::{UpstreamError, UpstreamResponse};

use super::{BudgetConfig, BudgetSnapshot, GateError, RateBudget, RetryConfig};

/// Budget-checked, bounded-concurrency access to the upstream.
///
/// Each call charges the shared [`RateBudget`], holds one worker permit while
/// in flight, and feeds the response's quota metadata back into the budget.
/// Transient failures are retried with exponential backoff.
pub struct UpstreamGate {
    budget: Arc<RateBudget>,
    workers: Arc<Semaphore>,
    capacity: usize,
    retry: RetryConfig,
}

impl UpstreamGate {
    pub fn new(config: &BudgetConfig) -> Self {
        let capacity = config.max_concurrent_requests.max(1);
        Self {
            budget: Arc::new(RateBudget::new(config)),
            workers: Arc::new(Semaphore::new(capacity)),
            capacity,
            retry: config.retry.clone(),
        }
    }

    pub fn budget(&self) -> &Arc<RateBudget> {
        &self.budget
    }

    /// Worker permits currently free.
    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn snapshot(&self) -> BudgetSnapshot {
        self.budget.snapshot().await
    }

    /// Run one upstream operation under the budget and worker pool.
    ///
    /// `kind` labels the call in metrics and logs. `op` is invoked once per
    /// attempt.
    pub async fn call<T, F, Fut>(&self, kind: &'static str, op: F) -> Result<T, GateError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<UpstreamResponse<T>, UpstreamError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let cost = self.budget.estimated_cost().await;
            if let Err(e) = self.budget.acquire(cost).await {
                metrics::record_upstream_call(kind, "budget_denied");
                return Err(e);
            }

            let result = {
                let _permit = self
                    .workers
                    .acquire()
                    .await
                    .map_err(|_| GateError::Closed)?;
                op().await
            };

            match result {
                Ok(response) => {
                    self.budget.record(&response.rate_limit).await;
                    metrics::record_upstream_call(kind, "ok");
                    return Ok(response.data);
                }
                Err(UpstreamError::RateLimited { reset_at }) => {
                    metrics::record_upstream_call(kind, "rate_limited");
                    self.budget.mark_exhausted(reset_at).await;
                    let snapshot = self.budget.snapshot().await;
                    return Err(GateError::RateLimitExceeded {
                        remaining: snapshot.remaining,
                        reset_at: snapshot.reset_at,
                    });
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    metrics::record_upstream_call(kind, "retry");
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        kind = kind,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient upstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    metrics::record_upstream_call(kind, "error");
                    debug!(kind = kind, attempt = attempt, error = %e, "Upstream call failed");
                    return Err(GateError::Upstream(e));
                }
            }
        }
    }
}

impl std::fmt::Debug for UpstreamGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamGate")
            .field("capacity", &self.capacity)
            .field("available", &self.workers.available_permits())
            .finish()
    }
}
