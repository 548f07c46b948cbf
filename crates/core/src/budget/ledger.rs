//! Process-wide upstream request budget.
//!
//! The ledger tracks the remaining request quota for the current window.
//! Local charges are provisional: every upstream response overwrites the
//! remaining count and reset time with the authoritative values.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::upstream::RateLimitInfo;

use super::{BudgetConfig, BudgetDecision, BudgetSnapshot, BudgetState, GateError};

/// Weight of the newest observation in the moving cost average.
const COST_SMOOTHING: f64 = 0.2;

/// Budget bookkeeping for one quota window.
#[derive(Debug)]
pub struct BudgetLedger {
    limit: u32,
    remaining: u32,
    reset_at: DateTime<Utc>,
    low_water: u32,
    window: ChronoDuration,
    average_cost: f64,
    throttle_streak: u32,
    next_allowed_at: Option<DateTime<Utc>>,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl BudgetLedger {
    /// Create a full ledger whose window starts at `now`.
    pub fn new(config: &BudgetConfig, now: DateTime<Utc>) -> Self {
        let window = ChronoDuration::seconds(config.window_secs.max(1) as i64);
        Self {
            limit: config.limit,
            remaining: config.limit,
            reset_at: now + window,
            low_water: config.low_water,
            window,
            average_cost: config.initial_cost_estimate.max(1.0),
            throttle_streak: 0,
            next_allowed_at: None,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
        }
    }

    pub fn state(&self) -> BudgetState {
        if self.remaining == 0 {
            BudgetState::Exhausted
        } else if self.remaining < self.low_water {
            BudgetState::Throttled
        } else {
            BudgetState::Available
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    /// Cost to charge for the next call, rounded up.
    pub fn estimated_cost(&self) -> u32 {
        self.average_cost.ceil().max(1.0) as u32
    }

    /// Backoff after `streak` consecutive throttled calls.
    fn backoff(&self, streak: u32) -> Duration {
        let shift = streak.saturating_sub(1).min(20);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Start a new window if the reset time has passed.
    fn roll_window(&mut self, now: DateTime<Utc>) {
        if now >= self.reset_at {
            debug!(limit = self.limit, "Budget window reset");
            self.remaining = self.limit;
            self.reset_at = now + self.window;
            self.throttle_streak = 0;
            self.next_allowed_at = None;
        }
    }

    /// Ask permission to spend `cost` at time `now`.
    pub fn try_consume(&mut self, cost: u32, now: DateTime<Utc>) -> BudgetDecision {
        self.roll_window(now);
        let cost = cost.max(1);

        if self.state() == BudgetState::Exhausted || cost > self.remaining {
            return BudgetDecision::Exhausted {
                reset_at: self.reset_at,
            };
        }

        if self.state() == BudgetState::Throttled {
            if let Some(next) = self.next_allowed_at {
                if now < next {
                    let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                    return BudgetDecision::Defer(wait);
                }
            }
        }

        self.remaining -= cost;

        if self.state() == BudgetState::Throttled {
            self.throttle_streak += 1;
            let wait = self.backoff(self.throttle_streak);
            self.next_allowed_at = ChronoDuration::from_std(wait).ok().map(|w| now + w);
        }

        BudgetDecision::Allow
    }

    /// Apply the authoritative quota from an upstream response.
    pub fn record(&mut self, info: &RateLimitInfo) {
        if let Some(limit) = info.limit {
            self.limit = limit;
        }
        self.remaining = info.remaining;
        self.reset_at = info.reset_at;
        if let Some(cost) = info.cost {
            self.average_cost =
                (1.0 - COST_SMOOTHING) * self.average_cost + COST_SMOOTHING * cost as f64;
        }
        if self.state() == BudgetState::Available {
            self.throttle_streak = 0;
            self.next_allowed_at = None;
        }
    }

    /// Upstream refused a call for quota reasons.
    pub fn mark_exhausted(&mut self, reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.remaining = 0;
        self.reset_at = reset_at.unwrap_or_else(|| (now + self.window).max(self.reset_at));
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            state: self.state(),
            remaining: self.remaining,
            limit: self.limit,
            low_water: self.low_water,
            reset_at: self.reset_at,
            average_cost: self.average_cost,
            throttle_streak: self.throttle_streak,
            next_allowed_at: self.next_allowed_at,
        }
    }
}

/// Shared, serialized access to a [`BudgetLedger`].
///
/// Every consumption decision happens under one lock, so concurrent callers
/// never charge the same quota twice.
#[derive(Debug)]
pub struct RateBudget {
    ledger: Mutex<BudgetLedger>,
    max_deferred_retries: u32,
}

impl RateBudget {
    pub fn new(config: &BudgetConfig) -> Self {
        Self {
            ledger: Mutex::new(BudgetLedger::new(config, Utc::now())),
            max_deferred_retries: config.max_deferred_retries,
        }
    }

    /// Single consumption decision at the current time.
    pub async fn consume(&self, cost: u32) -> BudgetDecision {
        let decision = self.ledger.lock().await.try_consume(cost, Utc::now());
        self.publish().await;
        decision
    }

    /// Wait until `cost` may be spent.
    ///
    /// Deferrals are slept out (without holding the lock) up to the configured
    /// number of times. Exhaustion fails immediately.
    pub async fn acquire(&self, cost: u32) -> Result<(), GateError> {
        let mut deferrals = 0;
        loop {
            match self.consume(cost).await {
                BudgetDecision::Allow => return Ok(()),
                BudgetDecision::Defer(wait) => {
                    deferrals += 1;
                    if deferrals > self.max_deferred_retries {
                        let ledger = self.ledger.lock().await;
                        warn!(
                            remaining = ledger.remaining(),
                            deferrals = deferrals,
                            "Budget throttled past deferral limit"
                        );
                        return Err(GateError::RateLimitExceeded {
                            remaining: ledger.remaining(),
                            reset_at: ledger.reset_at(),
                        });
                    }
                    debug!(wait_ms = wait.as_millis() as u64, "Budget throttled, deferring call");
                    tokio::time::sleep(wait).await;
                }
                BudgetDecision::Exhausted { reset_at } => {
                    let remaining = self.ledger.lock().await.remaining();
                    return Err(GateError::RateLimitExceeded {
                        remaining,
                        reset_at,
                    });
                }
            }
        }
    }

    pub async fn record(&self, info: &RateLimitInfo) {
        {
            let mut ledger = self.ledger.lock().await;
            let before = ledger.state();
            ledger.record(info);
            let after = ledger.state();
            if before != after {
                info!(
                    from = before.as_str(),
                    to = after.as_str(),
                    remaining = info.remaining,
                    reset_at = %info.reset_at,
                    "Budget state changed"
                );
            }
        }
        self.publish().await;
    }

    pub async fn mark_exhausted(&self, reset_at: Option<DateTime<Utc>>) {
        {
            let mut ledger = self.ledger.lock().await;
            ledger.mark_exhausted(reset_at, Utc::now());
            warn!(reset_at = %ledger.reset_at(), "Upstream reported rate limit, budget exhausted");
        }
        self.publish().await;
    }

    pub async fn estimated_cost(&self) -> u32 {
        self.ledger.lock().await.estimated_cost()
    }

    pub async fn snapshot(&self) -> BudgetSnapshot {
        self.ledger.lock().await.snapshot()
    }

    async fn publish(&self) {
        let snapshot = self.snapshot().await;
        crate::metrics::record_budget(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(limit: u32, low_water: u32) -> BudgetConfig {
        BudgetConfig {
            limit,
            low_water,
            initial_backoff_ms: 100,
            max_backoff_ms: 400,
            ..BudgetConfig::default()
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_available_until_low_water() {
        let mut ledger = BudgetLedger::new(&config(10, 5), t0());
        assert_eq!(ledger.state(), BudgetState::Available);

        for _ in 0..5 {
            assert_eq!(ledger.try_consume(1, t0()), BudgetDecision::Allow);
        }
        assert_eq!(ledger.remaining(), 5);
        assert_eq!(ledger.state(), BudgetState::Available);

        assert_eq!(ledger.try_consume(1, t0()), BudgetDecision::Allow);
        assert_eq!(ledger.remaining(), 4);
        assert_eq!(ledger.state(), BudgetState::Throttled);
    }

    #[test]
    fn test_throttled_defers_with_exponential_backoff() {
        let mut ledger = BudgetLedger::new(&config(10, 5), t0());
        for _ in 0..6 {
            ledger.try_consume(1, t0());
        }
        // Entering throttled armed a 100ms backoff
        match ledger.try_consume(1, t0()) {
            BudgetDecision::Defer(wait) => assert_eq!(wait, Duration::from_millis(100)),
            other => panic!("expected defer, got {:?}", other),
        }

        let later = t0() + ChronoDuration::milliseconds(100);
        assert_eq!(ledger.try_consume(1, later), BudgetDecision::Allow);
        match ledger.try_consume(1, later) {
            BudgetDecision::Defer(wait) => assert_eq!(wait, Duration::from_millis(200)),
            other => panic!("expected defer, got {:?}", other),
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let ledger = BudgetLedger::new(&config(10, 5), t0());
        assert_eq!(ledger.backoff(1), Duration::from_millis(100));
        assert_eq!(ledger.backoff(3), Duration::from_millis(400));
        assert_eq!(ledger.backoff(50), Duration::from_millis(400));
    }

    #[test]
    fn test_exhausted_at_zero() {
        let mut ledger = BudgetLedger::new(&config(2, 1), t0());
        assert_eq!(ledger.try_consume(1, t0()), BudgetDecision::Allow);
        // remaining 1, not below low_water 1
        assert_eq!(ledger.try_consume(1, t0()), BudgetDecision::Allow);
        assert_eq!(ledger.state(), BudgetState::Exhausted);
        assert!(matches!(
            ledger.try_consume(1, t0()),
            BudgetDecision::Exhausted { .. }
        ));
    }

    #[test]
    fn test_cost_above_remaining_is_exhausted() {
        let mut ledger = BudgetLedger::new(&config(3, 1), t0());
        assert!(matches!(
            ledger.try_consume(5, t0()),
            BudgetDecision::Exhausted { .. }
        ));
        assert_eq!(ledger.remaining(), 3);
    }

    #[test]
    fn test_window_reset_refills() {
        let mut ledger = BudgetLedger::new(&config(2, 1), t0());
        ledger.try_consume(2, t0());
        assert_eq!(ledger.state(), BudgetState::Exhausted);

        let after_reset = ledger.reset_at() + ChronoDuration::seconds(1);
        assert_eq!(ledger.try_consume(1, after_reset), BudgetDecision::Allow);
        assert_eq!(ledger.remaining(), 1);
    }

    #[test]
    fn test_record_is_authoritative() {
        let mut ledger = BudgetLedger::new(&config(5000, 100), t0());
        ledger.try_consume(1, t0());
        assert_eq!(ledger.remaining(), 4999);

        let reset = t0() + ChronoDuration::minutes(10);
        ledger.record(&RateLimitInfo {
            remaining: 50,
            limit: Some(5000),
            reset_at: reset,
            cost: Some(1),
        });
        assert_eq!(ledger.remaining(), 50);
        assert_eq!(ledger.reset_at(), reset);
        assert_eq!(ledger.state(), BudgetState::Throttled);

        ledger.record(&RateLimitInfo {
            remaining: 4000,
            limit: None,
            reset_at: reset,
            cost: None,
        });
        assert_eq!(ledger.state(), BudgetState::Available);
        assert!(ledger.snapshot().next_allowed_at.is_none());
    }

    #[test]
    fn test_cost_estimate_tracks_reported_costs() {
        let mut ledger = BudgetLedger::new(&config(5000, 100), t0());
        assert_eq!(ledger.estimated_cost(), 1);
        for _ in 0..20 {
            ledger.record(&RateLimitInfo {
                remaining: 4000,
                limit: None,
                reset_at: t0() + ChronoDuration::hours(1),
                cost: Some(3),
            });
        }
        assert_eq!(ledger.estimated_cost(), 3);
    }

    #[test]
    fn test_mark_exhausted() {
        let mut ledger = BudgetLedger::new(&config(5000, 100), t0());
        let reset = t0() + ChronoDuration::minutes(5);
        ledger.mark_exhausted(Some(reset), t0());
        assert_eq!(ledger.state(), BudgetState::Exhausted);
        assert_eq!(
            ledger.try_consume(1, t0()),
            BudgetDecision::Exhausted { reset_at: reset }
        );
    }

    #[tokio::test]
    async fn test_acquire_fails_fast_when_exhausted() {
        let budget = RateBudget::new(&config(1, 1));
        budget.acquire(1).await.unwrap();

        let err = budget.acquire(1).await.unwrap_err();
        assert!(matches!(
            err,
            GateError::RateLimitExceeded { remaining: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_acquire_gives_up_after_deferrals() {
        let budget = RateBudget::new(&BudgetConfig {
            limit: 100,
            low_water: 99,
            initial_backoff_ms: 60_000,
            max_backoff_ms: 60_000,
            max_deferred_retries: 0,
            ..BudgetConfig::default()
        });
        // Drops below low water and arms the backoff
        budget.acquire(2).await.unwrap();

        let err = budget.acquire(1).await.unwrap_err();
        assert!(matches!(err, GateError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_acquire_waits_out_throttle() {
        let budget = RateBudget::new(&BudgetConfig {
            limit: 100,
            low_water: 99,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
            max_deferred_retries: 3,
            ..BudgetConfig::default()
        });
        budget.acquire(2).await.unwrap();
        budget.acquire(1).await.unwrap();

        let snapshot = budget.snapshot().await;
        assert_eq!(snapshot.remaining, 97);
        assert_eq!(snapshot.state, BudgetState::Throttled);
        assert_eq!(snapshot.throttle_streak, 2);
    }
}
