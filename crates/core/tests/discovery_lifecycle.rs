//! Discovery lifecycle integration tests.
//!
//! These tests drive the orchestrator end to end against the mock upstream
//! with on-disk SQLite state: repeated runs, per-user isolation, shared
//! budget exhaustion and state survival across restarts.

use std::collections::HashSet;
use std::sync::Arc;

use tempfile::TempDir;

use reposcout_core::{
    load_config_from_str,
    testing::{fixtures, CallKind, MockUpstreamClient},
    Config, DiscoveryOrchestrator, DiscoveryRequest, RankedResult, RepoId, SqliteAnalysisCache,
    SqliteUserStateStore, StopReason, UpstreamGate, UserStateStore,
};

/// Test helper wiring the orchestrator to on-disk stores.
struct TestHarness {
    config: Config,
    upstream: Arc<MockUpstreamClient>,
    store: Arc<SqliteUserStateStore>,
    gate: Arc<UpstreamGate>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(
            r#"
[auth]
method = "none"

[budget.retry]
initial_delay_ms = 1
max_delay_ms = 2
"#,
        )
    }

    fn with_config(toml: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = load_config_from_str(toml).expect("Failed to parse config");
        let store = Arc::new(
            SqliteUserStateStore::new(&temp_dir.path().join("test.db"))
                .expect("Failed to create store"),
        );
        let gate = Arc::new(UpstreamGate::new(&config.budget));

        Self {
            config,
            upstream: Arc::new(MockUpstreamClient::new()),
            store,
            gate,
            temp_dir,
        }
    }

    fn orchestrator(&self) -> DiscoveryOrchestrator {
        let cache = Arc::new(
            SqliteAnalysisCache::new(&self.temp_dir.path().join("test.db"))
                .expect("Failed to create cache"),
        );
        DiscoveryOrchestrator::new(
            &self.config,
            self.upstream.clone(),
            self.store.clone(),
            cache,
            self.gate.clone(),
        )
    }
}

fn ids(result: &RankedResult) -> HashSet<String> {
    result
        .repositories
        .iter()
        .map(|r| r.repository.id.to_string())
        .collect()
}

#[tokio::test]
async fn test_repeat_runs_never_repeat_within_window() {
    let harness = TestHarness::new();
    harness
        .upstream
        .set_repositories(fixtures::candidates("octo", 12, 1000))
        .await;
    let orchestrator = harness.orchestrator();
    let request = DiscoveryRequest::new("alice", 1000, 5000)
        .with_limit(5)
        .with_window_days(7);

    let first = orchestrator.discover(request.clone()).await.unwrap();
    let second = orchestrator.discover(request.clone()).await.unwrap();
    let third = orchestrator.discover(request.clone()).await.unwrap();

    assert_eq!(first.repositories.len(), 5);
    assert_eq!(second.repositories.len(), 5);
    assert!(ids(&first).is_disjoint(&ids(&second)));

    // Only two unseen repositories remain
    assert_eq!(third.repositories.len(), 2);
    assert!(!third.diagnostics.limit_satisfied);
    assert!(ids(&third).is_disjoint(&ids(&first)));
    assert!(ids(&third).is_disjoint(&ids(&second)));

    let seen = harness.store.get_seen_records("alice", &[]).unwrap();
    let unique: HashSet<_> = seen.iter().map(|r| r.repo_id.clone()).collect();
    assert_eq!(seen.len(), 12);
    assert_eq!(unique.len(), 12);
    assert!(seen.iter().all(|r| r.times_shown == 1));
}

#[tokio::test]
async fn test_force_refresh_reincludes_seen() {
    let harness = TestHarness::new();
    harness
        .upstream
        .set_repositories(fixtures::candidates("octo", 5, 1000))
        .await;
    let orchestrator = harness.orchestrator();
    let request = DiscoveryRequest::new("alice", 1000, 5000).with_limit(5);

    let first = orchestrator.discover(request.clone()).await.unwrap();
    let empty = orchestrator.discover(request.clone()).await.unwrap();
    let forced = orchestrator
        .discover(request.with_force_refresh(true))
        .await
        .unwrap();

    assert!(empty.repositories.is_empty());
    assert_eq!(ids(&forced), ids(&first));
    assert!(forced.repositories.iter().all(|r| r.previously_shown));

    let seen = harness.store.get_seen_records("alice", &[]).unwrap();
    assert!(seen.iter().all(|r| r.times_shown == 2));
}

#[tokio::test]
async fn test_users_are_isolated() {
    let harness = TestHarness::new();
    harness
        .upstream
        .set_repositories(fixtures::candidates("octo", 6, 1000))
        .await;
    let orchestrator = harness.orchestrator();

    let alice = orchestrator
        .discover(DiscoveryRequest::new("alice", 1000, 5000).with_limit(3))
        .await
        .unwrap();
    let bob = orchestrator
        .discover(DiscoveryRequest::new("bob", 1000, 5000).with_limit(3))
        .await
        .unwrap();

    // Bob starts from the top of the same ordering
    assert_eq!(ids(&alice), ids(&bob));
    assert!(harness.store.get_seen_records("carol", &[]).unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_users_share_budget() {
    let harness = TestHarness::new();
    harness
        .upstream
        .set_repositories(fixtures::candidates("octo", 20, 1000))
        .await;
    let orchestrator = Arc::new(harness.orchestrator());

    let mut handles = Vec::new();
    for user in ["u1", "u2", "u3", "u4"] {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .discover(DiscoveryRequest::new(user, 1000, 5000).with_limit(4))
                .await
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.repositories.len(), 4);
    }

    // Every response carries the authoritative count, never below the final one
    let calls = harness.upstream.recorded_calls().await.len() as u32;
    let snapshot = harness.gate.snapshot().await;
    assert!(snapshot.remaining >= 5000 - calls);
    assert!(snapshot.remaining < 5000);
}

#[tokio::test]
async fn test_budget_exhaustion_returns_partial() {
    let harness = TestHarness::with_config(
        r#"
[auth]
method = "none"

[budget]
low_water = 1
initial_backoff_ms = 1
max_backoff_ms = 2
"#,
    );
    harness
        .upstream
        .set_repositories(fixtures::candidates("octo", 10, 1000))
        .await;
    harness.upstream.set_remaining(3).await;
    let orchestrator = harness.orchestrator();

    let result = orchestrator
        .discover(DiscoveryRequest::new("alice", 1000, 5000).with_limit(5))
        .await
        .unwrap();

    assert!(result.diagnostics.partial);
    assert_eq!(result.diagnostics.stop_reason, StopReason::BudgetExhausted);
    assert!(!result.repositories.is_empty());
    assert!(result.repositories.len() < 5);

    // Exposures of the partial result are kept
    let seen = harness.store.get_seen_records("alice", &[]).unwrap();
    assert_eq!(seen.len(), result.repositories.len());

    // Another user gets the failure, not an empty success
    let err = orchestrator
        .discover(DiscoveryRequest::new("bob", 1000, 5000).with_limit(5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        reposcout_core::DiscoveryError::RateLimitExceeded { .. }
    ));
}

#[tokio::test]
async fn test_state_survives_restart() {
    let harness = TestHarness::new();
    harness
        .upstream
        .set_repositories(fixtures::candidates("octo", 40, 1000))
        .await;
    let request = DiscoveryRequest::new("alice", 1000, 5000).with_limit(5);

    let first = harness.orchestrator().discover(request.clone()).await.unwrap();
    // Fresh orchestrator over the same database
    let second = harness.orchestrator().discover(request).await.unwrap();

    assert!(ids(&first).is_disjoint(&ids(&second)));
}

#[tokio::test]
async fn test_analyze_scenario() {
    let harness = TestHarness::new();
    let mut labelled = fixtures::candidate("owner/repo", 1500);
    labelled.last_commit_at = Some(chrono::Utc::now() - chrono::Duration::days(2));
    labelled.issues = Some(reposcout_core::upstream::IssueSummary {
        good_first_issues: 3,
        help_wanted_issues: 0,
        bug_issues: 0,
    });
    let mut plain = labelled.clone();
    plain.id = "owner/plain".parse().unwrap();
    plain.issues = Some(Default::default());
    plain.has_contributing = false;
    harness
        .upstream
        .set_repositories(vec![labelled, plain])
        .await;
    let orchestrator = harness.orchestrator();

    let repo: RepoId = "owner/repo".parse().unwrap();
    let analysis = orchestrator.analyze(&repo).await.unwrap();
    let baseline = orchestrator
        .analyze(&"owner/plain".parse().unwrap())
        .await
        .unwrap();

    assert!(analysis.score.opportunity > 0.0);
    assert!(analysis.score.maintainability > 0.0);
    assert!(analysis.score.overall > baseline.score.overall);
    assert_eq!(
        harness.upstream.call_count(CallKind::Repository).await,
        2
    );
}
