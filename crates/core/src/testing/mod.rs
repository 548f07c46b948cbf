//! Testing utilities and mock implementations.
//!
//! The mock upstream stands in for the repository host, so discovery can be
//! exercised end to end without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use reposcout_core::testing::{fixtures, MockUpstreamClient};
//!
//! let upstream = Arc::new(MockUpstreamClient::new());
//! upstream.set_repositories(fixtures::candidates("octo", 40, 150)).await;
//!
//! // Build a DiscoveryOrchestrator around it...
//! ```

mod mock_upstream;

pub use mock_upstream::{CallKind, MockUpstreamClient, RecordedCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{Duration, Utc};

    use crate::upstream::{IssueSummary, LanguageShare, ReadmeStats, RepoId, RepositoryCandidate};

    /// Create a repository candidate with reasonable defaults.
    ///
    /// The defaults score 5.0 in every category: committed yesterday, well
    /// labelled issues, size at the centre of the default band, MIT licensed
    /// with a contributing guide and a structured README.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not in `owner/name` form.
    pub fn candidate(id: &str, stars: u32) -> RepositoryCandidate {
        let id: RepoId = id.parse().expect("fixture id must be owner/name");
        RepositoryCandidate {
            url: format!("https://github.com/{}", id),
            description: Some(format!("Fixture repository {}", id.name())),
            id,
            stars,
            license: Some("MIT".to_string()),
            size_kb: 10_000,
            languages: vec![LanguageShare {
                name: "Python".to_string(),
                bytes: 100_000,
            }],
            last_commit_at: Some(Utc::now() - Duration::days(1)),
            recent_commits: Some(30),
            open_issues: 20,
            issues: Some(IssueSummary {
                good_first_issues: 3,
                help_wanted_issues: 2,
                bug_issues: 1,
            }),
            has_contributing: true,
            readme: Some(ReadmeStats {
                bytes: 3_000,
                sections: 5,
            }),
            topics: Vec::new(),
        }
    }

    /// Create `count` candidates `owner/repo-N` with stars `base_stars + N`.
    pub fn candidates(owner: &str, count: u32, base_stars: u32) -> Vec<RepositoryCandidate> {
        (0..count)
            .map(|i| candidate(&format!("{}/repo-{}", owner, i), base_stars + i))
            .collect()
    }

    /// A candidate that scores poorly: stale, unlabelled, undocumented.
    pub fn weak_candidate(id: &str, stars: u32) -> RepositoryCandidate {
        let mut c = candidate(id, stars);
        c.last_commit_at = Some(Utc::now() - Duration::days(300));
        c.recent_commits = Some(0);
        c.issues = Some(IssueSummary::default());
        c.has_contributing = false;
        c.readme = None;
        c
    }
}
