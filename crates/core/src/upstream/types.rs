//! Types for the upstream repository host.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Repository identity in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId(String);

impl RepoId {
    pub fn new(owner: &str, name: &str) -> Result<Self, String> {
        format!("{}/{}", owner, name).parse()
    }

    pub fn owner(&self) -> &str {
        self.0.split_once('/').map(|(o, _)| o).unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, n)| n).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RepoId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self(s.to_string()))
            }
            _ => Err(format!("invalid repository id '{}': expected owner/name", s)),
        }
    }
}

impl TryFrom<String> for RepoId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.0
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bytes of source attributed to one language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageShare {
    pub name: String,
    pub bytes: u64,
}

/// Counts of open issues per entry-level label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub good_first_issues: u32,
    pub help_wanted_issues: u32,
    pub bug_issues: u32,
}

impl IssueSummary {
    pub fn labelled_total(&self) -> u32 {
        self.good_first_issues
            .saturating_add(self.help_wanted_issues)
            .saturating_add(self.bug_issues)
    }
}

/// Size and structure of a repository's README.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadmeStats {
    pub bytes: u64,
    /// Number of markdown headings.
    pub sections: u32,
}

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s+\S").unwrap());

impl ReadmeStats {
    pub fn from_text(text: &str) -> Self {
        Self {
            bytes: text.len() as u64,
            sections: HEADING.find_iter(text).count() as u32,
        }
    }
}

/// Immutable snapshot of one repository as fetched from upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryCandidate {
    pub id: RepoId,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub stars: u32,
    /// SPDX identifier (or license name when no SPDX id is known).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Disk usage estimate in kilobytes.
    pub size_kb: u64,
    #[serde(default)]
    pub languages: Vec<LanguageShare>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit_at: Option<DateTime<Utc>>,
    /// Commits on the default branch in the last 30 days, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_commits: Option<u32>,
    pub open_issues: u32,
    /// Entry-level label counts. `None` when the page did not include them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<IssueSummary>,
    #[serde(default)]
    pub has_contributing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<ReadmeStats>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl RepositoryCandidate {
    /// Share of total language bytes attributed to `language` (case-insensitive).
    pub fn language_share(&self, language: &str) -> f64 {
        let total: u64 = self.languages.iter().map(|l| l.bytes).sum();
        if total == 0 {
            return 0.0;
        }
        let bytes: u64 = self
            .languages
            .iter()
            .filter(|l| l.name.eq_ignore_ascii_case(language))
            .map(|l| l.bytes)
            .sum();
        bytes as f64 / total as f64
    }

    pub fn primary_language(&self) -> Option<&str> {
        self.languages
            .iter()
            .max_by_key(|l| l.bytes)
            .map(|l| l.name.as_str())
    }
}

/// Result ordering requested from upstream search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Stars,
    Updated,
    Created,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Stars => "stars",
            SortOrder::Updated => "updated",
            SortOrder::Created => "created",
        }
    }
}

/// One concrete upstream search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub min_stars: u32,
    pub max_stars: u32,
    pub sort: SortOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub page_size: u32,
}

impl SearchQuery {
    /// Stable identity of the result ordering this query produces.
    ///
    /// A cursor is only meaningful for the query it was issued under.
    pub fn fingerprint(&self) -> String {
        format!(
            "stars:{}..{};sort:{};topic:{};size:{}",
            self.min_stars,
            self.max_stars,
            self.sort.as_str(),
            self.topic.as_deref().unwrap_or("-"),
            self.page_size
        )
    }
}

/// A page of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePage {
    pub candidates: Vec<RepositoryCandidate>,
    /// Continuation token; `None` when upstream has no further page.
    pub next_cursor: Option<String>,
}

/// Authoritative quota state reported by an upstream response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub remaining: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub reset_at: DateTime<Utc>,
    /// Cost charged for the request that produced this response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<u32>,
}

/// Upstream payload plus the quota metadata every response must carry.
#[derive(Debug, Clone)]
pub struct UpstreamResponse<T> {
    pub data: T,
    pub rate_limit: RateLimitInfo,
}

/// Errors reported by the upstream client.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("Upstream rate limit hit")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout")]
    Timeout,
}

impl UpstreamError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Unavailable(_) | UpstreamError::Timeout)
    }
}

/// Trait for repository hosting backends.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Provider name for logging/metrics.
    fn name(&self) -> &str;

    /// Fetch one page of search results, resuming at `cursor`.
    async fn fetch_candidates(
        &self,
        query: &SearchQuery,
        cursor: Option<&str>,
    ) -> Result<UpstreamResponse<CandidatePage>, UpstreamError>;

    /// Fetch a single repository snapshot.
    async fn fetch_repository(
        &self,
        id: &RepoId,
    ) -> Result<UpstreamResponse<RepositoryCandidate>, UpstreamError>;

    /// Fetch entry-level label counts for a repository.
    async fn fetch_issue_summary(
        &self,
        id: &RepoId,
    ) -> Result<UpstreamResponse<IssueSummary>, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_id_parse() {
        let id: RepoId = "octo/widgets".parse().unwrap();
        assert_eq!(id.owner(), "octo");
        assert_eq!(id.name(), "widgets");
        assert_eq!(id.to_string(), "octo/widgets");

        assert!("noslash".parse::<RepoId>().is_err());
        assert!("/name".parse::<RepoId>().is_err());
        assert!("owner/".parse::<RepoId>().is_err());
        assert!("a/b/c".parse::<RepoId>().is_err());
    }

    #[test]
    fn test_repo_id_serializes_as_string() {
        let id = RepoId::new("octo", "widgets").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"octo/widgets\"");

        let parsed: RepoId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
        assert!(serde_json::from_str::<RepoId>("\"bad\"").is_err());
    }

    #[test]
    fn test_readme_stats_counts_headings() {
        let text = "# Title\n\nIntro\n\n## Install\n\ntext\n\n### Usage\n#nospace\n    # indented code\n";
        let stats = ReadmeStats::from_text(text);
        assert_eq!(stats.sections, 3);
        assert_eq!(stats.bytes, text.len() as u64);
    }

    #[test]
    fn test_language_share() {
        let candidate = RepositoryCandidate {
            id: RepoId::new("a", "b").unwrap(),
            url: String::new(),
            description: None,
            stars: 10,
            license: None,
            size_kb: 100,
            languages: vec![
                LanguageShare {
                    name: "Python".to_string(),
                    bytes: 750,
                },
                LanguageShare {
                    name: "Shell".to_string(),
                    bytes: 250,
                },
            ],
            last_commit_at: None,
            recent_commits: None,
            open_issues: 0,
            issues: None,
            has_contributing: false,
            readme: None,
            topics: vec![],
        };
        assert!((candidate.language_share("python") - 0.75).abs() < 1e-9);
        assert_eq!(candidate.language_share("Go"), 0.0);
        assert_eq!(candidate.primary_language(), Some("Python"));
    }

    #[test]
    fn test_query_fingerprint_changes_with_range() {
        let q1 = SearchQuery {
            min_stars: 100,
            max_stars: 500,
            sort: SortOrder::Stars,
            topic: None,
            page_size: 30,
        };
        let mut q2 = q1.clone();
        assert_eq!(q1.fingerprint(), q2.fingerprint());
        q2.max_stars = 600;
        assert_ne!(q1.fingerprint(), q2.fingerprint());
    }

    #[test]
    fn test_transient_errors() {
        assert!(UpstreamError::Timeout.is_transient());
        assert!(UpstreamError::Unavailable("502".into()).is_transient());
        assert!(!UpstreamError::NotFound("x/y".into()).is_transient());
        assert!(!UpstreamError::RateLimited { reset_at: None }.is_transient());
    }
}
