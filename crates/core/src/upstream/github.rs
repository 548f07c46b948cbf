//! GitHub GraphQL backend implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GitHubConfig;

use super::{
    CandidatePage, IssueSummary, LanguageShare, RateLimitInfo, ReadmeStats, RepoId,
    RepositoryCandidate, SearchQuery, UpstreamClient, UpstreamError, UpstreamResponse,
};

/// Window used for the recent commit count.
const RECENT_COMMIT_DAYS: i64 = 30;

const REPOSITORY_FIELDS: &str = r#"
fragment RepositoryFields on Repository {
  nameWithOwner
  url
  description
  stargazerCount
  diskUsage
  licenseInfo { spdxId name }
  languages(first: 10, orderBy: {field: SIZE, direction: DESC}) {
    edges { size node { name } }
  }
  repositoryTopics(first: 10) { nodes { topic { name } } }
  issues(states: OPEN) { totalCount }
  contributing: object(expression: "HEAD:CONTRIBUTING.md") { __typename }
  githubContributing: object(expression: "HEAD:.github/CONTRIBUTING.md") { __typename }
  readme: object(expression: "HEAD:README.md") { ... on Blob { byteSize text } }
  defaultBranchRef {
    target {
      ... on Commit {
        committedDate
        history(since: $since) { totalCount }
      }
    }
  }
}
"#;

const RATE_LIMIT_FIELDS: &str = "rateLimit { limit cost remaining resetAt }";

/// GitHub-backed upstream client.
pub struct GitHubClient {
    client: Client,
    config: GitHubConfig,
}

impl GitHubClient {
    /// Create a new client with the given configuration.
    pub fn new(config: GitHubConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| UpstreamError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Build the search string for a query.
    fn build_search_string(&self, query: &SearchQuery) -> String {
        let mut parts = vec![
            format!("language:{}", self.config.language),
            format!("stars:{}..{}", query.min_stars, query.max_stars),
            "archived:false".to_string(),
            "fork:false".to_string(),
        ];
        if let Some(topic) = &query.topic {
            parts.push(format!("topic:{}", topic));
        }
        parts.push(format!("sort:{}-desc", query.sort.as_str()));
        parts.join(" ")
    }

    fn since(&self) -> String {
        (Utc::now() - ChronoDuration::days(RECENT_COMMIT_DAYS)).to_rfc3339()
    }

    /// Post a GraphQL document and decode its `data` payload.
    async fn graphql<T: DeserializeOwned + WithRateLimit + Send>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<(T, RateLimitInfo), UpstreamError> {
        let response = self
            .client
            .post(&self.config.graphql_url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.token))
            .header(USER_AGENT, "reposcout")
            .header(ACCEPT, "application/vnd.github+json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let headers = response.headers().clone();

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            let reset_at = header_reset(&headers);
            if status == StatusCode::TOO_MANY_REQUESTS || header_remaining(&headers) == Some(0) {
                return Err(UpstreamError::RateLimited { reset_at });
            }
        }
        if status.is_server_error() {
            return Err(UpstreamError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::InvalidResponse(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let envelope: GraphQlEnvelope<T> = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = envelope.errors.as_ref().and_then(|e| e.first()) {
            return Err(match error.kind.as_deref() {
                Some("RATE_LIMITED") => UpstreamError::RateLimited {
                    reset_at: header_reset(&headers),
                },
                Some("NOT_FOUND") => UpstreamError::NotFound(error.message.clone()),
                _ => UpstreamError::InvalidResponse(error.message.clone()),
            });
        }

        let data = envelope
            .data
            .ok_or_else(|| UpstreamError::InvalidResponse("response has no data".to_string()))?;

        let rate_limit = data
            .rate_limit()
            .map(|r| r.to_info())
            .or_else(|| header_rate_limit(&headers))
            .ok_or_else(|| UpstreamError::InvalidResponse("missing rate limit metadata".to_string()))?;

        Ok((data, rate_limit))
    }
}

#[async_trait]
impl UpstreamClient for GitHubClient {
    fn name(&self) -> &str {
        "github"
    }

    async fn fetch_candidates(
        &self,
        query: &SearchQuery,
        cursor: Option<&str>,
    ) -> Result<UpstreamResponse<CandidatePage>, UpstreamError> {
        let document = format!(
            r#"query($q: String!, $first: Int!, $after: String, $since: GitTimestamp!) {{
  search(query: $q, type: REPOSITORY, first: $first, after: $after) {{
    nodes {{ ...RepositoryFields }}
    pageInfo {{ hasNextPage endCursor }}
  }}
  {}
}}
{}"#,
            RATE_LIMIT_FIELDS, REPOSITORY_FIELDS
        );
        let search = self.build_search_string(query);
        debug!(search = %search, cursor = ?cursor, "Searching GitHub");

        let (data, rate_limit): (SearchData, _) = self
            .graphql(
                &document,
                json!({
                    "q": search,
                    "first": query.page_size,
                    "after": cursor,
                    "since": self.since(),
                }),
            )
            .await?;

        let mut candidates = Vec::with_capacity(data.search.nodes.len());
        for node in data.search.nodes.into_iter().flatten() {
            match node.into_candidate() {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => warn!(error = %e, "Skipping malformed repository node"),
            }
        }

        let next_cursor = if data.search.page_info.has_next_page {
            data.search.page_info.end_cursor
        } else {
            None
        };

        debug!(
            results = candidates.len(),
            has_next = next_cursor.is_some(),
            remaining = rate_limit.remaining,
            "GitHub search complete"
        );

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
        let document = format!(
            r#"query($owner: String!, $name: String!, $since: GitTimestamp!) {{
  repository(owner: $owner, name: $name) {{ ...RepositoryFields }}
  {}
}}
{}"#,
            RATE_LIMIT_FIELDS, REPOSITORY_FIELDS
        );

        let (data, rate_limit): (RepositoryData, _) = self
            .graphql(
                &document,
                json!({ "owner": id.owner(), "name": id.name(), "since": self.since() }),
            )
            .await?;

        let node = data
            .repository
            .ok_or_else(|| UpstreamError::NotFound(id.to_string()))?;

        Ok(UpstreamResponse {
            data: node.into_candidate()?,
            rate_limit,
        })
    }

    async fn fetch_issue_summary(
        &self,
        id: &RepoId,
    ) -> Result<UpstreamResponse<IssueSummary>, UpstreamError> {
        let document = format!(
            r#"query($owner: String!, $name: String!) {{
  repository(owner: $owner, name: $name) {{
    goodFirst: issues(states: OPEN, labels: ["good first issue"]) {{ totalCount }}
    helpWanted: issues(states: OPEN, labels: ["help wanted"]) {{ totalCount }}
    bug: issues(states: OPEN, labels: ["bug"]) {{ totalCount }}
  }}
  {}
}}"#,
            RATE_LIMIT_FIELDS
        );

        let (data, rate_limit): (IssueData, _) = self
            .graphql(&document, json!({ "owner": id.owner(), "name": id.name() }))
            .await?;

        let counts = data
            .repository
            .ok_or_else(|| UpstreamError::NotFound(id.to_string()))?;

        Ok(UpstreamResponse {
            data: IssueSummary {
                good_first_issues: counts.good_first.total_count,
                help_wanted_issues: counts.help_wanted.total_count,
                bug_issues: counts.bug.total_count,
            },
            rate_limit,
        })
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn header_remaining(headers: &HeaderMap) -> Option<u64> {
    header_u64(headers, "x-ratelimit-remaining")
}

fn header_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let epoch = header_u64(headers, "x-ratelimit-reset")?;
    Utc.timestamp_opt(epoch as i64, 0).single()
}

/// Rate-limit metadata from response headers.
fn header_rate_limit(headers: &HeaderMap) -> Option<RateLimitInfo> {
    Some(RateLimitInfo {
        remaining: header_remaining(headers)? as u32,
        limit: header_u64(headers, "x-ratelimit-limit").map(|l| l as u32),
        reset_at: header_reset(headers)?,
        cost: None,
    })
}

// GitHub GraphQL response types

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitNode {
    limit: Option<u32>,
    cost: Option<u32>,
    remaining: u32,
    reset_at: DateTime<Utc>,
}

impl RateLimitNode {
    fn to_info(&self) -> RateLimitInfo {
        RateLimitInfo {
            remaining: self.remaining,
            limit: self.limit,
            reset_at: self.reset_at,
            cost: self.cost,
        }
    }
}

/// Payloads that carry a `rateLimit` block next to their data.
trait WithRateLimit {
    fn rate_limit(&self) -> Option<&RateLimitNode>;
}

macro_rules! with_rate_limit {
    ($ty:ty) => {
        impl WithRateLimit for $ty {
            fn rate_limit(&self) -> Option<&RateLimitNode> {
                self.rate_limit.as_ref()
            }
        }
    };
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchData {
    search: SearchConnection,
    rate_limit: Option<RateLimitNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchConnection {
    nodes: Vec<Option<RepositoryNode>>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryData {
    repository: Option<RepositoryNode>,
    rate_limit: Option<RateLimitNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueData {
    repository: Option<IssueCounts>,
    rate_limit: Option<RateLimitNode>,
}

with_rate_limit!(SearchData);
with_rate_limit!(RepositoryData);
with_rate_limit!(IssueData);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueCounts {
    good_first: TotalCount,
    help_wanted: TotalCount,
    bug: TotalCount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TotalCount {
    total_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    name_with_owner: String,
    url: String,
    description: Option<String>,
    stargazer_count: u32,
    disk_usage: Option<u64>,
    license_info: Option<LicenseNode>,
    languages: Option<LanguageConnection>,
    repository_topics: Option<TopicConnection>,
    issues: TotalCount,
    contributing: Option<Value>,
    github_contributing: Option<Value>,
    readme: Option<ReadmeNode>,
    default_branch_ref: Option<BranchRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LicenseNode {
    spdx_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LanguageConnection {
    edges: Vec<LanguageEdge>,
}

#[derive(Debug, Deserialize)]
struct LanguageEdge {
    size: u64,
    node: NamedNode,
}

#[derive(Debug, Deserialize)]
struct NamedNode {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TopicConnection {
    nodes: Vec<TopicNode>,
}

#[derive(Debug, Deserialize)]
struct TopicNode {
    topic: NamedNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadmeNode {
    byte_size: Option<u64>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    target: Option<CommitNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitNode {
    committed_date: Option<DateTime<Utc>>,
    history: Option<TotalCount>,
}

impl RepositoryNode {
    fn into_candidate(self) -> Result<RepositoryCandidate, UpstreamError> {
        let id: RepoId = self
            .name_with_owner
            .parse()
            .map_err(UpstreamError::InvalidResponse)?;

        let license = self.license_info.and_then(|l| {
            l.spdx_id
                .filter(|s| !s.is_empty() && s != "NOASSERTION")
                .or(l.name)
        });

        let readme = self.readme.map(|r| match r.text {
            Some(text) => ReadmeStats::from_text(&text),
            None => ReadmeStats {
                bytes: r.byte_size.unwrap_or(0),
                sections: 0,
            },
        });

        let commit = self.default_branch_ref.and_then(|b| b.target);

        Ok(RepositoryCandidate {
            id,
            url: self.url,
            description: self.description,
            stars: self.stargazer_count,
            license,
            size_kb: self.disk_usage.unwrap_or(0),
            languages: self
                .languages
                .map(|c| {
                    c.edges
                        .into_iter()
                        .map(|e| LanguageShare {
                            name: e.node.name,
                            bytes: e.size,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            last_commit_at: commit.as_ref().and_then(|c| c.committed_date),
            recent_commits: commit
                .as_ref()
                .and_then(|c| c.history.as_ref())
                .map(|h| h.total_count),
            open_issues: self.issues.total_count,
            issues: None,
            has_contributing: self.contributing.is_some() || self.github_contributing.is_some(),
            readme,
            topics: self
                .repository_topics
                .map(|t| t.nodes.into_iter().map(|n| n.topic.name).collect())
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::SortOrder;
    use reqwest::header::HeaderValue;

    fn test_config() -> GitHubConfig {
        GitHubConfig {
            graphql_url: "http://localhost:9999/graphql".to_string(),
            token: "ghp_test".to_string(),
            timeout_secs: 5,
            language: "Python".to_string(),
        }
    }

    #[test]
    fn test_build_search_string() {
        let client = GitHubClient::new(test_config()).unwrap();
        let query = SearchQuery {
            min_stars: 100,
            max_stars: 5000,
            sort: SortOrder::Updated,
            topic: Some("machine-learning".to_string()),
            page_size: 30,
        };

        let search = client.build_search_string(&query);
        assert!(search.contains("language:Python"));
        assert!(search.contains("stars:100..5000"));
        assert!(search.contains("topic:machine-learning"));
        assert!(search.ends_with("sort:updated-desc"));
    }

    #[test]
    fn test_header_rate_limit() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));
        headers.insert("x-ratelimit-limit", HeaderValue::from_static("5000"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));

        let info = header_rate_limit(&headers).unwrap();
        assert_eq!(info.remaining, 42);
        assert_eq!(info.limit, Some(5000));
        assert_eq!(info.reset_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_header_rate_limit_missing() {
        assert!(header_rate_limit(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_search_payload_decodes() {
        let payload = json!({
            "data": {
                "search": {
                    "nodes": [{
                        "nameWithOwner": "octo/widgets",
                        "url": "https://github.com/octo/widgets",
                        "description": "Widgets",
                        "stargazerCount": 420,
                        "diskUsage": 2048,
                        "licenseInfo": { "spdxId": "MIT", "name": "MIT License" },
                        "languages": { "edges": [{ "size": 900, "node": { "name": "Python" } }] },
                        "repositoryTopics": { "nodes": [{ "topic": { "name": "cli" } }] },
                        "issues": { "totalCount": 12 },
                        "contributing": { "__typename": "Blob" },
                        "githubContributing": null,
                        "readme": { "byteSize": 20, "text": "# Widgets\n## Usage\n" },
                        "defaultBranchRef": { "target": {
                            "committedDate": "2024-06-01T00:00:00Z",
                            "history": { "totalCount": 17 }
                        } }
                    }, null],
                    "pageInfo": { "hasNextPage": true, "endCursor": "Y3Vyc29yOjE=" }
                },
                "rateLimit": { "limit": 5000, "cost": 1, "remaining": 4999, "resetAt": "2024-06-01T01:00:00Z" }
            }
        });

        let envelope: GraphQlEnvelope<SearchData> = serde_json::from_value(payload).unwrap();
        let data = envelope.data.unwrap();
        let info = data.rate_limit().unwrap().to_info();
        assert_eq!(info.remaining, 4999);
        assert_eq!(info.cost, Some(1));
        assert_eq!(data.search.page_info.end_cursor.as_deref(), Some("Y3Vyc29yOjE="));

        let node = data.search.nodes.into_iter().flatten().next().unwrap();
        let candidate = node.into_candidate().unwrap();
        assert_eq!(candidate.id.as_str(), "octo/widgets");
        assert_eq!(candidate.license.as_deref(), Some("MIT"));
        assert_eq!(candidate.recent_commits, Some(17));
        assert_eq!(candidate.readme.unwrap().sections, 2);
        assert!(candidate.has_contributing);
        assert!(candidate.issues.is_none());
        assert_eq!(candidate.topics, vec!["cli".to_string()]);
    }

    #[test]
    fn test_license_falls_back_to_name() {
        let node: RepositoryNode = serde_json::from_value(json!({
            "nameWithOwner": "a/b",
            "url": "",
            "description": null,
            "stargazerCount": 1,
            "diskUsage": null,
            "licenseInfo": { "spdxId": "NOASSERTION", "name": "Other" },
            "languages": null,
            "repositoryTopics": null,
            "issues": { "totalCount": 0 },
            "contributing": null,
            "githubContributing": null,
            "readme": null,
            "defaultBranchRef": null
        }))
        .unwrap();

        let candidate = node.into_candidate().unwrap();
        assert_eq!(candidate.license.as_deref(), Some("Other"));
        assert!(!candidate.has_contributing);
        assert!(candidate.last_commit_at.is_none());
    }
}
