use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::budget::BudgetConfig;
use crate::cache::CacheConfig;
use crate::discovery::{DiscoveryConfig, FilterConfig};
use crate::scoring::ScoringConfig;
use crate::strategy::StrategyConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub github: Option<GitHubConfig>,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Strategy catalogue override. Empty means the built-in catalogue.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strategies: Vec<StrategyConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Required when method = "api_key".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reposcout.db")
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

/// GitHub upstream configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    /// GraphQL endpoint.
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    /// Personal access token.
    pub token: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Primary language qualifier added to every search.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_graphql_url() -> String {
    "https://api.github.com/graphql".to_string()
}

fn default_timeout() -> u32 {
    30
}

fn default_language() -> String {
    "Python".to_string()
}

/// Retention of per-user exposure history.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Seen records not shown for this many days are purged by cleanup.
    #[serde(default = "default_seen_retention")]
    pub seen_retention_days: u32,
}

fn default_seen_retention() -> u32 {
    90
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            seen_retention_days: default_seen_retention(),
        }
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<SanitizedGitHubConfig>,
    pub budget: BudgetConfig,
    pub discovery: DiscoveryConfig,
    pub filters: FilterConfig,
    pub scoring: ScoringConfig,
    pub cache: CacheConfig,
    pub retention: RetentionConfig,
    pub strategy_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_key_configured: bool,
}

/// Sanitized GitHub config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGitHubConfig {
    pub graphql_url: String,
    pub token_configured: bool,
    pub timeout_secs: u32,
    pub language: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKey => "api_key".to_string(),
                },
                api_key_configured: config
                    .auth
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.is_empty()),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            github: config.github.as_ref().map(|g| SanitizedGitHubConfig {
                graphql_url: g.graphql_url.clone(),
                token_configured: !g.token.is_empty(),
                timeout_secs: g.timeout_secs,
                language: g.language.clone(),
            }),
            budget: config.budget.clone(),
            discovery: config.discovery.clone(),
            filters: config.filters.clone(),
            scoring: config.scoring.clone(),
            cache: config.cache.clone(),
            retention: config.retention.clone(),
            strategy_count: config.strategies.len(),
        }
    }
}
