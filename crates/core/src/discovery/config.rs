//! Discovery and domain filter configuration.

use serde::{Deserialize, Serialize};

/// Configuration for discovery runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Upper bound on strategy rounds per run.
    /// Keeps a sparse upstream from being polled indefinitely.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Candidates requested per upstream page (1-100).
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Overall deadline for one run (seconds).
    /// On expiry the run returns what it has, flagged partial.
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// Freshness window when the request does not specify one.
    #[serde(default = "default_window_days")]
    pub default_window_days: u32,

    /// Largest freshness window a request may ask for.
    #[serde(default = "default_max_window_days")]
    pub max_window_days: u32,

    #[serde(default = "default_limit")]
    pub default_limit: u32,

    #[serde(default = "default_max_limit")]
    pub max_limit: u32,

    /// Minimum interval between opportunistic cache sweeps (seconds).
    #[serde(default = "default_sweep_interval")]
    pub cache_sweep_interval_secs: u64,
}

fn default_max_rounds() -> u32 {
    6
}

fn default_page_size() -> u32 {
    30
}

fn default_deadline() -> u64 {
    60
}

fn default_window_days() -> u32 {
    7
}

fn default_max_window_days() -> u32 {
    3650 // 10 years
}

fn default_limit() -> u32 {
    30
}

fn default_max_limit() -> u32 {
    100
}

fn default_sweep_interval() -> u64 {
    3600 // 1 hour
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            page_size: default_page_size(),
            deadline_secs: default_deadline(),
            default_window_days: default_window_days(),
            max_window_days: default_max_window_days(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            cache_sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Domain filters applied to every fetched candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// SPDX ids accepted. An empty list accepts any license, including none.
    #[serde(default = "default_allowed_licenses")]
    pub allowed_licenses: Vec<String>,

    /// Language that must dominate the codebase. `None` disables the check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Minimum byte share of `language` (0.0-1.0).
    #[serde(default = "default_min_language_share")]
    pub min_language_share: f64,

    #[serde(default)]
    pub min_size_kb: u64,

    #[serde(default = "default_max_size_kb")]
    pub max_size_kb: u64,
}

fn default_allowed_licenses() -> Vec<String> {
    [
        "MIT",
        "Apache-1.1",
        "Apache-2.0",
        "BSD-1-Clause",
        "BSD-2-Clause",
        "BSD-3-Clause",
        "BSD-4-Clause",
        "BSL-1.0",
        "ISC",
        "0BSD",
        "Zlib",
        "Unlicense",
        "CC0-1.0",
        "PSF-2.0",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_min_language_share() -> f64 {
    0.7
}

fn default_max_size_kb() -> u64 {
    100_000
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            allowed_licenses: default_allowed_licenses(),
            language: None,
            min_language_share: default_min_language_share(),
            min_size_kb: 0,
            max_size_kb: default_max_size_kb(),
        }
    }
}
