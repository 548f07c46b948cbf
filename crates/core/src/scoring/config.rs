//! Scorer configuration.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the suitability scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Commits this recent earn full activity credit.
    #[serde(default = "default_fresh_days")]
    pub fresh_days: u32,
    /// Commits this old earn no activity credit.
    #[serde(default = "default_activity_horizon_days")]
    pub activity_horizon_days: u32,
    /// Commits per 30 days that earn full frequency credit.
    #[serde(default = "default_commit_frequency_target")]
    pub commit_frequency_target: u32,
    /// Lower edge of the manageable size band.
    #[serde(default = "default_complexity_min_size_kb")]
    pub complexity_min_size_kb: u64,
    /// Upper edge of the manageable size band.
    #[serde(default = "default_complexity_max_size_kb")]
    pub complexity_max_size_kb: u64,
    #[serde(default = "default_readme_target_bytes")]
    pub readme_target_bytes: u64,
    #[serde(default = "default_readme_target_sections")]
    pub readme_target_sections: u32,
}

fn default_fresh_days() -> u32 {
    7
}

fn default_activity_horizon_days() -> u32 {
    365
}

fn default_commit_frequency_target() -> u32 {
    30
}

fn default_complexity_min_size_kb() -> u64 {
    1_000
}

fn default_complexity_max_size_kb() -> u64 {
    100_000
}

fn default_readme_target_bytes() -> u64 {
    2_000
}

fn default_readme_target_sections() -> u32 {
    4
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fresh_days: default_fresh_days(),
            activity_horizon_days: default_activity_horizon_days(),
            commit_frequency_target: default_commit_frequency_target(),
            complexity_min_size_kb: default_complexity_min_size_kb(),
            complexity_max_size_kb: default_complexity_max_size_kb(),
            readme_target_bytes: default_readme_target_bytes(),
            readme_target_sections: default_readme_target_sections(),
        }
    }
}
