//! Suitability scorer.
//!
//! Pure functions of a candidate snapshot and the evaluation time. The same
//! inputs always produce the same breakdown, which is what makes cached
//! breakdowns interchangeable with fresh ones.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::upstream::RepositoryCandidate;

use super::{ScoreBreakdown, ScoringConfig, MAX_SCORE};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Share of the activity score driven by recency when commit counts are known.
const RECENCY_SHARE: f64 = 0.8;

/// Computes [`ScoreBreakdown`]s from candidate attributes.
#[derive(Debug, Clone, Default)]
pub struct SuitabilityScorer {
    config: ScoringConfig,
}

impl SuitabilityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score a candidate as of `now`.
    pub fn score(&self, candidate: &RepositoryCandidate, now: DateTime<Utc>) -> ScoreBreakdown {
        ScoreBreakdown::new(
            self.activity(candidate, now),
            self.opportunity(candidate),
            self.complexity(candidate),
            self.maintainability(candidate),
            now,
        )
    }

    /// Recency decay blended with a commit-frequency proxy.
    pub fn activity(&self, candidate: &RepositoryCandidate, now: DateTime<Utc>) -> f64 {
        let Some(last_commit) = candidate.last_commit_at else {
            return 0.0;
        };

        let age_days = (now - last_commit).num_seconds() as f64 / SECONDS_PER_DAY;
        let fresh = self.config.fresh_days as f64;
        let horizon = self.config.activity_horizon_days as f64;

        let recency = if age_days <= fresh {
            MAX_SCORE
        } else if age_days >= horizon {
            0.0
        } else {
            MAX_SCORE * (1.0 - (age_days - fresh) / (horizon - fresh))
        };

        match candidate.recent_commits {
            Some(commits) => {
                let target = self.config.commit_frequency_target.max(1) as f64;
                let frequency = MAX_SCORE * (commits as f64 / target).min(1.0);
                RECENCY_SHARE * recency + (1.0 - RECENCY_SHARE) * frequency
            }
            None => recency,
        }
    }

    /// Entry-level label credits, scaled by how much of the backlog is labelled.
    pub fn opportunity(&self, candidate: &RepositoryCandidate) -> f64 {
        let Some(issues) = candidate.issues else {
            return 0.0;
        };

        let credits = 1.0 * issues.good_first_issues.min(3) as f64
            + 0.8 * issues.help_wanted_issues.min(2) as f64
            + 0.6 * issues.bug_issues.min(2) as f64;
        if credits == 0.0 {
            return 0.0;
        }

        let labelled = issues.labelled_total() as f64;
        let coverage = if candidate.open_issues == 0 {
            1.0
        } else {
            (labelled / candidate.open_issues as f64 * 4.0).min(1.0)
        };

        (credits * (0.8 + 0.2 * coverage)).min(MAX_SCORE)
    }

    /// Log-scale distance from the centre of the manageable size band.
    pub fn complexity(&self, candidate: &RepositoryCandidate) -> f64 {
        if candidate.size_kb == 0 {
            return 0.0;
        }

        let low = (self.config.complexity_min_size_kb.max(1) as f64).ln();
        let high = (self.config.complexity_max_size_kb.max(2) as f64).ln();
        let centre = (low + high) / 2.0;
        let half_width = ((high - low) / 2.0).max(f64::EPSILON);

        let distance = ((candidate.size_kb as f64).ln() - centre).abs();
        (MAX_SCORE * (1.0 - distance / (2.0 * half_width))).max(0.0)
    }

    /// Contributing guide, license and README quality.
    pub fn maintainability(&self, candidate: &RepositoryCandidate) -> f64 {
        let mut score = 0.0;
        if candidate.has_contributing {
            score += 2.0;
        }
        if candidate.license.as_deref().is_some_and(|l| !l.is_empty()) {
            score += 1.5;
        }
        if let Some(readme) = candidate.readme {
            let length = readme.bytes as f64 / self.config.readme_target_bytes.max(1) as f64;
            let sections =
                readme.sections as f64 / self.config.readme_target_sections.max(1) as f64;
            score += 0.5 + 0.5 * length.min(1.0) + 0.5 * sections.min(1.0);
        }
        score
    }
}

/// Ranking order: overall descending, then stars descending, then most
/// recent commit first. Repository id breaks any remaining tie.
pub fn rank_order(
    a: (&ScoreBreakdown, &RepositoryCandidate),
    b: (&ScoreBreakdown, &RepositoryCandidate),
) -> Ordering {
    b.0.overall
        .partial_cmp(&a.0.overall)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.1.stars.cmp(&a.1.stars))
        .then_with(|| b.1.last_commit_at.cmp(&a.1.last_commit_at))
        .then_with(|| a.1.id.cmp(&b.1.id))
}
