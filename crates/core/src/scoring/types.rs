//! Score breakdown and verdict types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weights of activity, opportunity, complexity and maintainability.
pub const WEIGHTS: [f64; 4] = [0.30, 0.35, 0.20, 0.15];

/// Upper bound of every sub-score.
pub const MAX_SCORE: f64 = 5.0;

/// Overall score at or above which a repository counts as suitable.
pub const SUITABLE_THRESHOLD: f64 = 3.5;

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, MAX_SCORE)
    }
}

/// Recommendation tier derived from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Excellent,
    Good,
    Moderate,
    NotRecommended,
}

impl Verdict {
    pub fn from_overall(overall: f64) -> Self {
        if overall >= 4.2 {
            Verdict::Excellent
        } else if overall >= SUITABLE_THRESHOLD {
            Verdict::Good
        } else if overall >= 2.5 {
            Verdict::Moderate
        } else {
            Verdict::NotRecommended
        }
    }
}

/// Four-category suitability score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub activity: f64,
    pub opportunity: f64,
    pub complexity: f64,
    pub maintainability: f64,
    pub overall: f64,
    pub computed_at: DateTime<Utc>,
}

impl ScoreBreakdown {
    /// Build a breakdown from raw sub-scores.
    ///
    /// Sub-scores are clamped to `[0, 5]`; `overall` is always derived.
    pub fn new(
        activity: f64,
        opportunity: f64,
        complexity: f64,
        maintainability: f64,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let activity = round2(clamp_score(activity));
        let opportunity = round2(clamp_score(opportunity));
        let complexity = round2(clamp_score(complexity));
        let maintainability = round2(clamp_score(maintainability));
        Self {
            overall: weighted_overall(activity, opportunity, complexity, maintainability),
            activity,
            opportunity,
            complexity,
            maintainability,
            computed_at,
        }
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_overall(self.overall)
    }

    pub fn is_suitable(&self) -> bool {
        self.overall >= SUITABLE_THRESHOLD
    }

    /// Whether the stored fields satisfy the breakdown invariants.
    ///
    /// A deserialized breakdown that fails this check was not produced by
    /// [`ScoreBreakdown::new`] and must not be trusted.
    pub fn is_consistent(&self) -> bool {
        let parts = [
            self.activity,
            self.opportunity,
            self.complexity,
            self.maintainability,
        ];
        parts.iter().all(|p| (0.0..=MAX_SCORE).contains(p))
            && (self.overall
                - weighted_overall(
                    self.activity,
                    self.opportunity,
                    self.complexity,
                    self.maintainability,
                ))
            .abs()
                < 1e-9
    }
}

fn weighted_overall(activity: f64, opportunity: f64, complexity: f64, maintainability: f64) -> f64 {
    round1(
        WEIGHTS[0] * activity
            + WEIGHTS[1] * opportunity
            + WEIGHTS[2] * complexity
            + WEIGHTS[3] * maintainability,
    )
}
