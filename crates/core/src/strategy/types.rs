//! Search strategy and cursor types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::upstream::{SearchQuery, SortOrder};

/// How a strategy derives its star range from the requested one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StarBand {
    /// The requested range unchanged.
    #[default]
    Full,
    /// Slice `index` of `of` equal-width slices of the requested range.
    Slice { index: u32, of: u32 },
    /// Range widened by `below`/`above`, with the lower bound floored.
    Widened { below: u32, above: u32, floor: u32 },
    /// Upper bound multiplied by `factor`, capped at `cap`.
    Extended { factor: u32, cap: u32 },
}

impl StarBand {
    /// Concrete `(min, max)` for a requested range, or `None` when the band
    /// leaves no stars to search (e.g. a request above an extension cap).
    pub fn apply(&self, min: u32, max: u32) -> Option<(u32, u32)> {
        let (lo, hi) = match *self {
            StarBand::Full => (min, max),
            StarBand::Slice { index, of } => {
                let of = of.max(1);
                let index = index.min(of - 1);
                let width = (max.saturating_sub(min)) / of;
                let lo = if index == 0 {
                    min
                } else {
                    min + index * width + 1
                };
                let hi = if index == of - 1 {
                    max
                } else {
                    min + (index + 1) * width
                };
                (lo, hi)
            }
            StarBand::Widened {
                below,
                above,
                floor,
            } => (min.saturating_sub(below).max(floor), max.saturating_add(above)),
            StarBand::Extended { factor, cap } => (min, max.saturating_mul(factor).min(cap)),
        };
        (lo <= hi).then_some((lo, hi))
    }
}

/// One entry in the strategy catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: String,
    pub sort: SortOrder,
    #[serde(default)]
    pub band: StarBand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl StrategyConfig {
    /// Build the upstream query for a requested star range. `None` when the
    /// strategy's band is empty for that range.
    pub fn resolve(&self, min_stars: u32, max_stars: u32, page_size: u32) -> Option<SearchQuery> {
        let (min_stars, max_stars) = self.band.apply(min_stars, max_stars)?;
        Some(SearchQuery {
            min_stars,
            max_stars,
            sort: self.sort,
            topic: self.topic.clone(),
            page_size,
        })
    }
}

/// Per-user, per-strategy pagination state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCursor {
    pub user_id: String,
    pub strategy_id: String,
    /// Opaque upstream continuation token. `None` means start from the top.
    pub token: Option<String>,
    /// Fingerprint of the query the token belongs to.
    pub query_fingerprint: String,
    pub last_used_at: DateTime<Utc>,
    pub exhausted: bool,
}

/// Outcome reported back to the rotator after fetching a page.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorAdvance {
    /// Resume from this token next time.
    Next(String),
    /// The strategy yielded nothing new or ran out of pages.
    Exhausted,
}

/// A strategy selected for the next discovery round.
#[derive(Debug, Clone)]
pub struct RotationSlot {
    pub strategy: StrategyConfig,
    pub query: SearchQuery,
    /// Token to resume from, if the stored cursor matches this query.
    pub cursor: Option<String>,
}

/// Per-user view of one catalogue strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStatus {
    pub strategy_id: String,
    pub sort: SortOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub exhausted: bool,
    pub has_cursor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}
