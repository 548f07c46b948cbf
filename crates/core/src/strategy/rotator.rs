//! Round-robin strategy selection with persistent cursors.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::store::{StoreError, UserStateStore};

use super::{
    default_catalogue, CursorAdvance, RotationSlot, SearchCursor, StrategyConfig, StrategyStatus,
};

/// Picks the next strategy for a user and persists where each one left off.
///
/// The least recently used non-exhausted strategy wins; strategies never used
/// by the user come first, in catalogue order. A stored cursor is only
/// resumed when it was issued for the same query; otherwise the strategy
/// starts over from the first page.
pub struct SearchStrategyRotator {
    catalogue: Vec<StrategyConfig>,
    store: Arc<dyn UserStateStore>,
}

impl SearchStrategyRotator {
    /// Create a rotator. An empty catalogue falls back to the built-in one.
    pub fn new(catalogue: Vec<StrategyConfig>, store: Arc<dyn UserStateStore>) -> Self {
        let catalogue = if catalogue.is_empty() {
            default_catalogue()
        } else {
            catalogue
        };
        Self { catalogue, store }
    }

    pub fn catalogue(&self) -> &[StrategyConfig] {
        &self.catalogue
    }

    fn cursor_map(&self, user_id: &str) -> Result<HashMap<String, SearchCursor>, StoreError> {
        Ok(self
            .store
            .list_cursors(user_id)?
            .into_iter()
            .map(|c| (c.strategy_id.clone(), c))
            .collect())
    }

    /// Select the next strategy to run, or `None` when all are exhausted.
    pub fn next(
        &self,
        user_id: &str,
        min_stars: u32,
        max_stars: u32,
        page_size: u32,
    ) -> Result<Option<RotationSlot>, StoreError> {
        let cursors = self.cursor_map(user_id)?;

        let mut best: Option<(Option<DateTime<Utc>>, usize, RotationSlot)> = None;
        for (index, strategy) in self.catalogue.iter().enumerate() {
            let Some(query) = strategy.resolve(min_stars, max_stars, page_size) else {
                debug!(strategy = %strategy.id, "Empty star band, strategy skipped");
                continue;
            };
            let fingerprint = query.fingerprint();

            let (last_used, token) = match cursors.get(&strategy.id) {
                Some(c) if c.query_fingerprint == fingerprint => {
                    if c.exhausted {
                        continue;
                    }
                    (Some(c.last_used_at), c.token.clone())
                }
                // Cursor from a different query: start over, keep rotation position
                Some(c) => (Some(c.last_used_at), None),
                None => (None, None),
            };

            let better = match &best {
                None => true,
                Some((best_used, best_index, _)) => (last_used, index) < (*best_used, *best_index),
            };
            if better {
                best = Some((
                    last_used,
                    index,
                    RotationSlot {
                        strategy: strategy.clone(),
                        query,
                        cursor: token,
                    },
                ));
            }
        }

        let slot = best.map(|(_, _, slot)| slot);
        if let Some(slot) = &slot {
            debug!(
                user_id = %user_id,
                strategy = %slot.strategy.id,
                resuming = slot.cursor.is_some(),
                "Selected search strategy"
            );
        }
        Ok(slot)
    }

    /// Persist the outcome of a round for `slot`.
    pub fn advance(
        &self,
        user_id: &str,
        slot: &RotationSlot,
        outcome: CursorAdvance,
        now: DateTime<Utc>,
    ) -> Result<SearchCursor, StoreError> {
        let (token, exhausted) = match outcome {
            CursorAdvance::Next(token) => (Some(token), false),
            CursorAdvance::Exhausted => (None, true),
        };

        let cursor = SearchCursor {
            user_id: user_id.to_string(),
            strategy_id: slot.strategy.id.clone(),
            token,
            query_fingerprint: slot.query.fingerprint(),
            last_used_at: now,
            exhausted,
        };
        self.store.upsert_cursor(&cursor)?;

        if exhausted {
            debug!(user_id = %user_id, strategy = %cursor.strategy_id, "Strategy exhausted");
        }
        Ok(cursor)
    }

    /// Clear exhaustion flags and continuation tokens for a user.
    pub fn reset(&self, user_id: &str) -> Result<usize, StoreError> {
        self.store.reset_cursors(user_id)
    }

    /// Per-strategy state for a user, in catalogue order.
    pub fn status(&self, user_id: &str) -> Result<Vec<StrategyStatus>, StoreError> {
        let cursors = self.cursor_map(user_id)?;
        Ok(self
            .catalogue
            .iter()
            .map(|strategy| {
                let cursor = cursors.get(&strategy.id);
                StrategyStatus {
                    strategy_id: strategy.id.clone(),
                    sort: strategy.sort,
                    topic: strategy.topic.clone(),
                    exhausted: cursor.is_some_and(|c| c.exhausted),
                    has_cursor: cursor.is_some_and(|c| c.token.is_some()),
                    last_used_at: cursor.map(|c| c.last_used_at),
                }
            })
            .collect())
    }
}
