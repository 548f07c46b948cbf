//! Search strategy catalogue and per-user rotation.

mod catalogue;
mod rotator;
mod types;

pub use catalogue::default_catalogue;
pub use rotator::SearchStrategyRotator;
pub use types::*;

pub use crate::upstream::SortOrder;
