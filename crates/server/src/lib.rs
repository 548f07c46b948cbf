//! HTTP surface of the reposcout discovery engine.

pub mod api;
pub mod metrics;
pub mod state;
