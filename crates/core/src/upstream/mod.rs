//! Upstream repository host client.
//!
//! The discovery engine only talks to the host through [`UpstreamClient`];
//! every call goes through the shared [`crate::budget::UpstreamGate`].

mod github;
mod types;

pub use github::GitHubClient;
pub use types::*;
