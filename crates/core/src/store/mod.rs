//! Persistent per-user state: exposure history and search cursors.

mod sqlite;
mod types;

pub(crate) use sqlite::{from_db_time, to_db_time};
pub use sqlite::SqliteUserStateStore;
pub use types::*;
