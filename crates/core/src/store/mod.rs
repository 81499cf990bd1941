//! SQLite-backed state store for retrieval outcomes and task runs.
//!
//! Async access goes through tokio-rusqlite so the blocking SQLite calls
//! run on a dedicated thread. It provides:
//!
//! - Idempotent upserts of retrieval records keyed by `comicName_date`
//! - Filtered record queries and age-based purges
//! - Last-execution dates for named scheduled tasks
//! - Automatic schema migrations in WAL mode

pub mod connection;
pub mod migrations;
pub mod retrieval;
pub mod tasks;

pub use crate::Error;

pub use connection::StateDb;
