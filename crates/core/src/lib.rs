//! Core types and shared functionality for the strip archive.
//!
//! This crate provides:
//! - The on-disk strip archive with navigation and duplicate detection
//! - Layered read-path caching with prefetch
//! - SQLite-backed retrieval and task-execution tracking
//! - The JSON comic catalog and bootstrap loader
//! - Unified error types and layered configuration

pub mod archive;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod duplicate;
pub mod error;
pub mod imaging;
pub mod model;
pub mod navigation;
pub mod store;
pub mod tracking;

pub use archive::{Avatar, StoreOutcome, StripArchive};
pub use catalog::{CatalogStore, JsonCatalogStore, load_bootstrap};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AppConfig;
pub use duplicate::DuplicateDetector;
pub use error::Error;
pub use navigation::{NavigationCache, Navigator, Prefetcher, StripReader};
pub use store::StateDb;
pub use tracking::{RetrievalStatusTracker, TaskExecutionTracker};
