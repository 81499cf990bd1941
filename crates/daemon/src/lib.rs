//! Comic management daemon.
//!
//! This crate provides:
//! - [`ComicManagementFacade`]: the catalog, the per-comic update cycle,
//!   year backfill and the cached read path
//! - [`Scheduler`]: once-per-day tasks with startup catch-up

pub mod error;
pub mod facade;
pub mod scheduler;

pub use error::FacadeError;
pub use facade::{BatchReport, ComicManagementFacade, Components, CycleError, CycleState, UpdateReport};
pub use scheduler::{BackfillJob, DailyRunner, Job, RetrievalPurgeJob, Scheduler, StartupReconciler};
