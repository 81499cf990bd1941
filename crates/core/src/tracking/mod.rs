//! Outcome and schedule bookkeeping on top of the state store.

pub mod retrieval;
pub mod tasks;

pub use retrieval::RetrievalStatusTracker;
pub use tasks::TaskExecutionTracker;
