//! Domain types shared by every layer of the engine.

pub mod comic;
pub mod navigation;
pub mod retrieval;

pub use comic::{BootstrapEntry, ComicDescriptor, ComicId, comic_id};
pub use navigation::{Direction, NavigationReason, NavigationResult, StripRecord};
pub use retrieval::{RetrievalFilter, RetrievalRecord, RetrievalStatus, RetrievalSummary, record_id};
