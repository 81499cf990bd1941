//! Source access for the strip archive.
//!
//! This crate provides the HTTP fetch pipeline, page extraction, the
//! per-source downloader strategies and the registry that routes a comic to
//! its strategy.

pub mod error;
pub mod extract;
pub mod facade;
pub mod fetch;
#[cfg(feature = "render")]
pub mod render;
pub mod source;

pub use error::DownloadError;
pub use facade::DownloaderFacade;
pub use fetch::{FetchClient, FetchConfig, ImagePayload, Page};
pub use source::{ComicProfile, ComicsKingdom, FetchedStrip, GoComics, SourceDownloader, next_publication_day};
