//! Registry routing comics to their source downloader.

use std::collections::BTreeMap;
use std::sync::Arc;

use strips_core::model::ComicDescriptor;

use crate::DownloadError;
use crate::fetch::FetchClient;
use crate::source::{ComicsKingdom, GoComics, SharedDownloader};

/// Source-keyed downloader registry.
///
/// Built once at startup. Registration is append-only; a source can be
/// registered exactly once.
#[derive(Default)]
pub struct DownloaderFacade {
    downloaders: BTreeMap<String, SharedDownloader>,
}

impl DownloaderFacade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the GoComics and Comics Kingdom strategies.
    pub fn with_default_sources(client: Arc<FetchClient>) -> Result<Self, DownloadError> {
        let mut facade = Self::new();
        facade.register(Arc::new(GoComics::new(client.clone())))?;
        facade.register(Arc::new(ComicsKingdom::new(client)))?;
        Ok(facade)
    }

    pub fn register(&mut self, downloader: SharedDownloader) -> Result<(), DownloadError> {
        let source = downloader.source().trim().to_lowercase();
        if source.is_empty() {
            return Err(DownloadError::UnknownSource("empty source name".into()));
        }
        if self.downloaders.contains_key(&source) {
            return Err(DownloadError::DuplicateSource(source));
        }
        tracing::debug!(%source, "registered downloader");
        self.downloaders.insert(source, downloader);
        Ok(())
    }

    pub fn get(&self, source: &str) -> Option<SharedDownloader> {
        self.downloaders.get(&source.trim().to_lowercase()).cloned()
    }

    /// Downloader responsible for `comic`.
    pub fn downloader_for(&self, comic: &ComicDescriptor) -> Result<SharedDownloader, DownloadError> {
        self.get(&comic.source).ok_or_else(|| DownloadError::UnknownSource(comic.source.clone()))
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.downloaders.keys().map(String::as_str)
    }
}
