//! Comic management: catalog ownership, the update cycle and the read path.
//!
//! ### Catalog
//! Loaded once at open, mutated only through this facade and flushed to the
//! [`CatalogStore`] on every write. Writers are serialized; each builds the
//! next catalog off to the side, persists it and only then swaps it in, so
//! readers never wait on disk I/O.
//!
//! ### Per-comic serialization
//! Anything that touches a comic's directory or its archive-derived fields
//! (update cycle, backfill, edit, purge, delete) holds that comic's lock, so at most one fetch/store sequence runs per
//! comic while different comics proceed in parallel.

mod backfill;
mod update;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{Days, NaiveDate};
use strips_client::DownloaderFacade;
use strips_core::archive::{Avatar, StripArchive};
use strips_core::catalog::CatalogStore;
use strips_core::clock::Clock;
use strips_core::config::{BackfillConfig, CacheConfig};
use strips_core::model::{
    BootstrapEntry, ComicDescriptor, ComicId, Direction, NavigationResult, RetrievalFilter, RetrievalRecord,
    RetrievalSummary, StripRecord, comic_id,
};
use strips_core::navigation::{Boundary, MetadataEntry, MetadataKey, NavigationCache, Navigator, Prefetcher, StripReader};
use strips_core::tracking::RetrievalStatusTracker;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

pub use update::{BatchReport, CycleError, CycleState, UpdateReport};

use crate::FacadeError;

type Catalog = BTreeMap<ComicId, ComicDescriptor>;

/// Shared engine components the facade orchestrates.
pub struct Components {
    pub catalog_store: Arc<dyn CatalogStore>,
    pub downloaders: Arc<DownloaderFacade>,
    pub archive: Arc<StripArchive>,
    pub retrievals: Arc<RetrievalStatusTracker>,
    pub clock: Arc<dyn Clock>,
}

pub struct ComicManagementFacade {
    catalog_store: Arc<dyn CatalogStore>,
    catalog: RwLock<Catalog>,
    catalog_writer: Mutex<()>,
    downloaders: Arc<DownloaderFacade>,
    archive: Arc<StripArchive>,
    reader: Arc<StripReader>,
    cache: Arc<NavigationCache>,
    prefetcher: Prefetcher,
    retrievals: Arc<RetrievalStatusTracker>,
    clock: Arc<dyn Clock>,
    bootstrap: Vec<BootstrapEntry>,
    comic_locks: Mutex<HashMap<ComicId, Arc<Mutex<()>>>>,
    update_concurrency: usize,
    backfill: BackfillConfig,
}

impl ComicManagementFacade {
    /// Load the catalog and assemble the read path.
    pub async fn open(components: Components, cache_config: &CacheConfig) -> Result<Self, FacadeError> {
        let Components { catalog_store, downloaders, archive, retrievals, clock } = components;

        let comics = catalog_store.load().await?;
        let catalog: Catalog = comics.into_iter().map(|c| (c.id, c)).collect();
        tracing::info!(comics = catalog.len(), "catalog loaded");

        let cache = Arc::new(NavigationCache::new(cache_config));
        let reader = Arc::new(StripReader::new(archive.clone(), cache.clone()));
        let prefetcher =
            Prefetcher::new(reader.clone(), cache_config.lookahead_count, cache_config.lookahead_enabled);

        Ok(Self {
            catalog_store,
            catalog: RwLock::new(catalog),
            catalog_writer: Mutex::new(()),
            downloaders,
            archive,
            reader,
            cache,
            prefetcher,
            retrievals,
            clock,
            bootstrap: Vec::new(),
            comic_locks: Mutex::new(HashMap::new()),
            update_concurrency: 4,
            backfill: BackfillConfig::default(),
        })
    }

    pub fn with_bootstrap(mut self, entries: Vec<BootstrapEntry>) -> Self {
        self.bootstrap = entries;
        self
    }

    pub fn with_update_concurrency(mut self, concurrency: usize) -> Self {
        self.update_concurrency = concurrency.max(1);
        self
    }

    pub fn with_backfill(mut self, config: BackfillConfig) -> Self {
        self.backfill = config;
        self
    }

    pub fn cache(&self) -> &Arc<NavigationCache> {
        &self.cache
    }

    async fn lock_comic(&self, id: ComicId) -> OwnedMutexGuard<()> {
        let lock = self.comic_locks.lock().await.entry(id).or_default().clone();
        lock.lock_owned().await
    }

    /// Apply `change` to a copy of the catalog, persist it, then swap it in.
    async fn mutate_catalog<R>(
        &self, change: impl FnOnce(&mut Catalog) -> Result<R, FacadeError>,
    ) -> Result<R, FacadeError> {
        let _writer = self.catalog_writer.lock().await;
        let mut next = self.catalog.read().await.clone();
        let out = change(&mut next)?;

        let comics: Vec<ComicDescriptor> = next.values().cloned().collect();
        self.catalog_store.save(&comics).await?;

        *self.catalog.write().await = next;
        self.cache.invalidate_metadata().await;
        Ok(out)
    }

    // Catalog reads

    pub async fn get_all_comics(&self) -> Arc<Vec<ComicDescriptor>> {
        if let Some(MetadataEntry::All(all)) = self.cache.metadata.get(&MetadataKey::AllComics).await {
            return all;
        }
        let all = Arc::new(self.catalog.read().await.values().cloned().collect::<Vec<_>>());
        self.cache.metadata.insert(MetadataKey::AllComics, MetadataEntry::All(all.clone())).await;
        all
    }

    pub async fn get_comic(&self, id: ComicId) -> Option<ComicDescriptor> {
        if let Some(MetadataEntry::One(comic)) = self.cache.metadata.get(&MetadataKey::Comic(id)).await {
            return comic;
        }
        let comic = self.catalog.read().await.get(&id).cloned();
        self.cache.metadata.insert(MetadataKey::Comic(id), MetadataEntry::One(comic.clone())).await;
        comic
    }

    /// Case-insensitive lookup by display name.
    pub async fn get_comic_by_name(&self, name: &str) -> Option<ComicDescriptor> {
        let wanted = name.trim().to_lowercase();
        self.catalog.read().await.values().find(|c| c.name.to_lowercase() == wanted).cloned()
    }

    async fn require_comic(&self, id: ComicId) -> Result<ComicDescriptor, FacadeError> {
        self.get_comic(id).await.ok_or(FacadeError::ComicNotFound(id))
    }

    // Catalog writes

    /// Add a new comic. The id is derived from the name.
    pub async fn create_comic(&self, mut comic: ComicDescriptor) -> Result<ComicDescriptor, FacadeError> {
        comic.name = comic.name.trim().to_string();
        if comic.name.is_empty() {
            return Err(FacadeError::InvalidInput("comic name is empty".into()));
        }
        if comic.source.trim().is_empty() {
            return Err(FacadeError::InvalidInput(format!("comic {} has no source", comic.name)));
        }
        comic.id = comic_id(&comic.name);

        let created = self
            .mutate_catalog(|catalog| {
                if catalog.contains_key(&comic.id) {
                    return Err(FacadeError::InvalidInput(format!("comic {} already exists", comic.name)));
                }
                catalog.insert(comic.id, comic.clone());
                Ok(comic)
            })
            .await?;
        tracing::info!(comic = %created.name, id = created.id, "comic created");
        Ok(created)
    }

    /// Replace a comic's editable metadata.
    ///
    /// The name must still hash to `id`. Archive-derived fields
    /// (`oldest_date`, `newest_date`, `avatar_available`) are kept from the
    /// stored entry.
    pub async fn edit_comic(&self, id: ComicId, update: ComicDescriptor) -> Result<ComicDescriptor, FacadeError> {
        if comic_id(&update.name) != id {
            return Err(FacadeError::InvalidInput(format!("name {} does not match comic {id}", update.name)));
        }
        let _guard = self.lock_comic(id).await;
        self.mutate_catalog(|catalog| {
            let existing = catalog.get(&id).ok_or(FacadeError::ComicNotFound(id))?;
            let edited = ComicDescriptor {
                id,
                oldest_date: existing.oldest_date,
                newest_date: existing.newest_date,
                avatar_available: existing.avatar_available,
                ..update
            };
            catalog.insert(id, edited.clone());
            Ok(edited)
        })
        .await
    }

    /// Remove a comic, its archived strips and its cached entries.
    pub async fn delete_comic(&self, id: ComicId) -> Result<bool, FacadeError> {
        let _guard = self.lock_comic(id).await;
        let Some(removed) = self.mutate_catalog(|catalog| Ok(catalog.remove(&id))).await? else {
            return Ok(false);
        };
        self.archive.delete_comic(&removed).await?;
        self.cache.invalidate_comic(id).await;
        tracing::info!(comic = %removed.name, id, "comic deleted");
        Ok(true)
    }

    /// Re-read the catalog from its store, dropping in-memory state.
    pub async fn refresh_comic_list(&self) -> Result<usize, FacadeError> {
        let _writer = self.catalog_writer.lock().await;
        let comics = self.catalog_store.load().await?;
        let next: Catalog = comics.into_iter().map(|c| (c.id, c)).collect();
        let count = next.len();
        *self.catalog.write().await = next;
        self.cache.clear().await;
        tracing::info!(comics = count, "catalog refreshed");
        Ok(count)
    }

    /// Add bootstrap comics missing from the catalog. Never removes entries.
    ///
    /// Returns the comics that were added.
    pub async fn reconcile_with_bootstrap(&self) -> Result<Vec<ComicDescriptor>, FacadeError> {
        let missing: Vec<ComicDescriptor> = {
            let catalog = self.catalog.read().await;
            self.bootstrap
                .iter()
                .filter(|entry| !entry.strip_name.trim().is_empty())
                .map(ComicDescriptor::from_bootstrap)
                .filter(|comic| {
                    !catalog.contains_key(&comic.id)
                        && !catalog.values().any(|c| c.name.eq_ignore_ascii_case(&comic.name))
                })
                .collect()
        };

        if missing.is_empty() {
            tracing::debug!(entries = self.bootstrap.len(), "catalog already reconciled");
            return Ok(missing);
        }

        let added = self
            .mutate_catalog(|catalog| {
                let mut added = Vec::new();
                for comic in missing {
                    if !catalog.contains_key(&comic.id) {
                        catalog.insert(comic.id, comic.clone());
                        added.push(comic);
                    }
                }
                Ok(added)
            })
            .await?;
        tracing::info!(added = added.len(), "reconciled catalog with bootstrap");
        Ok(added)
    }

    /// Record new archive bounds for a comic.
    async fn record_bounds(
        &self, id: ComicId, oldest: Option<NaiveDate>, newest: Option<NaiveDate>,
    ) -> Result<(), FacadeError> {
        self.mutate_catalog(|catalog| {
            if let Some(comic) = catalog.get_mut(&id) {
                comic.oldest_date = oldest;
                comic.newest_date = newest;
            }
            Ok(())
        })
        .await
    }

    // Read path

    /// Navigate a comic's timeline.
    ///
    /// With no `from`, `Forward` yields the oldest strip and `Backward` the
    /// newest. A hit kicks off look-ahead in the same direction.
    pub async fn get_comic_strip(
        &self, id: ComicId, direction: Direction, from: Option<NaiveDate>,
    ) -> Result<NavigationResult, FacadeError> {
        let comic = self.require_comic(id).await?;
        let result = self.reader.navigate(&comic, direction, from).await?;
        if let Some(date) = result.date()
            && result.found
        {
            self.prefetcher.prefetch(comic, direction, date);
        }
        Ok(result)
    }

    pub async fn get_comic_strip_on_date(&self, id: ComicId, date: NaiveDate) -> Result<Option<StripRecord>, FacadeError> {
        let comic = self.require_comic(id).await?;
        Ok(self.archive.find_on(&comic, date).await?)
    }

    /// Image bytes of an archived strip.
    pub async fn read_strip(&self, record: &StripRecord) -> Result<Bytes, FacadeError> {
        Ok(Bytes::from(self.archive.read(record).await?))
    }

    pub async fn get_avatar(&self, id: ComicId) -> Result<Option<Avatar>, FacadeError> {
        let comic = self.require_comic(id).await?;
        Ok(self.archive.avatar(&comic).await?)
    }

    pub async fn get_newest_date(&self, id: ComicId) -> Result<Option<NaiveDate>, FacadeError> {
        let comic = self.require_comic(id).await?;
        Ok(self.reader.boundary(&comic, Boundary::Newest).await?.map(|s| s.date))
    }

    pub async fn get_oldest_date(&self, id: ComicId) -> Result<Option<NaiveDate>, FacadeError> {
        let comic = self.require_comic(id).await?;
        Ok(self.reader.boundary(&comic, Boundary::Oldest).await?.map(|s| s.date))
    }

    pub async fn get_years_with_content(&self, id: ComicId) -> Result<Vec<i32>, FacadeError> {
        let comic = self.require_comic(id).await?;
        Ok(self.archive.years_with_content(&comic).await?)
    }

    pub async fn get_storage_size(&self, id: ComicId) -> Result<u64, FacadeError> {
        let comic = self.require_comic(id).await?;
        Ok(self.archive.storage_size(&comic).await?)
    }

    // Maintenance

    /// Delete strips older than `days_to_keep` days for every comic.
    ///
    /// Returns the number of strips deleted.
    pub async fn purge_old_images(&self, days_to_keep: u32) -> Result<usize, FacadeError> {
        let today = self.clock.today();
        let cutoff = today.checked_sub_days(Days::new(u64::from(days_to_keep))).unwrap_or(today);

        let mut total = 0;
        for comic in self.get_all_comics().await.iter() {
            let _guard = self.lock_comic(comic.id).await;
            let deleted = self.archive.purge_before(comic, cutoff).await?;
            if deleted == 0 {
                continue;
            }
            total += deleted;
            self.cache.invalidate_strips(comic.id).await;

            let oldest = self.archive.find_first(comic).await?.map(|s| s.date);
            let newest = self.archive.find_last(comic).await?.map(|s| s.date);
            self.record_bounds(comic.id, oldest, newest).await?;
        }
        Ok(total)
    }

    pub async fn get_retrieval_records(&self, filter: &RetrievalFilter) -> Result<Vec<RetrievalRecord>, FacadeError> {
        Ok(self.retrievals.query(filter).await?)
    }

    pub async fn get_retrieval_summary(
        &self, from: Option<NaiveDate>, to: Option<NaiveDate>,
    ) -> Result<RetrievalSummary, FacadeError> {
        Ok(self.retrievals.summarize(from, to).await?)
    }

    pub async fn purge_old_retrieval_records(&self, days_to_keep: u32) -> Result<u64, FacadeError> {
        Ok(self.retrievals.purge_older_than(days_to_keep).await?)
    }
}

#[cfg(test)]
pub(crate) mod testing;
