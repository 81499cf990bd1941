//! Layered read-path cache with predictive prefetch.
//!
//! ### Tiers
//! Four independently sized and timed [`TtlCache`]s:
//! - `navigation`: full [`NavigationResult`]s keyed by comic, direction and
//!   starting date
//! - `boundary`: oldest/newest strip per comic
//! - `navigation_dates`: next/previous strip from a given date
//! - `metadata`: catalog listings and single descriptors
//!
//! ### Read-through
//! [`StripReader`] consults the tiers first and falls back to the
//! [`StripArchive`], populating the tier before returning.
//!
//! ### Invalidation
//! A successful store for a comic drops that comic's navigation, boundary
//! and navigation-date entries. Other comics keep theirs.

pub mod prefetch;
pub mod ttl;

use std::sync::Arc;

use chrono::NaiveDate;

pub use prefetch::Prefetcher;
pub use ttl::{CacheStats, TtlCache};

use crate::Error;
use crate::archive::StripArchive;
use crate::config::CacheConfig;
use crate::model::{ComicDescriptor, ComicId, Direction, NavigationReason, NavigationResult, StripRecord};

/// Which end of a comic's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    Oldest,
    Newest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NavigationKey {
    pub comic_id: ComicId,
    pub direction: Direction,
    pub from: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    AllComics,
    Comic(ComicId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataEntry {
    All(Arc<Vec<ComicDescriptor>>),
    One(Option<ComicDescriptor>),
}

/// The four cache tiers.
pub struct NavigationCache {
    pub navigation: TtlCache<NavigationKey, NavigationResult>,
    pub boundary: TtlCache<(ComicId, Boundary), Option<StripRecord>>,
    pub navigation_dates: TtlCache<(ComicId, Direction, NaiveDate), Option<StripRecord>>,
    pub metadata: TtlCache<MetadataKey, MetadataEntry>,
}

impl NavigationCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            navigation: TtlCache::from_tier("navigation", &config.navigation),
            boundary: TtlCache::from_tier("boundary", &config.boundary),
            navigation_dates: TtlCache::from_tier("navigation_dates", &config.navigation_dates),
            metadata: TtlCache::from_tier("metadata", &config.metadata),
        }
    }

    /// Drop strip-derived entries for one comic after its timeline changed.
    pub async fn invalidate_strips(&self, comic_id: ComicId) {
        let nav = self.navigation.invalidate_where(|k| k.comic_id == comic_id).await;
        let bounds = self.boundary.invalidate_where(|(id, _)| *id == comic_id).await;
        let dates = self.navigation_dates.invalidate_where(|(id, _, _)| *id == comic_id).await;
        tracing::debug!(comic_id, nav, bounds, dates, "invalidated strip cache entries");
    }

    /// Drop catalog-derived entries after the catalog changed.
    pub async fn invalidate_metadata(&self) {
        self.metadata.clear().await;
    }

    /// Drop everything known about one comic.
    pub async fn invalidate_comic(&self, comic_id: ComicId) {
        self.invalidate_strips(comic_id).await;
        self.invalidate_metadata().await;
    }

    pub async fn clear(&self) {
        self.navigation.clear().await;
        self.boundary.clear().await;
        self.navigation_dates.clear().await;
        self.metadata.clear().await;
    }

    /// Sweep expired entries from every tier and log per-tier counters.
    ///
    /// Returns the number of entries dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let dropped = self.navigation.cleanup_expired().await
            + self.boundary.cleanup_expired().await
            + self.navigation_dates.cleanup_expired().await
            + self.metadata.cleanup_expired().await;

        let tiers = [
            (self.navigation.name(), self.navigation.stats().await),
            (self.boundary.name(), self.boundary.stats().await),
            (self.navigation_dates.name(), self.navigation_dates.stats().await),
            (self.metadata.name(), self.metadata.stats().await),
        ];
        for (tier, stats) in tiers {
            tracing::debug!(tier, hits = stats.hits, misses = stats.misses, entries = stats.entries, "cache tier");
        }
        dropped
    }
}

/// Anything that can answer a navigation request.
#[async_trait::async_trait]
pub trait Navigator: Send + Sync {
    /// Strip reached from `from` in `direction`.
    ///
    /// With no `from`, `Forward` yields the oldest strip and `Backward` the
    /// newest.
    async fn navigate(
        &self, comic: &ComicDescriptor, direction: Direction, from: Option<NaiveDate>,
    ) -> Result<NavigationResult, Error>;
}

/// Read-through navigation over the archive.
pub struct StripReader {
    archive: Arc<StripArchive>,
    cache: Arc<NavigationCache>,
}

impl StripReader {
    pub fn new(archive: Arc<StripArchive>, cache: Arc<NavigationCache>) -> Self {
        Self { archive, cache }
    }

    pub fn cache(&self) -> &Arc<NavigationCache> {
        &self.cache
    }

    pub async fn boundary(&self, comic: &ComicDescriptor, which: Boundary) -> Result<Option<StripRecord>, Error> {
        let key = (comic.id, which);
        if let Some(hit) = self.cache.boundary.get(&key).await {
            return Ok(hit);
        }

        let found = match which {
            Boundary::Oldest => self.archive.find_first(comic).await?,
            Boundary::Newest => self.archive.find_last(comic).await?,
        };
        self.cache.boundary.insert(key, found.clone()).await;
        Ok(found)
    }

    /// Adjacent strip from `date` in `direction`, excluding `date` itself.
    pub async fn adjacent(
        &self, comic: &ComicDescriptor, direction: Direction, date: NaiveDate,
    ) -> Result<Option<StripRecord>, Error> {
        let key = (comic.id, direction, date);
        if let Some(hit) = self.cache.navigation_dates.get(&key).await {
            return Ok(hit);
        }

        let found = match direction {
            Direction::Forward => self.archive.find_next(comic, date).await?,
            Direction::Backward => self.archive.find_previous(comic, date).await?,
        };
        self.cache.navigation_dates.insert(key, found.clone()).await;
        Ok(found)
    }

    async fn resolve(
        &self, comic: &ComicDescriptor, direction: Direction, from: Option<NaiveDate>,
    ) -> Result<NavigationResult, Error> {
        let Some(from) = from else {
            let which = match direction {
                Direction::Forward => Boundary::Oldest,
                Direction::Backward => Boundary::Newest,
            };
            return Ok(match self.boundary(comic, which).await? {
                Some(strip) => NavigationResult::found(strip),
                None => NavigationResult::not_found(NavigationReason::NoComicsAvailable, None),
            });
        };

        if let Some(strip) = self.adjacent(comic, direction, from).await? {
            return Ok(NavigationResult { requested_date: Some(from), ..NavigationResult::found(strip) });
        }

        let previous = self.adjacent(comic, Direction::Backward, from).await?.map(|s| s.date);
        let next = self.adjacent(comic, Direction::Forward, from).await?.map(|s| s.date);
        let reason = if previous.is_none() && next.is_none() && self.archive.find_on(comic, from).await?.is_none() {
            NavigationReason::NoComicsAvailable
        } else {
            match direction {
                Direction::Forward => NavigationReason::AtEnd,
                Direction::Backward => NavigationReason::AtBeginning,
            }
        };
        Ok(NavigationResult::not_found(reason, Some(from)).with_hints(previous, next))
    }
}

#[async_trait::async_trait]
impl Navigator for StripReader {
    async fn navigate(
        &self, comic: &ComicDescriptor, direction: Direction, from: Option<NaiveDate>,
    ) -> Result<NavigationResult, Error> {
        let key = NavigationKey { comic_id: comic.id, direction, from };
        if let Some(hit) = self.cache.navigation.get(&key).await {
            tracing::debug!(comic = %comic.name, ?direction, ?from, "navigation cache hit");
            return Ok(hit);
        }

        let result = self.resolve(comic, direction, from).await?;
        self.cache.navigation.insert(key, result.clone()).await;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicate::DuplicateDetector;
    use crate::imaging::fixtures;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn setup(dates: &[NaiveDate]) -> (tempfile::TempDir, Arc<StripArchive>, StripReader, ComicDescriptor) {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(StripArchive::new(dir.path(), DuplicateDetector::disabled()));
        let comic = ComicDescriptor::new("Foo", "gocomics", "foo");
        for (i, d) in dates.iter().enumerate() {
            let bytes = fixtures::png(120, 60, move |_, _| (i * 10) as u8);
            archive.store(&comic, *d, &bytes).await.unwrap();
        }
        let cache = Arc::new(NavigationCache::new(&CacheConfig::default()));
        let reader = StripReader::new(archive.clone(), cache);
        (dir, archive, reader, comic)
    }

    #[tokio::test]
    async fn test_no_from_date_picks_boundaries() {
        let (_dir, _archive, reader, comic) = setup(&[date(2020, 1, 1), date(2021, 5, 5)]).await;
        let first = reader.navigate(&comic, Direction::Forward, None).await.unwrap();
        let last = reader.navigate(&comic, Direction::Backward, None).await.unwrap();
        assert_eq!(first.date(), Some(date(2020, 1, 1)));
        assert_eq!(last.date(), Some(date(2021, 5, 5)));
    }

    #[tokio::test]
    async fn test_empty_comic() {
        let (_dir, _archive, reader, comic) = setup(&[]).await;
        let result = reader.navigate(&comic, Direction::Backward, None).await.unwrap();
        assert!(!result.found);
        assert_eq!(result.reason, Some(NavigationReason::NoComicsAvailable));
    }

    #[tokio::test]
    async fn test_end_of_timeline_hints() {
        let (_dir, _archive, reader, comic) = setup(&[date(2020, 1, 1), date(2020, 1, 2)]).await;
        let result = reader.navigate(&comic, Direction::Forward, Some(date(2020, 1, 2))).await.unwrap();
        assert!(!result.found);
        assert_eq!(result.reason, Some(NavigationReason::AtEnd));
        assert_eq!(result.nearest_previous, Some(date(2020, 1, 1)));
        assert_eq!(result.nearest_next, None);

        let result = reader.navigate(&comic, Direction::Backward, Some(date(2020, 1, 1))).await.unwrap();
        assert_eq!(result.reason, Some(NavigationReason::AtBeginning));
        assert_eq!(result.nearest_next, Some(date(2020, 1, 2)));
    }

    #[tokio::test]
    async fn test_read_through_populates_cache() {
        let (_dir, _archive, reader, comic) = setup(&[date(2020, 1, 1), date(2020, 1, 3)]).await;
        let result = reader.navigate(&comic, Direction::Forward, Some(date(2020, 1, 1))).await.unwrap();
        assert_eq!(result.date(), Some(date(2020, 1, 3)));

        let key = NavigationKey { comic_id: comic.id, direction: Direction::Forward, from: Some(date(2020, 1, 1)) };
        assert_eq!(reader.cache().navigation.get(&key).await, Some(result));
        assert!(reader.cache().navigation_dates.get(&(comic.id, Direction::Forward, date(2020, 1, 1))).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_strips_is_per_comic() {
        let (_dir, archive, reader, comic) = setup(&[date(2020, 1, 1)]).await;
        let other = ComicDescriptor::new("Bar", "gocomics", "bar");
        archive.store(&other, date(2020, 1, 1), &fixtures::rising(0)).await.unwrap();

        let stale = reader.navigate(&comic, Direction::Backward, None).await.unwrap();
        reader.navigate(&other, Direction::Backward, None).await.unwrap();

        archive.store(&comic, date(2020, 1, 9), &fixtures::falling()).await.unwrap();
        assert_eq!(reader.navigate(&comic, Direction::Backward, None).await.unwrap(), stale);

        reader.cache().invalidate_strips(comic.id).await;
        let fresh = reader.navigate(&comic, Direction::Backward, None).await.unwrap();
        assert_eq!(fresh.date(), Some(date(2020, 1, 9)));
        assert!(reader.cache().boundary.get(&(other.id, Boundary::Newest)).await.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_sweeps_only_expired_tiers() {
        let mut config = CacheConfig::default();
        config.boundary.ttl_minutes = 0;
        let cache = NavigationCache::new(&config);
        let comic = ComicDescriptor::new("Foo", "gocomics", "foo");

        cache.boundary.insert((comic.id, Boundary::Newest), None).await;
        cache.navigation_dates.insert((comic.id, Direction::Forward, date(2020, 1, 1)), None).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert_eq!(cache.cleanup_expired().await, 1);
        assert_eq!(cache.boundary.stats().await.entries, 0);
        assert_eq!(cache.navigation_dates.stats().await.entries, 1);
    }
}
