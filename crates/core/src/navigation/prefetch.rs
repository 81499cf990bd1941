//! Predictive look-ahead for the read path.
//!
//! After a reader lands on a strip, the next few strips in the same
//! direction are resolved on a spawned task so the navigation cache is warm
//! when the reader gets there. Prefetch stops at the first timeline
//! boundary or error; errors are logged and never reach the caller.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::task::JoinHandle;

use super::Navigator;
use crate::model::{ComicDescriptor, Direction};

#[derive(Clone)]
pub struct Prefetcher {
    navigator: Arc<dyn Navigator>,
    lookahead: usize,
    enabled: bool,
}

impl Prefetcher {
    pub fn new(navigator: Arc<dyn Navigator>, lookahead: usize, enabled: bool) -> Self {
        Self { navigator, lookahead, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.lookahead > 0
    }

    /// Warm up to `lookahead` strips beyond `from` in `direction`.
    ///
    /// Returns the spawned task (resolving to the number of strips
    /// prefetched), or `None` when prefetch is disabled.
    pub fn prefetch(&self, comic: ComicDescriptor, direction: Direction, from: NaiveDate) -> Option<JoinHandle<usize>> {
        if !self.is_enabled() {
            return None;
        }
        let navigator = self.navigator.clone();
        let lookahead = self.lookahead;
        Some(tokio::spawn(async move { run(navigator, comic, direction, from, lookahead).await }))
    }

    /// Prefetch forward and backward from `from` independently.
    pub fn prefetch_bidirectional(&self, comic: ComicDescriptor, from: NaiveDate) -> Vec<JoinHandle<usize>> {
        let forward = self.prefetch(comic.clone(), Direction::Forward, from);
        let backward = self.prefetch(comic, Direction::Backward, from);
        forward.into_iter().chain(backward).collect()
    }
}

async fn run(
    navigator: Arc<dyn Navigator>, comic: ComicDescriptor, direction: Direction, from: NaiveDate, lookahead: usize,
) -> usize {
    let mut cursor = from;
    let mut warmed = 0;

    for _ in 0..lookahead {
        match navigator.navigate(&comic, direction, Some(cursor)).await {
            Ok(result) => match result.date() {
                Some(date) if result.found => {
                    cursor = date;
                    warmed += 1;
                }
                _ => break,
            },
            Err(e) => {
                tracing::warn!(comic = %comic.name, ?direction, %cursor, "prefetch stopped: {e}");
                break;
            }
        }
    }

    tracing::debug!(comic = %comic.name, ?direction, %from, warmed, "prefetch finished");
    warmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::model::{NavigationReason, NavigationResult, StripRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Timeline of consecutive days; fails when asked past `fail_after`.
    struct FakeNavigator {
        last: NaiveDate,
        fail_after: Option<NaiveDate>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Navigator for FakeNavigator {
        async fn navigate(
            &self, comic: &ComicDescriptor, direction: Direction, from: Option<NaiveDate>,
        ) -> Result<NavigationResult, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let from = from.unwrap_or(self.last);
            if let Some(limit) = self.fail_after
                && from >= limit
            {
                return Err(Error::Storage("disk gone".into()));
            }
            let next = match direction {
                Direction::Forward => from.succ_opt().filter(|d| *d <= self.last),
                Direction::Backward => from.pred_opt(),
            };
            Ok(match next {
                Some(date) => NavigationResult::found(StripRecord { comic_id: comic.id, date, path: "x".into() }),
                None => NavigationResult::not_found(NavigationReason::AtEnd, Some(from)),
            })
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn comic() -> ComicDescriptor {
        ComicDescriptor::new("Foo", "gocomics", "foo")
    }

    #[tokio::test]
    async fn test_prefetch_full_lookahead() {
        let nav = Arc::new(FakeNavigator { last: date(20), fail_after: None, calls: AtomicUsize::new(0) });
        let prefetcher = Prefetcher::new(nav.clone(), 3, true);
        let warmed = prefetcher.prefetch(comic(), Direction::Forward, date(1)).unwrap().await.unwrap();
        assert_eq!(warmed, 3);
        assert_eq!(nav.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_prefetch_stops_at_boundary() {
        let nav = Arc::new(FakeNavigator { last: date(3), fail_after: None, calls: AtomicUsize::new(0) });
        let prefetcher = Prefetcher::new(nav.clone(), 5, true);
        let warmed = prefetcher.prefetch(comic(), Direction::Forward, date(1)).unwrap().await.unwrap();
        assert_eq!(warmed, 2);
        assert_eq!(nav.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_prefetch_swallows_errors() {
        let nav = Arc::new(FakeNavigator { last: date(20), fail_after: Some(date(2)), calls: AtomicUsize::new(0) });
        let prefetcher = Prefetcher::new(nav.clone(), 5, true);
        let warmed = prefetcher.prefetch(comic(), Direction::Forward, date(1)).unwrap().await.unwrap();
        assert_eq!(warmed, 1);
        assert_eq!(nav.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_prefetch_spawns_nothing() {
        let nav = Arc::new(FakeNavigator { last: date(20), fail_after: None, calls: AtomicUsize::new(0) });
        assert!(Prefetcher::new(nav.clone(), 3, false).prefetch(comic(), Direction::Forward, date(1)).is_none());
        assert!(Prefetcher::new(nav, 0, true).prefetch(comic(), Direction::Forward, date(1)).is_none());
    }

    #[tokio::test]
    async fn test_bidirectional() {
        let nav = Arc::new(FakeNavigator { last: date(20), fail_after: None, calls: AtomicUsize::new(0) });
        let prefetcher = Prefetcher::new(nav.clone(), 2, true);
        let handles = prefetcher.prefetch_bidirectional(comic(), date(10));
        assert_eq!(handles.len(), 2);
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 2);
        }
    }
}
