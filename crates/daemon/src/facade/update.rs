//! The per-comic update cycle.
//!
//! ```text
//! PENDING -> FETCHING -> (DUPLICATE_SKIPPED | STORED) -> ADVANCED -> ... -> DONE
//!               \-> FAILED(kind)
//! ```
//!
//! The walk starts the day after the newest archived strip (or at the
//! comic's start date) and stops at the source's latest available date.
//! Dates with a recorded outcome inside the retention window are not
//! requested again: fetched dates (stored or duplicate) never, unavailable
//! dates unless they are the latest date. `COMIC_UNAVAILABLE` is recorded
//! and the walk moves on; any other download or store failure is recorded
//! and ends this comic's cycle. A failing comic never affects the others in
//! a batch.

use std::collections::HashSet;
use std::future::Future;
use std::time::Instant;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use strips_client::source::SharedDownloader;
use strips_core::model::{ComicDescriptor, ComicId, RetrievalFilter, RetrievalRecord, RetrievalStatus};

use super::ComicManagementFacade;
use crate::FacadeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleState {
    Pending,
    Fetching,
    DuplicateSkipped,
    Stored,
    Advanced,
    Done,
    Failed(RetrievalStatus),
}

/// Outcome of one comic's update cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub comic_id: ComicId,
    pub comic_name: String,
    pub state: CycleState,
    pub stored: Vec<NaiveDate>,
    pub duplicates: Vec<NaiveDate>,
    pub unavailable: Vec<NaiveDate>,
    /// Dates passed over without a request because an outcome is already
    /// recorded for them, plus non-publication days of a forward walk.
    pub skipped: Vec<NaiveDate>,
    pub attempts: usize,
}

impl UpdateReport {
    pub(super) fn new(comic: &ComicDescriptor) -> Self {
        Self {
            comic_id: comic.id,
            comic_name: comic.name.clone(),
            state: CycleState::Pending,
            stored: Vec::new(),
            duplicates: Vec::new(),
            unavailable: Vec::new(),
            skipped: Vec::new(),
            attempts: 0,
        }
    }

    pub(super) fn transition(&mut self, next: CycleState) {
        tracing::trace!(comic = %self.comic_name, from = ?self.state, to = ?next, "cycle transition");
        self.state = next;
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, CycleState::Failed(_))
    }
}

/// A comic whose cycle could not run at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleError {
    pub comic_id: ComicId,
    pub status: RetrievalStatus,
    pub message: String,
}

/// Outcome of a batch over every enabled comic.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub reports: Vec<UpdateReport>,
    /// Comics whose cycle could not start (unknown source, storage fault).
    pub errors: Vec<CycleError>,
}

impl BatchReport {
    pub fn stored_count(&self) -> usize {
        self.reports.iter().map(|r| r.stored.len()).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.reports.iter().filter(|r| r.is_failed()).count() + self.errors.len()
    }
}

/// How one date's fetch and store ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Attempt {
    Stored,
    Duplicate,
    Unavailable,
    Failed,
}

/// Dates with an outcome already recorded inside the retention window.
#[derive(Debug, Default)]
pub(super) struct RecordedDates {
    pub fetched: HashSet<NaiveDate>,
    pub unavailable: HashSet<NaiveDate>,
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

impl ComicManagementFacade {
    /// Update every enabled comic, at most `update_concurrency` at a time.
    ///
    /// Expired read-path cache entries are swept once the batch is done.
    pub async fn update_all_comics(&self) -> BatchReport {
        let batch = self.run_batch("update", |id| self.update_comic(id)).await;
        let swept = self.cache.cleanup_expired().await;
        tracing::debug!(swept, "expired cache entries dropped");
        batch
    }

    /// Run `cycle` for every enabled comic on the bounded pool.
    pub(super) async fn run_batch<F, Fut>(&self, kind: &'static str, cycle: F) -> BatchReport
    where
        F: Fn(ComicId) -> Fut,
        Fut: Future<Output = Result<UpdateReport, FacadeError>>,
    {
        let ids: Vec<ComicId> = self.get_all_comics().await.iter().filter(|c| c.enabled).map(|c| c.id).collect();
        tracing::info!(kind, comics = ids.len(), concurrency = self.update_concurrency, "batch started");

        let cycles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let run = cycle(id);
                async move { (id, run.await) }
            })
            .collect();
        let results: Vec<(ComicId, Result<UpdateReport, FacadeError>)> =
            stream::iter(cycles).buffer_unordered(self.update_concurrency).collect().await;

        let mut batch = BatchReport::default();
        for (comic_id, result) in results {
            match result {
                Ok(report) => batch.reports.push(report),
                Err(e) => {
                    let status = e.status();
                    tracing::warn!(kind, comic_id, %status, "comic cycle did not run: {e}");
                    batch.errors.push(CycleError { comic_id, status, message: e.to_string() });
                }
            }
        }
        batch.reports.sort_by(|a, b| a.comic_name.cmp(&b.comic_name));

        tracing::info!(
            kind,
            comics = batch.reports.len(),
            stored = batch.stored_count(),
            failed = batch.failed_count(),
            "batch finished"
        );
        batch
    }

    /// Run one comic's update cycle up to the source's latest date.
    pub async fn update_comic(&self, id: ComicId) -> Result<UpdateReport, FacadeError> {
        let _guard = self.lock_comic(id).await;
        let comic = self.require_comic(id).await?;
        let mut report = UpdateReport::new(&comic);

        if !comic.enabled {
            report.transition(CycleState::Done);
            return Ok(report);
        }

        let downloader = self.downloaders.downloader_for(&comic)?;
        let latest = downloader.latest_available_date(self.clock.as_ref());
        let archived_newest = self.archive.find_last(&comic).await?.map(|s| s.date);
        let mut next = match archived_newest.max(comic.newest_date) {
            Some(newest) => downloader.advance(&comic, newest),
            None => Some(comic.oldest_date.unwrap_or(latest).min(latest)),
        };
        let recorded = self.recorded_dates(&comic).await;

        tracing::info!(comic = %comic.name, start = ?next, %latest, "update cycle started");

        while let Some(date) = next.filter(|d| *d <= latest) {
            let known_unavailable = date != latest && recorded.unavailable.contains(&date);
            if !comic.publishes_on(date) || known_unavailable || recorded.fetched.contains(&date) {
                report.skipped.push(date);
                next = downloader.advance(&comic, date);
                continue;
            }

            if self.attempt(&comic, &downloader, date, &mut report).await == Attempt::Failed {
                break;
            }
            report.transition(CycleState::Advanced);
            next = downloader.advance(&comic, date);
        }

        if !report.is_failed() {
            report.transition(CycleState::Done);
        }
        self.extend_bounds(&comic, &report.stored).await?;

        if !comic.avatar_available {
            self.refresh_profile(&comic, &downloader).await;
        }

        tracing::info!(
            comic = %comic.name,
            state = ?report.state,
            stored = report.stored.len(),
            duplicates = report.duplicates.len(),
            unavailable = report.unavailable.len(),
            "update cycle finished"
        );
        Ok(report)
    }

    /// Fetch and store one date, recording the outcome.
    pub(super) async fn attempt(
        &self, comic: &ComicDescriptor, downloader: &SharedDownloader, date: NaiveDate, report: &mut UpdateReport,
    ) -> Attempt {
        report.transition(CycleState::Fetching);
        report.attempts += 1;
        let started = Instant::now();

        let strip = match downloader.fetch(comic, date).await {
            Ok(strip) => strip,
            Err(e) => {
                let record = RetrievalRecord::failure(
                    &comic.name,
                    date,
                    &comic.source,
                    e.status(),
                    e.to_string(),
                    elapsed_ms(started),
                    self.clock.now(),
                )
                .with_http_status(e.http_status());

                if e.status() == RetrievalStatus::ComicUnavailable {
                    tracing::info!(comic = %comic.name, %date, "strip unavailable: {e}");
                    self.record(&record).await;
                    report.unavailable.push(date);
                    return Attempt::Unavailable;
                }
                self.fail(&record, report).await;
                return Attempt::Failed;
            }
        };

        match self.archive.store(comic, date, &strip.bytes).await {
            Ok(outcome) => {
                let record = RetrievalRecord::success(
                    &comic.name,
                    date,
                    &comic.source,
                    elapsed_ms(started),
                    strip.bytes.len() as u64,
                    self.clock.now(),
                )
                .with_http_status(Some(strip.http_status));
                self.record(&record).await;

                if outcome.is_duplicate() {
                    report.transition(CycleState::DuplicateSkipped);
                    report.duplicates.push(date);
                    Attempt::Duplicate
                } else {
                    report.transition(CycleState::Stored);
                    report.stored.push(date);
                    self.cache.invalidate_strips(comic.id).await;
                    Attempt::Stored
                }
            }
            Err(e) => {
                let record = RetrievalRecord::failure(
                    &comic.name,
                    date,
                    &comic.source,
                    e.status(),
                    e.to_string(),
                    elapsed_ms(started),
                    self.clock.now(),
                );
                self.fail(&record, report).await;
                Attempt::Failed
            }
        }
    }

    /// Widen the catalog's date bounds to cover newly stored dates.
    pub(super) async fn extend_bounds(&self, comic: &ComicDescriptor, stored: &[NaiveDate]) -> Result<(), FacadeError> {
        let (Some(first), Some(last)) = (stored.iter().min().copied(), stored.iter().max().copied()) else {
            return Ok(());
        };
        let oldest = Some(comic.oldest_date.map_or(first, |o| o.min(first)));
        let newest = Some(comic.newest_date.map_or(last, |n| n.max(last)));
        self.record_bounds(comic.id, oldest, newest).await
    }

    /// Record a failure that ends the cycle.
    async fn fail(&self, record: &RetrievalRecord, report: &mut UpdateReport) {
        let message = record.error_message.as_deref().unwrap_or_default();
        let (comic, date, status) = (&record.comic_name, record.comic_date, record.status);
        if status == RetrievalStatus::ParsingError {
            tracing::error!(%comic, %date, "strip could not be parsed, source format may have changed: {message}");
        } else {
            tracing::warn!(%comic, %date, %status, "strip retrieval failed: {message}");
        }
        self.record(record).await;
        report.transition(CycleState::Failed(status));
    }

    async fn record(&self, record: &RetrievalRecord) {
        if let Err(e) = self.retrievals.record(record).await {
            tracing::warn!(id = %record.id, "could not record retrieval outcome: {e}");
        }
    }

    /// Dates already fetched or answered with `COMIC_UNAVAILABLE`.
    pub(super) async fn recorded_dates(&self, comic: &ComicDescriptor) -> RecordedDates {
        let filter = RetrievalFilter { comic_name: Some(comic.name.clone()), ..Default::default() };
        let records = match self.retrievals.query(&filter).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(comic = %comic.name, "could not load recorded outcomes: {e}");
                return RecordedDates::default();
            }
        };

        let mut recorded = RecordedDates::default();
        for record in records {
            match record.status {
                RetrievalStatus::Success => {
                    recorded.fetched.insert(record.comic_date);
                }
                RetrievalStatus::ComicUnavailable => {
                    recorded.unavailable.insert(record.comic_date);
                }
                _ => {}
            }
        }
        recorded
    }

    /// Scrape avatar, author and description once for comics lacking them.
    async fn refresh_profile(&self, comic: &ComicDescriptor, downloader: &SharedDownloader) {
        let profile = match downloader.fetch_profile(comic).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(comic = %comic.name, "profile fetch failed: {e}");
                return;
            }
        };

        let avatar_stored = match &profile.avatar {
            Some(bytes) => match self.archive.store_avatar(comic, bytes).await {
                Ok(path) => {
                    tracing::debug!(comic = %comic.name, path = %path.display(), "avatar stored");
                    true
                }
                Err(e) => {
                    tracing::warn!(comic = %comic.name, "avatar rejected: {e}");
                    false
                }
            },
            None => false,
        };

        if !avatar_stored && profile.author.is_none() && profile.description.is_none() {
            return;
        }

        let result = self
            .mutate_catalog(|catalog| {
                if let Some(entry) = catalog.get_mut(&comic.id) {
                    entry.avatar_available |= avatar_stored;
                    if entry.author.is_none() {
                        entry.author = profile.author;
                    }
                    if entry.description.is_none() {
                        entry.description = profile.description;
                    }
                }
                Ok(())
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(comic = %comic.name, "could not save profile: {e}");
        }
    }
}
