//! Year backfill: fill gaps behind the newest strip.
//!
//! The forward update walk never looks behind the newest archived strip, so
//! a strip missed on its day (outage, late upload) stays missing. A backfill
//! scans one calendar year backwards, from its last day or the source's
//! latest date, whichever is earlier. Every publication day without an
//! archived strip is fetched and stored exactly like an update-cycle date.
//!
//! A comic's scan stops after `max_consecutive_failures` unavailable dates
//! in a row, which usually means the strip did not run that far back. It
//! also stops after `max_per_run` download attempts, or on the first failure
//! other than `COMIC_UNAVAILABLE`.

use chrono::{Datelike, NaiveDate};
use strips_core::model::ComicId;

use super::ComicManagementFacade;
use super::update::{Attempt, BatchReport, CycleState, UpdateReport};
use crate::FacadeError;

impl ComicManagementFacade {
    /// Backfill every enabled comic for the configured target year, or the
    /// current year when none is configured.
    pub async fn backfill_all_comics(&self) -> BatchReport {
        let year = self.backfill.target_year.unwrap_or_else(|| self.clock.today().year());
        self.run_batch("backfill", |id| self.backfill_comic(id, year)).await
    }

    /// Fetch the strips missing from `year` for one comic.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a year outside the calendar range,
    /// `ComicNotFound` for an unknown id and storage or source errors that
    /// prevent the scan from starting.
    pub async fn backfill_comic(&self, id: ComicId, year: i32) -> Result<UpdateReport, FacadeError> {
        let bounds = (NaiveDate::from_ymd_opt(year, 1, 1), NaiveDate::from_ymd_opt(year, 12, 31));
        let (Some(year_start), Some(year_end)) = bounds else {
            return Err(FacadeError::InvalidInput(format!("year {year} is out of range")));
        };

        let _guard = self.lock_comic(id).await;
        let comic = self.require_comic(id).await?;
        let mut report = UpdateReport::new(&comic);

        if !comic.enabled {
            report.transition(CycleState::Done);
            return Ok(report);
        }

        let downloader = self.downloaders.downloader_for(&comic)?;
        let latest = downloader.latest_available_date(self.clock.as_ref());
        let recorded = self.recorded_dates(&comic).await;
        let max_misses = self.backfill.max_consecutive_failures;

        tracing::info!(comic = %comic.name, year, from = %year_end.min(latest), "backfill started");

        let mut date = year_end.min(latest);
        let mut misses = 0;
        while date >= year_start {
            if comic.publishes_on(date) {
                if self.archive.find_on(&comic, date).await?.is_some() {
                    misses = 0;
                } else if recorded.fetched.contains(&date) {
                    misses = 0;
                    report.skipped.push(date);
                } else if date != latest && recorded.unavailable.contains(&date) {
                    misses += 1;
                    report.skipped.push(date);
                } else if report.attempts >= self.backfill.max_per_run {
                    tracing::info!(comic = %comic.name, %date, attempts = report.attempts, "backfill limit reached");
                    break;
                } else {
                    match self.attempt(&comic, &downloader, date, &mut report).await {
                        Attempt::Stored | Attempt::Duplicate => misses = 0,
                        Attempt::Unavailable => misses += 1,
                        Attempt::Failed => break,
                    }
                    report.transition(CycleState::Advanced);
                }

                if misses >= max_misses {
                    tracing::info!(
                        comic = %comic.name,
                        %date,
                        misses,
                        "stopping backfill, comic likely did not run this far back"
                    );
                    break;
                }
            }

            let Some(previous) = date.pred_opt() else { break };
            date = previous;
        }

        if !report.is_failed() {
            report.transition(CycleState::Done);
        }
        self.extend_bounds(&comic, &report.stored).await?;

        tracing::info!(
            comic = %comic.name,
            year,
            state = ?report.state,
            stored = report.stored.len(),
            unavailable = report.unavailable.len(),
            "backfill finished"
        );
        Ok(report)
    }
}
