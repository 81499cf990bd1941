//! Retrieval outcome tracking.
//!
//! Every fetch attempt leaves exactly one [`RetrievalRecord`] per
//! comic/date. Queries are bounded by a rolling retention window because
//! older records may already be purged.

use std::sync::Arc;

use chrono::{Days, NaiveDate};

use crate::Error;
use crate::clock::Clock;
use crate::model::{RetrievalFilter, RetrievalRecord, RetrievalSummary};
use crate::store::StateDb;

pub struct RetrievalStatusTracker {
    db: StateDb,
    clock: Arc<dyn Clock>,
    retention_days: u32,
}

impl RetrievalStatusTracker {
    pub fn new(db: StateDb, clock: Arc<dyn Clock>, retention_days: u32) -> Self {
        Self { db, clock, retention_days }
    }

    /// Oldest comic date still inside the retention window.
    pub fn retention_floor(&self) -> NaiveDate {
        let today = self.clock.today();
        today.checked_sub_days(Days::new(u64::from(self.retention_days))).unwrap_or(today)
    }

    /// Record an outcome, replacing any earlier record with the same id.
    pub async fn record(&self, record: &RetrievalRecord) -> Result<(), Error> {
        if record.status.is_failure() {
            tracing::debug!(
                id = %record.id,
                status = %record.status,
                error = record.error_message.as_deref().unwrap_or(""),
                "recording failed retrieval"
            );
        }
        self.db.upsert_retrieval_record(record).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<RetrievalRecord>, Error> {
        self.db.get_retrieval_record(id).await
    }

    /// Filtered records, newest first, clamped to the retention window.
    pub async fn query(&self, filter: &RetrievalFilter) -> Result<Vec<RetrievalRecord>, Error> {
        let floor = self.retention_floor();
        let mut filter = filter.clone();
        filter.from = Some(filter.from.map_or(floor, |from| from.max(floor)));
        self.db.query_retrieval_records(&filter).await
    }

    /// Summary over records with comic dates in `[from, to]`.
    pub async fn summarize(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<RetrievalSummary, Error> {
        let records = self.query(&RetrievalFilter { from, to, ..Default::default() }).await?;
        Ok(RetrievalSummary::from_records(&records))
    }

    /// Delete records older than `days_to_keep` days. Returns how many.
    pub async fn purge_older_than(&self, days_to_keep: u32) -> Result<u64, Error> {
        let today = self.clock.today();
        let cutoff = today.checked_sub_days(Days::new(u64::from(days_to_keep))).unwrap_or(today);
        let purged = self.db.purge_retrieval_records_before(cutoff).await?;
        tracing::info!(%cutoff, purged, "purged retrieval records");
        Ok(purged)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, Error> {
        self.db.delete_retrieval_record(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::RetrievalStatus;
    use chrono::{DateTime, Utc};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn ts() -> DateTime<Utc> {
        "2024-06-10T12:00:00Z".parse().unwrap()
    }

    async fn tracker(today: NaiveDate, retention_days: u32) -> RetrievalStatusTracker {
        let db = StateDb::open_in_memory().await.unwrap();
        let clock = Arc::new(FixedClock::at_local_noon(today, chrono_tz::America::New_York));
        RetrievalStatusTracker::new(db, clock, retention_days)
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let tracker = tracker(date(6, 10), 30).await;
        let record = RetrievalRecord::success("Foo", date(6, 9), "gocomics", 10, 10, ts());
        tracker.record(&record).await.unwrap();
        tracker.record(&record).await.unwrap();

        let all = tracker.query(&RetrievalFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(tracker.get("Foo_2024-06-09").await.unwrap().unwrap().id, record.id);
    }

    #[tokio::test]
    async fn test_query_clamped_to_retention() {
        let tracker = tracker(date(6, 10), 7).await;
        tracker.record(&RetrievalRecord::success("Foo", date(6, 1), "gocomics", 10, 10, ts())).await.unwrap();
        tracker.record(&RetrievalRecord::success("Foo", date(6, 8), "gocomics", 10, 10, ts())).await.unwrap();

        let records = tracker
            .query(&RetrievalFilter { from: Some(date(1, 1)), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].comic_date, date(6, 8));
    }

    #[tokio::test]
    async fn test_summarize_empty() {
        let tracker = tracker(date(6, 10), 7).await;
        let summary = tracker.summarize(None, None).await.unwrap();
        assert_eq!(summary.total_count, 0);
        assert_eq!(summary.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_summarize_uses_filtered_set() {
        let tracker = tracker(date(6, 10), 30).await;
        tracker.record(&RetrievalRecord::success("Foo", date(6, 1), "gocomics", 10, 10, ts())).await.unwrap();
        let failed = RetrievalRecord::failure("Foo", date(6, 5), "gocomics", RetrievalStatus::NetworkError, "x", 1, ts());
        tracker.record(&failed).await.unwrap();

        let summary = tracker.summarize(Some(date(6, 4)), Some(date(6, 6))).await.unwrap();
        assert_eq!(summary.total_count, 1);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.error_counts.get(&RetrievalStatus::NetworkError), Some(&1));
    }

    #[tokio::test]
    async fn test_purge_and_delete() {
        let tracker = tracker(date(6, 10), 30).await;
        tracker.record(&RetrievalRecord::success("Foo", date(5, 1), "gocomics", 10, 10, ts())).await.unwrap();
        tracker.record(&RetrievalRecord::success("Foo", date(6, 9), "gocomics", 10, 10, ts())).await.unwrap();

        assert_eq!(tracker.purge_older_than(7).await.unwrap(), 1);
        assert!(tracker.delete("Foo_2024-06-09").await.unwrap());
        assert!(!tracker.delete("Foo_2024-06-09").await.unwrap());
    }
}
