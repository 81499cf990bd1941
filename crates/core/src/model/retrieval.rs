//! Retrieval outcome records and the failure taxonomy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Outcome classification for a single fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetrievalStatus {
    Success,
    /// Transient infrastructure failure; retried by the next cycle.
    NetworkError,
    /// Scraper could not make sense of the page; likely a source format change.
    ParsingError,
    /// No strip exists for the requested date; that date is not retried.
    ComicUnavailable,
    AuthenticationError,
    StorageError,
    UnknownError,
}

impl RetrievalStatus {
    pub const ALL: [RetrievalStatus; 7] = [
        RetrievalStatus::Success,
        RetrievalStatus::NetworkError,
        RetrievalStatus::ParsingError,
        RetrievalStatus::ComicUnavailable,
        RetrievalStatus::AuthenticationError,
        RetrievalStatus::StorageError,
        RetrievalStatus::UnknownError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStatus::Success => "SUCCESS",
            RetrievalStatus::NetworkError => "NETWORK_ERROR",
            RetrievalStatus::ParsingError => "PARSING_ERROR",
            RetrievalStatus::ComicUnavailable => "COMIC_UNAVAILABLE",
            RetrievalStatus::AuthenticationError => "AUTHENTICATION_ERROR",
            RetrievalStatus::StorageError => "STORAGE_ERROR",
            RetrievalStatus::UnknownError => "UNKNOWN_ERROR",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, RetrievalStatus::Success)
    }
}

impl fmt::Display for RetrievalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RetrievalStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown retrieval status: {s}"))
    }
}

/// Deterministic record id for a comic/date pair.
pub fn record_id(comic_name: &str, comic_date: NaiveDate) -> String {
    format!("{comic_name}_{}", comic_date.format("%Y-%m-%d"))
}

/// Outcome of one fetch attempt for one comic on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRecord {
    pub id: String,
    pub comic_name: String,
    pub comic_date: NaiveDate,
    pub source: String,
    pub status: RetrievalStatus,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub image_size: Option<u64>,
    pub http_status_code: Option<u16>,
    pub recorded_at: DateTime<Utc>,
}

impl RetrievalRecord {
    /// A successful retrieval. Never carries an error message.
    ///
    /// `recorded_at` comes from the caller's clock.
    pub fn success(
        comic_name: &str, comic_date: NaiveDate, source: &str, duration_ms: u64, image_size: u64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: record_id(comic_name, comic_date),
            comic_name: comic_name.to_string(),
            comic_date,
            source: source.to_string(),
            status: RetrievalStatus::Success,
            error_message: None,
            duration_ms,
            image_size: Some(image_size),
            http_status_code: None,
            recorded_at,
        }
    }

    /// A failed retrieval.
    ///
    /// Passing [`RetrievalStatus::Success`] is coerced to `UnknownError` so a
    /// record can never be both successful and carry an error message.
    pub fn failure(
        comic_name: &str, comic_date: NaiveDate, source: &str, status: RetrievalStatus, error_message: impl Into<String>,
        duration_ms: u64, recorded_at: DateTime<Utc>,
    ) -> Self {
        let status = if status.is_failure() { status } else { RetrievalStatus::UnknownError };
        Self {
            id: record_id(comic_name, comic_date),
            comic_name: comic_name.to_string(),
            comic_date,
            source: source.to_string(),
            status,
            error_message: Some(error_message.into()),
            duration_ms,
            image_size: None,
            http_status_code: None,
            recorded_at,
        }
    }

    pub fn with_http_status(mut self, code: Option<u16>) -> Self {
        self.http_status_code = code;
        self
    }
}

/// Optional, combinable filters for retrieval record queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalFilter {
    pub comic_name: Option<String>,
    pub status: Option<RetrievalStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<usize>,
}

/// Aggregate statistics over a filtered set of retrieval records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSummary {
    pub counts_by_status: BTreeMap<RetrievalStatus, u64>,
    pub total_count: u64,
    /// Percentage of successful records, 0 when the set is empty.
    pub success_rate: f64,
    pub average_success_duration_ms: f64,
    pub error_counts: BTreeMap<RetrievalStatus, u64>,
    pub failures_by_comic: BTreeMap<String, u64>,
}

impl RetrievalSummary {
    /// Compute the summary from an already-filtered record set.
    pub fn from_records(records: &[RetrievalRecord]) -> Self {
        let mut summary = RetrievalSummary { total_count: records.len() as u64, ..Default::default() };

        let mut success_duration_total = 0u64;
        for record in records {
            *summary.counts_by_status.entry(record.status).or_insert(0) += 1;
            if record.status.is_failure() {
                *summary.error_counts.entry(record.status).or_insert(0) += 1;
                *summary.failures_by_comic.entry(record.comic_name.clone()).or_insert(0) += 1;
            } else {
                success_duration_total += record.duration_ms;
            }
        }

        let successes = summary.counts_by_status.get(&RetrievalStatus::Success).copied().unwrap_or(0);
        if summary.total_count > 0 {
            summary.success_rate = successes as f64 * 100.0 / summary.total_count as f64;
        }
        if successes > 0 {
            summary.average_success_duration_ms = success_duration_total as f64 / successes as f64;
        }

        summary
    }
}
