//! Stored strips and navigation results.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ComicId;

/// Direction of travel along a comic's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// A strip image persisted in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripRecord {
    pub comic_id: ComicId,
    pub date: NaiveDate,
    pub path: PathBuf,
}

/// Why a navigation request found nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavigationReason {
    /// Requested a strip after the newest one.
    AtEnd,
    /// Requested a strip before the oldest one.
    AtBeginning,
    /// The comic has nothing archived.
    NoComicsAvailable,
}

/// Result of a read-path navigation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationResult {
    pub found: bool,
    pub strip: Option<StripRecord>,
    pub reason: Option<NavigationReason>,
    pub requested_date: Option<NaiveDate>,
    /// Closest archived date before the request, for boundary hints.
    pub nearest_previous: Option<NaiveDate>,
    /// Closest archived date after the request, for boundary hints.
    pub nearest_next: Option<NaiveDate>,
}

impl NavigationResult {
    pub fn found(strip: StripRecord) -> Self {
        Self {
            found: true,
            strip: Some(strip),
            reason: None,
            requested_date: None,
            nearest_previous: None,
            nearest_next: None,
        }
    }

    pub fn not_found(reason: NavigationReason, requested_date: Option<NaiveDate>) -> Self {
        Self {
            found: false,
            strip: None,
            reason: Some(reason),
            requested_date,
            nearest_previous: None,
            nearest_next: None,
        }
    }

    pub fn with_hints(mut self, nearest_previous: Option<NaiveDate>, nearest_next: Option<NaiveDate>) -> Self {
        self.nearest_previous = nearest_previous;
        self.nearest_next = nearest_next;
        self
    }

    /// Date of the strip this result points at, if any.
    pub fn date(&self) -> Option<NaiveDate> {
        self.strip.as_ref().map(|s| s.date)
    }
}
