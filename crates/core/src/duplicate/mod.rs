//! Duplicate detection for re-posted strips.
//!
//! Sources occasionally publish an old strip again under a new date. Before
//! a strip is archived its fingerprint is compared against the most recent
//! strips already stored in the same comic/year bucket:
//!
//! - perceptual modes (`dhash`, `ahash`) treat a Hamming distance at or
//!   below the threshold as a duplicate and only look at the newest
//!   `window` strips
//! - exact mode (`sha256`) matches byte-identical payloads only and looks
//!   at the whole year

pub mod hash;

use std::sync::Arc;

use chrono::NaiveDate;

pub use hash::{AverageHasher, ContentHasher, DifferenceHasher, Fingerprint, ImageHasher, hasher_for};

use crate::Error;
use crate::config::{DuplicateConfig, HashAlgorithm};

/// Tunable duplicate policy.
#[derive(Clone)]
pub struct DuplicateDetector {
    hasher: Arc<dyn ImageHasher>,
    threshold: u32,
    window: usize,
    enabled: bool,
}

impl std::fmt::Debug for DuplicateDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateDetector")
            .field("algorithm", &self.hasher.algorithm())
            .field("threshold", &self.threshold)
            .field("window", &self.window)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl DuplicateDetector {
    pub fn new(hasher: Arc<dyn ImageHasher>, threshold: u32, window: usize) -> Self {
        Self { hasher, threshold, window, enabled: true }
    }

    pub fn from_config(config: &DuplicateConfig) -> Self {
        Self {
            hasher: Arc::from(hasher_for(config.algorithm)),
            threshold: config.threshold,
            window: config.window,
            enabled: config.enabled,
        }
    }

    /// Detector that never reports a duplicate.
    pub fn disabled() -> Self {
        Self { hasher: Arc::new(ContentHasher), threshold: 0, window: 0, enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_exact(&self) -> bool {
        self.hasher.algorithm() == HashAlgorithm::Sha256
    }

    /// How many of the newest strips in a year bucket are compared.
    pub fn window(&self) -> usize {
        if !self.enabled {
            0
        } else if self.is_exact() {
            usize::MAX
        } else {
            self.window
        }
    }

    pub fn fingerprint(&self, bytes: &[u8]) -> Result<Fingerprint, Error> {
        self.hasher.fingerprint(bytes)
    }

    /// Whether two fingerprints are close enough to be the same strip.
    pub fn matches(&self, a: &Fingerprint, b: &Fingerprint) -> bool {
        let threshold = if self.is_exact() { 0 } else { self.threshold };
        matches!(a.distance(b), Some(d) if d <= threshold)
    }

    /// Date of the first existing strip `candidate` duplicates.
    ///
    /// `existing` is ordered newest first; only the first [`Self::window`]
    /// entries are considered.
    pub fn find_duplicate(&self, candidate: &Fingerprint, existing: &[(NaiveDate, Fingerprint)]) -> Option<NaiveDate> {
        if !self.enabled {
            return None;
        }
        existing
            .iter()
            .take(self.window())
            .find(|(_, fp)| self.matches(candidate, fp))
            .map(|(date, _)| *date)
    }

    /// Whether `candidate` duplicates any of `existing` (newest first).
    ///
    /// Existing images that fail to fingerprint are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidImage` if the candidate cannot be fingerprinted.
    pub fn is_duplicate(&self, candidate: &[u8], existing: &[&[u8]]) -> Result<bool, Error> {
        if !self.enabled {
            return Ok(false);
        }
        let candidate = self.fingerprint(candidate)?;
        Ok(existing
            .iter()
            .take(self.window())
            .filter_map(|bytes| self.fingerprint(bytes).ok())
            .any(|fp| self.matches(&candidate, &fp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::fixtures;

    fn perceptual() -> DuplicateDetector {
        DuplicateDetector::new(Arc::new(DifferenceHasher), 5, 30)
    }

    fn exact() -> DuplicateDetector {
        DuplicateDetector::from_config(&DuplicateConfig { algorithm: HashAlgorithm::Sha256, ..Default::default() })
    }

    #[test]
    fn test_near_identical_repost_is_duplicate() {
        let detector = perceptual();
        let existing = [fixtures::bands(), fixtures::rising(0)];
        let existing: Vec<&[u8]> = existing.iter().map(Vec::as_slice).collect();
        assert!(detector.is_duplicate(&fixtures::rising(10), &existing).unwrap());
    }

    #[test]
    fn test_different_strip_is_not_duplicate() {
        let detector = perceptual();
        let existing = [fixtures::rising(0)];
        let existing: Vec<&[u8]> = existing.iter().map(Vec::as_slice).collect();
        assert!(!detector.is_duplicate(&fixtures::falling(), &existing).unwrap());
    }

    #[test]
    fn test_exact_mode_has_no_tolerance() {
        let detector = exact();
        let existing = [fixtures::rising(0)];
        let existing: Vec<&[u8]> = existing.iter().map(Vec::as_slice).collect();
        assert!(!detector.is_duplicate(&fixtures::rising(10), &existing).unwrap());
        assert!(detector.is_duplicate(&fixtures::rising(0), &existing).unwrap());
        assert_eq!(detector.window(), usize::MAX);
    }

    #[test]
    fn test_window_limits_comparison() {
        let detector = DuplicateDetector::new(Arc::new(DifferenceHasher), 0, 1);
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let existing = vec![(d(2), Fingerprint::Perceptual(0xff)), (d(1), Fingerprint::Perceptual(0))];
        assert_eq!(detector.find_duplicate(&Fingerprint::Perceptual(0), &existing), None);
        assert_eq!(detector.find_duplicate(&Fingerprint::Perceptual(0xff), &existing), Some(d(2)));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let detector = DuplicateDetector::new(Arc::new(DifferenceHasher), 2, 30);
        assert!(detector.matches(&Fingerprint::Perceptual(0), &Fingerprint::Perceptual(0b11)));
        assert!(!detector.matches(&Fingerprint::Perceptual(0), &Fingerprint::Perceptual(0b111)));
    }

    #[test]
    fn test_disabled_never_matches() {
        let detector = DuplicateDetector::disabled();
        let existing = [fixtures::rising(0)];
        let existing: Vec<&[u8]> = existing.iter().map(Vec::as_slice).collect();
        assert!(!detector.is_duplicate(&fixtures::rising(0), &existing).unwrap());
    }
}
