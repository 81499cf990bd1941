//! Comic catalog entries and bootstrap seeds.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Stable comic identifier derived from the comic's name.
pub type ComicId = i32;

/// Derive the stable identifier for a comic name.
///
/// Uses the 31-multiplier polynomial over UTF-16 code units with wrapping
/// 32-bit arithmetic, so ids stay identical across restarts and across
/// catalogs written by earlier deployments.
pub fn comic_id(name: &str) -> ComicId {
    name.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// A comic known to the catalog.
///
/// `oldest_date` and `newest_date` bound every strip stored for the comic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicDescriptor {
    pub id: ComicId,
    pub name: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub source: String,
    /// Source-specific slug; empty means "derive from the name".
    #[serde(default)]
    pub source_identifier: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub oldest_date: Option<NaiveDate>,
    #[serde(default)]
    pub newest_date: Option<NaiveDate>,
    #[serde(default)]
    pub avatar_available: bool,
    /// Weekdays the comic publishes on. Empty means daily.
    #[serde(default)]
    pub publication_days: Vec<Weekday>,
}

fn default_true() -> bool {
    true
}

impl ComicDescriptor {
    /// Create a new enabled descriptor with no stored strips.
    pub fn new(name: impl Into<String>, source: impl Into<String>, source_identifier: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: comic_id(&name),
            name,
            author: None,
            description: None,
            source: source.into(),
            source_identifier: source_identifier.into(),
            enabled: true,
            oldest_date: None,
            newest_date: None,
            avatar_available: false,
            publication_days: Vec::new(),
        }
    }

    /// Build a catalog entry from a bootstrap seed.
    pub fn from_bootstrap(entry: &BootstrapEntry) -> Self {
        let mut comic = Self::new(
            entry.strip_name.clone(),
            entry.source.clone(),
            entry.source_identifier.clone().unwrap_or_default(),
        );
        comic.oldest_date = Some(entry.start_date);
        comic.publication_days = entry.publication_days.clone();
        comic
    }

    /// Archive directory name: the comic name with whitespace removed.
    pub fn directory_name(&self) -> String {
        let compact: String = self.name.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() { format!("comic_{}", self.id) } else { compact }
    }

    /// Whether the comic publishes on the given date.
    pub fn publishes_on(&self, date: NaiveDate) -> bool {
        self.publication_days.is_empty() || self.publication_days.contains(&date.weekday())
    }
}

/// Declarative seed for a comic that should exist in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapEntry {
    pub strip_name: String,
    pub start_date: NaiveDate,
    pub source: String,
    #[serde(default)]
    pub source_identifier: Option<String>,
    #[serde(default)]
    pub publication_days: Vec<Weekday>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comic_id_is_stable() {
        assert_eq!(comic_id(""), 0);
        assert_eq!(comic_id("a"), 97);
        assert_eq!(comic_id("ab"), 97 * 31 + 98);
        assert_eq!(comic_id("Garfield"), comic_id("Garfield"));
        assert_ne!(comic_id("Garfield"), comic_id("garfield"));
    }

    #[test]
    fn test_directory_name_strips_spaces() {
        let comic = ComicDescriptor::new("Calvin and Hobbes", "gocomics", "calvinandhobbes");
        assert_eq!(comic.directory_name(), "CalvinandHobbes");
    }

    #[test]
    fn test_directory_name_blank_falls_back_to_id() {
        let comic = ComicDescriptor::new("   ", "gocomics", "");
        assert_eq!(comic.directory_name(), format!("comic_{}", comic.id));
    }

    #[test]
    fn test_publishes_on() {
        let mut comic = ComicDescriptor::new("Foo", "gocomics", "foo");
        let sunday = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        assert!(comic.publishes_on(sunday));

        comic.publication_days = vec![Weekday::Sun];
        assert!(comic.publishes_on(sunday));
        assert!(!comic.publishes_on(sunday.succ_opt().unwrap()));
    }

    #[test]
    fn test_from_bootstrap() {
        let entry: BootstrapEntry = serde_json::from_str(
            r#"{"strip_name":"Foo Bar","start_date":"2020-01-01","source":"comicskingdom"}"#,
        )
        .unwrap();
        let comic = ComicDescriptor::from_bootstrap(&entry);
        assert_eq!(comic.id, comic_id("Foo Bar"));
        assert_eq!(comic.oldest_date, NaiveDate::from_ymd_opt(2020, 1, 1));
        assert!(comic.newest_date.is_none());
        assert!(comic.source_identifier.is_empty());
        assert!(comic.enabled);
    }
}
