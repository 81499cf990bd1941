//! Directory listing primitives for the year-partitioned layout.
//!
//! ```text
//! <root>/<ComicName>/<yyyy>/<yyyy-MM-dd>.<ext>
//! <root>/<ComicName>/avatar.<ext>
//! ```
//!
//! Only purely numeric directories count as years and only files named as
//! an ISO date with a known image extension count as strips, so avatars,
//! NAS metadata folders and temp files never show up in navigation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::Error;
use crate::imaging::STRIP_EXTENSIONS;

/// A strip file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StripFile {
    pub date: NaiveDate,
    pub path: PathBuf,
}

pub(crate) fn storage_error(path: &Path, err: std::io::Error) -> Error {
    Error::Storage(format!("{}: {err}", path.display()))
}

/// Parse `yyyy-MM-dd.ext` into its date, rejecting anything else.
pub(crate) fn parse_strip_name(name: &str) -> Option<NaiveDate> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.len() != 10 || !STRIP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
        return None;
    }
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

/// Year folders under a comic directory, oldest first.
///
/// A missing comic directory has no years.
pub(crate) async fn list_years(comic_dir: &Path) -> Result<Vec<(i32, PathBuf)>, Error> {
    let mut entries = match tokio::fs::read_dir(comic_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(storage_error(comic_dir, e)),
    };

    let mut years = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| storage_error(comic_dir, e))? {
        let file_type = entry.file_type().await.map_err(|e| storage_error(&entry.path(), e))?;
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.len() == 4
            && let Ok(year) = name.parse::<i32>()
        {
            years.push((year, entry.path()));
        }
    }

    years.sort_by_key(|(year, _)| *year);
    Ok(years)
}

/// Strip files in one year folder, in lexical (= chronological) order.
///
/// When a date exists under several extensions the first name wins.
pub(crate) async fn list_strips(year_dir: &Path) -> Result<Vec<StripFile>, Error> {
    let mut entries = match tokio::fs::read_dir(year_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(storage_error(year_dir, e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| storage_error(year_dir, e))? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(date) = parse_strip_name(name) {
            names.push((name.to_string(), date, entry.path()));
        }
    }

    names.sort_by(|a, b| a.0.cmp(&b.0));
    names.dedup_by_key(|(_, date, _)| *date);

    Ok(names.into_iter().map(|(_, date, path)| StripFile { date, path }).collect())
}

/// Total size in bytes of every file below `dir`.
pub(crate) async fn directory_size(dir: &Path) -> Result<u64, Error> {
    let mut total = 0u64;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(storage_error(&current, e)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| storage_error(&current, e))? {
            let meta = entry.metadata().await.map_err(|e| storage_error(&entry.path(), e))?;
            if meta.is_dir() {
                pending.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strip_name() {
        assert_eq!(parse_strip_name("2008-01-10.png"), NaiveDate::from_ymd_opt(2008, 1, 10));
        assert_eq!(parse_strip_name("2008-01-10.JPG"), NaiveDate::from_ymd_opt(2008, 1, 10));
        assert!(parse_strip_name("avatar.png").is_none());
        assert!(parse_strip_name("2008-01-10.txt").is_none());
        assert!(parse_strip_name("2008-1-10.png").is_none());
        assert!(parse_strip_name("2008-02-30.png").is_none());
        assert!(parse_strip_name("2008-01-10.png.tmp").is_none());
    }

    #[tokio::test]
    async fn test_list_years_skips_non_year_dirs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2010", "2008", "@eaDir", "notes"] {
            tokio::fs::create_dir(dir.path().join(name)).await.unwrap();
        }
        tokio::fs::write(dir.path().join("avatar.png"), b"x").await.unwrap();

        let years: Vec<i32> = list_years(dir.path()).await.unwrap().into_iter().map(|(y, _)| y).collect();
        assert_eq!(years, vec![2008, 2010]);
    }

    #[tokio::test]
    async fn test_list_years_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_years(&dir.path().join("absent")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_strips_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2008-03-01.png", "2008-01-10.png", "2008-01-10.jpg", "Thumbs.db", "2008-02-01.png.tmp"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }

        let strips = list_strips(dir.path()).await.unwrap();
        let dates: Vec<String> = strips.iter().map(|s| s.date.to_string()).collect();
        assert_eq!(dates, vec!["2008-01-10", "2008-03-01"]);
        assert!(strips[0].path.ends_with("2008-01-10.jpg"));
    }

    #[tokio::test]
    async fn test_directory_size() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join("2020")).await.unwrap();
        tokio::fs::write(dir.path().join("2020").join("2020-01-01.png"), vec![0u8; 100]).await.unwrap();
        tokio::fs::write(dir.path().join("avatar.png"), vec![0u8; 20]).await.unwrap();
        assert_eq!(directory_size(dir.path()).await.unwrap(), 120);
    }
}
