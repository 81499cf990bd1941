//! Year-partitioned on-disk strip archive.
//!
//! The archive owns the directory tree for every comic and answers the
//! ordered lookups the read path needs (first, last, next-after,
//! previous-before). Storing runs the [`DuplicateDetector`] first so a
//! re-posted strip never reaches the disk.
//!
//! Navigation misses are `Ok(None)`; only real I/O failures surface as
//! `Error::Storage`. Callers must serialize writes per comic.

mod listing;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use tokio::sync::RwLock;

use crate::Error;
use crate::duplicate::{ContentHasher, DuplicateDetector, Fingerprint, ImageHasher};
use crate::imaging::{self, STRIP_EXTENSIONS};
use crate::model::{ComicDescriptor, StripRecord};
use listing::{StripFile, directory_size, list_strips, list_years, storage_error};

const AVATAR_STEM: &str = "avatar";

/// Result of [`StripArchive::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The image was written.
    Stored(StripRecord),
    /// The image duplicates an archived strip; nothing was written.
    Duplicate { existing: StripRecord },
}

impl StoreOutcome {
    pub fn record(&self) -> &StripRecord {
        match self {
            StoreOutcome::Stored(record) => record,
            StoreOutcome::Duplicate { existing } => existing,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreOutcome::Duplicate { .. })
    }
}

/// A comic's avatar image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avatar {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Durable strip storage rooted at one directory.
#[derive(Debug)]
pub struct StripArchive {
    root: PathBuf,
    detector: DuplicateDetector,
    max_bytes: usize,
    fingerprints: RwLock<HashMap<PathBuf, Fingerprint>>,
    digests: RwLock<HashMap<PathBuf, Fingerprint>>,
}

impl StripArchive {
    pub fn new(root: impl Into<PathBuf>, detector: DuplicateDetector) -> Self {
        Self {
            root: root.into(),
            detector,
            max_bytes: imaging::MAX_IMAGE_BYTES,
            fingerprints: RwLock::new(HashMap::new()),
            digests: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn detector(&self) -> &DuplicateDetector {
        &self.detector
    }

    pub fn comic_dir(&self, comic: &ComicDescriptor) -> PathBuf {
        self.root.join(comic.directory_name())
    }

    fn year_dir(&self, comic: &ComicDescriptor, year: i32) -> PathBuf {
        self.comic_dir(comic).join(format!("{year:04}"))
    }

    fn record(comic: &ComicDescriptor, file: StripFile) -> StripRecord {
        StripRecord { comic_id: comic.id, date: file.date, path: file.path }
    }

    /// Archive `bytes` as the strip for `date`.
    ///
    /// The image is validated, then checked against the same year
    /// (excluding `date` itself, which is simply replaced): first for a
    /// byte-identical strip anywhere in the year, then by fingerprint
    /// against the newest strips. A duplicate returns the existing record
    /// without writing anything.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidImage` for payloads that fail validation and
    /// `Error::Storage` when the write fails.
    pub async fn store(&self, comic: &ComicDescriptor, date: NaiveDate, bytes: &[u8]) -> Result<StoreOutcome, Error> {
        let info = imaging::validate(bytes, self.max_bytes)?;

        let digest = ContentHasher.fingerprint(bytes)?;
        let candidate = if self.detector.is_enabled() {
            if !self.detector.is_exact()
                && let Some(existing) = self.find_identical(comic, date, &digest).await?
            {
                tracing::info!(
                    comic = %comic.name,
                    %date,
                    duplicate_of = %existing.date,
                    fingerprint = %digest,
                    "skipping byte-identical strip"
                );
                return Ok(StoreOutcome::Duplicate { existing });
            }

            let candidate = self.compute_fingerprint(bytes.to_vec()).await?;
            let existing = self.recent_fingerprints(comic, date).await?;
            let pairs: Vec<(NaiveDate, Fingerprint)> =
                existing.iter().map(|(record, fp)| (record.date, fp.clone())).collect();

            if let Some(dup_date) = self.detector.find_duplicate(&candidate, &pairs)
                && let Some((existing, _)) = existing.into_iter().find(|(record, _)| record.date == dup_date)
            {
                tracing::info!(
                    comic = %comic.name,
                    %date,
                    duplicate_of = %dup_date,
                    fingerprint = %candidate,
                    "skipping duplicate strip"
                );
                return Ok(StoreOutcome::Duplicate { existing });
            }
            Some(candidate)
        } else {
            None
        };

        let year_dir = self.year_dir(comic, date.year());
        tokio::fs::create_dir_all(&year_dir)
            .await
            .map_err(|e| storage_error(&year_dir, e))?;

        let stem = date.format("%Y-%m-%d").to_string();
        let path = year_dir.join(format!("{stem}.{}", info.extension()));
        self.remove_siblings(&year_dir, &stem, &path).await?;
        write_atomic(&path, bytes).await?;

        if let Some(fp) = candidate {
            self.fingerprints.write().await.insert(path.clone(), fp);
        }
        self.digests.write().await.insert(path.clone(), digest);

        tracing::debug!(comic = %comic.name, %date, path = %path.display(), bytes = bytes.len(), "stored strip");
        Ok(StoreOutcome::Stored(StripRecord { comic_id: comic.id, date, path }))
    }

    /// Remove `<stem>.<other ext>` so a date never maps to two files.
    async fn remove_siblings(&self, dir: &Path, stem: &str, keep: &Path) -> Result<(), Error> {
        for ext in STRIP_EXTENSIONS {
            let sibling = dir.join(format!("{stem}.{ext}"));
            if sibling == keep {
                continue;
            }
            match tokio::fs::remove_file(&sibling).await {
                Ok(()) => {
                    self.fingerprints.write().await.remove(&sibling);
                    self.digests.write().await.remove(&sibling);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(storage_error(&sibling, e)),
            }
        }
        Ok(())
    }

    async fn compute_fingerprint(&self, bytes: Vec<u8>) -> Result<Fingerprint, Error> {
        let detector = self.detector.clone();
        tokio::task::spawn_blocking(move || detector.fingerprint(&bytes))
            .await
            .map_err(|e| Error::Storage(format!("fingerprint task failed: {e}")))?
    }

    /// Any strip in `date`'s year whose bytes hash to `digest`.
    async fn find_identical(
        &self, comic: &ComicDescriptor, date: NaiveDate, digest: &Fingerprint,
    ) -> Result<Option<StripRecord>, Error> {
        let strips = list_strips(&self.year_dir(comic, date.year())).await?;
        for file in strips.into_iter().rev().filter(|f| f.date != date) {
            let cached = self.digests.read().await.get(&file.path).cloned();
            let known = match cached {
                Some(known) => known,
                None => {
                    let bytes = tokio::fs::read(&file.path)
                        .await
                        .map_err(|e| storage_error(&file.path, e))?;
                    let known = ContentHasher.fingerprint(&bytes)?;
                    self.digests.write().await.insert(file.path.clone(), known.clone());
                    known
                }
            };
            if &known == digest {
                return Ok(Some(Self::record(comic, file)));
            }
        }
        Ok(None)
    }

    /// Fingerprints of the newest strips in `date`'s year, newest first.
    async fn recent_fingerprints(
        &self, comic: &ComicDescriptor, date: NaiveDate,
    ) -> Result<Vec<(StripRecord, Fingerprint)>, Error> {
        let strips = list_strips(&self.year_dir(comic, date.year())).await?;
        let window = self.detector.window();

        let mut out = Vec::new();
        for file in strips.into_iter().rev().filter(|f| f.date != date).take(window) {
            let cached = self.fingerprints.read().await.get(&file.path).cloned();
            let fp = match cached {
                Some(fp) => fp,
                None => {
                    let bytes = tokio::fs::read(&file.path)
                        .await
                        .map_err(|e| storage_error(&file.path, e))?;
                    match self.compute_fingerprint(bytes).await {
                        Ok(fp) => {
                            self.fingerprints.write().await.insert(file.path.clone(), fp.clone());
                            fp
                        }
                        Err(e) => {
                            tracing::warn!(path = %file.path.display(), "cannot fingerprint archived strip: {e}");
                            continue;
                        }
                    }
                }
            };
            out.push((Self::record(comic, file), fp));
        }

        Ok(out)
    }

    /// Oldest archived strip.
    pub async fn find_first(&self, comic: &ComicDescriptor) -> Result<Option<StripRecord>, Error> {
        for (_, dir) in list_years(&self.comic_dir(comic)).await? {
            if let Some(first) = list_strips(&dir).await?.into_iter().next() {
                return Ok(Some(Self::record(comic, first)));
            }
        }
        Ok(None)
    }

    /// Newest archived strip.
    pub async fn find_last(&self, comic: &ComicDescriptor) -> Result<Option<StripRecord>, Error> {
        for (_, dir) in list_years(&self.comic_dir(comic)).await?.into_iter().rev() {
            if let Some(last) = list_strips(&dir).await?.pop() {
                return Ok(Some(Self::record(comic, last)));
            }
        }
        Ok(None)
    }

    /// First archived strip strictly after `date`, crossing years as needed.
    pub async fn find_next(&self, comic: &ComicDescriptor, date: NaiveDate) -> Result<Option<StripRecord>, Error> {
        let years = list_years(&self.comic_dir(comic)).await?;
        for (_, dir) in years.into_iter().filter(|(year, _)| *year >= date.year()) {
            if let Some(next) = list_strips(&dir).await?.into_iter().find(|f| f.date > date) {
                return Ok(Some(Self::record(comic, next)));
            }
        }
        Ok(None)
    }

    /// Last archived strip strictly before `date`, crossing years as needed.
    pub async fn find_previous(
        &self, comic: &ComicDescriptor, date: NaiveDate,
    ) -> Result<Option<StripRecord>, Error> {
        let years = list_years(&self.comic_dir(comic)).await?;
        for (_, dir) in years.into_iter().rev().filter(|(year, _)| *year <= date.year()) {
            if let Some(prev) = list_strips(&dir).await?.into_iter().rev().find(|f| f.date < date) {
                return Ok(Some(Self::record(comic, prev)));
            }
        }
        Ok(None)
    }

    /// The strip archived for exactly `date`.
    pub async fn find_on(&self, comic: &ComicDescriptor, date: NaiveDate) -> Result<Option<StripRecord>, Error> {
        let year_dir = self.year_dir(comic, date.year());
        let stem = date.format("%Y-%m-%d");
        for ext in STRIP_EXTENSIONS {
            let path = year_dir.join(format!("{stem}.{ext}"));
            if tokio::fs::try_exists(&path).await.map_err(|e| storage_error(&path, e))? {
                return Ok(Some(StripRecord { comic_id: comic.id, date, path }));
            }
        }
        Ok(None)
    }

    /// Read the image bytes behind a record.
    pub async fn read(&self, record: &StripRecord) -> Result<Vec<u8>, Error> {
        tokio::fs::read(&record.path)
            .await
            .map_err(|e| storage_error(&record.path, e))
    }

    /// Years that contain at least one strip, oldest first.
    pub async fn years_with_content(&self, comic: &ComicDescriptor) -> Result<Vec<i32>, Error> {
        let mut years = Vec::new();
        for (year, dir) in list_years(&self.comic_dir(comic)).await? {
            if !list_strips(&dir).await?.is_empty() {
                years.push(year);
            }
        }
        Ok(years)
    }

    /// Bytes used by the comic's directory, avatar included.
    pub async fn storage_size(&self, comic: &ComicDescriptor) -> Result<u64, Error> {
        directory_size(&self.comic_dir(comic)).await
    }

    /// Replace the comic's avatar.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidImage` if the bytes are not a recognizable
    /// image.
    pub async fn store_avatar(&self, comic: &ComicDescriptor, bytes: &[u8]) -> Result<PathBuf, Error> {
        if bytes.is_empty() || bytes.len() > self.max_bytes {
            return Err(Error::InvalidImage(format!("avatar of {} bytes rejected", bytes.len())));
        }
        let format = imaging::sniff_format(bytes).ok_or_else(|| Error::InvalidImage("avatar format".into()))?;

        let dir = self.comic_dir(comic);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| storage_error(&dir, e))?;

        let path = dir.join(format!("{AVATAR_STEM}.{}", imaging::extension_for(format)));
        self.remove_siblings(&dir, AVATAR_STEM, &path).await?;
        write_atomic(&path, bytes).await?;
        Ok(path)
    }

    /// The comic's avatar, if one was stored.
    pub async fn avatar(&self, comic: &ComicDescriptor) -> Result<Option<Avatar>, Error> {
        let dir = self.comic_dir(comic);
        for ext in STRIP_EXTENSIONS {
            let path = dir.join(format!("{AVATAR_STEM}.{ext}"));
            match tokio::fs::read(&path).await {
                Ok(bytes) => return Ok(Some(Avatar { path, bytes })),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(storage_error(&path, e)),
            }
        }
        Ok(None)
    }

    /// Delete every strip older than `cutoff`, dropping emptied year folders.
    ///
    /// Returns the number of strips deleted.
    pub async fn purge_before(&self, comic: &ComicDescriptor, cutoff: NaiveDate) -> Result<usize, Error> {
        let mut deleted = 0;
        for (year, dir) in list_years(&self.comic_dir(comic)).await? {
            if year > cutoff.year() {
                break;
            }
            let strips = list_strips(&dir).await?;
            let total = strips.len();
            let mut removed_here = 0;
            for file in strips.into_iter().filter(|f| f.date < cutoff) {
                tokio::fs::remove_file(&file.path)
                    .await
                    .map_err(|e| storage_error(&file.path, e))?;
                self.fingerprints.write().await.remove(&file.path);
                self.digests.write().await.remove(&file.path);
                removed_here += 1;
            }
            deleted += removed_here;

            if removed_here == total
                && let Err(e) = tokio::fs::remove_dir(&dir).await
            {
                tracing::debug!(dir = %dir.display(), "year folder kept: {e}");
            }
        }

        if deleted > 0 {
            tracing::info!(comic = %comic.name, %cutoff, deleted, "purged old strips");
        }
        Ok(deleted)
    }

    /// Remove the comic's whole directory. Returns whether it existed.
    pub async fn delete_comic(&self, comic: &ComicDescriptor) -> Result<bool, Error> {
        let dir = self.comic_dir(comic);
        let removed = match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(storage_error(&dir, e)),
        };
        self.fingerprints.write().await.retain(|path, _| !path.starts_with(&dir));
        self.digests.write().await.retain(|path, _| !path.starts_with(&dir));
        Ok(removed)
    }
}

/// Write through a temp file and rename, so readers never see a torn strip.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let tmp = path.with_extension("part");
    tokio::fs::write(&tmp, bytes).await.map_err(|e| storage_error(&tmp, e))?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| storage_error(path, e))
}
