//! In-process fixtures for facade and scheduler tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::NaiveDate;
use chrono_tz::America::New_York;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use strips_client::{ComicProfile, DownloadError, DownloaderFacade, FetchedStrip, SourceDownloader};
use strips_core::config::{BackfillConfig, CacheConfig, DuplicateConfig, HashAlgorithm};
use strips_core::model::{BootstrapEntry, ComicDescriptor};
use strips_core::{DuplicateDetector, FixedClock, JsonCatalogStore, RetrievalStatusTracker, StateDb, StripArchive};
use tempfile::TempDir;

use super::{ComicManagementFacade, Components};

pub(crate) const FAKE_SOURCE: &str = "fake";

/// Constant-gray PNG large enough to pass strip validation.
pub(crate) fn strip_png(shade: u8) -> Vec<u8> {
    let img = GrayImage::from_fn(160, 80, |_, _| Luma([shade]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img).write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Blocky pseudo-random PNG; different seeds are far apart under dHash.
///
/// `lift` brightens every pixel uniformly, which changes the bytes but not
/// the perceptual hash.
pub(crate) fn noise_png(seed: u64, lift: u8) -> Vec<u8> {
    let img = GrayImage::from_fn(180, 90, |x, y| {
        let cell = u64::from(y * 8 / 90) * 9 + u64::from(x / 20);
        let mut z = seed.wrapping_mul(97).wrapping_add(cell).wrapping_add(0x9e37_79b9_7f4a_7c15);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        let level = ((z ^ (z >> 31)) % 200) as u8;
        Luma([20 + level + lift])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img).write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Strip(Vec<u8>),
    Network,
    Parse,
}

/// Downloader answering from a per-date script. Unscripted dates are
/// unavailable.
#[derive(Default)]
pub(crate) struct FakeDownloader {
    script: Mutex<HashMap<NaiveDate, Scripted>>,
    profile_avatar: Mutex<Option<Vec<u8>>>,
    pub calls: AtomicUsize,
}

impl FakeDownloader {
    pub fn script(&self, date: NaiveDate, outcome: Scripted) {
        self.script.lock().unwrap().insert(date, outcome);
    }

    pub fn strip(&self, date: NaiveDate, shade: u8) {
        self.script(date, Scripted::Strip(strip_png(shade)));
    }

    pub fn image(&self, date: NaiveDate, bytes: Vec<u8>) {
        self.script(date, Scripted::Strip(bytes));
    }

    pub fn with_avatar(&self, bytes: Vec<u8>) {
        *self.profile_avatar.lock().unwrap() = Some(bytes);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SourceDownloader for FakeDownloader {
    fn source(&self) -> &str {
        FAKE_SOURCE
    }

    async fn fetch(&self, _comic: &ComicDescriptor, date: NaiveDate) -> Result<FetchedStrip, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().get(&date).cloned();
        match scripted {
            Some(Scripted::Strip(bytes)) => Ok(FetchedStrip {
                bytes: Bytes::from(bytes),
                publish_date: date,
                image_url: format!("https://strips.test/{date}.png").parse().unwrap(),
                http_status: 200,
                fetch_ms: 1,
            }),
            Some(Scripted::Network) => Err(DownloadError::Network("connection reset".into())),
            Some(Scripted::Parse) => Err(DownloadError::Parse("og:image missing".into())),
            None => Err(DownloadError::Unavailable(format!("no strip for {date}"))),
        }
    }

    async fn fetch_profile(&self, _comic: &ComicDescriptor) -> Result<ComicProfile, DownloadError> {
        Ok(ComicProfile {
            avatar: self.profile_avatar.lock().unwrap().clone().map(Bytes::from),
            author: Some("A. Cartoonist".into()),
            description: None,
        })
    }
}

pub(crate) struct Harness {
    pub facade: Arc<ComicManagementFacade>,
    pub downloader: Arc<FakeDownloader>,
    pub clock: Arc<FixedClock>,
    pub archive: Arc<StripArchive>,
    pub db: StateDb,
    _dir: TempDir,
}

/// Facade over a temp archive with exact duplicate detection, an
/// in-memory state database and a clock pinned to `today`.
pub(crate) async fn harness(today: NaiveDate) -> Harness {
    harness_with_bootstrap(today, Vec::new()).await
}

pub(crate) async fn harness_with_bootstrap(today: NaiveDate, bootstrap: Vec<BootstrapEntry>) -> Harness {
    let exact = DuplicateConfig { enabled: true, algorithm: HashAlgorithm::Sha256, threshold: 0, window: 30 };
    build(today, bootstrap, &exact, BackfillConfig::default()).await
}

/// Harness using the given duplicate policy, e.g. the default dHash one.
pub(crate) async fn harness_with_detector(today: NaiveDate, duplicates: &DuplicateConfig) -> Harness {
    build(today, Vec::new(), duplicates, BackfillConfig::default()).await
}

pub(crate) async fn harness_with_backfill(today: NaiveDate, backfill: BackfillConfig) -> Harness {
    let exact = DuplicateConfig { algorithm: HashAlgorithm::Sha256, threshold: 0, ..DuplicateConfig::default() };
    build(today, Vec::new(), &exact, backfill).await
}

async fn build(
    today: NaiveDate, bootstrap: Vec<BootstrapEntry>, duplicates: &DuplicateConfig, backfill: BackfillConfig,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock::at_local_noon(today, New_York));
    let db = StateDb::open_in_memory().await.unwrap();

    let detector = DuplicateDetector::from_config(duplicates);
    let archive = Arc::new(StripArchive::new(dir.path().join("archive"), detector));

    let downloader = Arc::new(FakeDownloader::default());
    let mut downloaders = DownloaderFacade::new();
    downloaders.register(downloader.clone()).unwrap();

    let components = Components {
        catalog_store: Arc::new(JsonCatalogStore::new(dir.path().join("comics.json"))),
        downloaders: Arc::new(downloaders),
        archive: archive.clone(),
        retrievals: Arc::new(RetrievalStatusTracker::new(db.clone(), clock.clone(), 7)),
        clock: clock.clone(),
    };
    let facade = ComicManagementFacade::open(components, &CacheConfig::default())
        .await
        .unwrap()
        .with_bootstrap(bootstrap)
        .with_backfill(backfill);

    Harness { facade: Arc::new(facade), downloader, clock, archive, db, _dir: dir }
}

/// A comic served by [`FakeDownloader`], starting at `start`.
pub(crate) fn fake_comic(name: &str, start: NaiveDate) -> ComicDescriptor {
    let mut comic = ComicDescriptor::new(name, FAKE_SOURCE, name.to_lowercase());
    comic.oldest_date = Some(start);
    comic
}
