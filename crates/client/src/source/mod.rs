//! Source downloader strategies.
//!
//! Each source is a [`SourceDownloader`] registered under its `source`
//! string in the [`DownloaderFacade`](crate::DownloaderFacade). A strategy
//! knows how to build a strip page URL for a comic and date, how to find
//! the strip image on that page, and how to scrape the comic's profile.

pub mod comicskingdom;
pub mod gocomics;

use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDate;
use strips_core::Clock;
use strips_core::model::ComicDescriptor;
use url::Url;

pub use comicskingdom::ComicsKingdom;
pub use gocomics::GoComics;

use crate::DownloadError;
use crate::fetch::{FetchClient, Page};

/// One strip as delivered by a source.
#[derive(Debug, Clone)]
pub struct FetchedStrip {
    /// Raw image body, not yet validated.
    pub bytes: Bytes,
    /// Requested date; a page showing another date is reported unavailable.
    pub publish_date: NaiveDate,
    /// Final image location after resolving relative links.
    pub image_url: Url,
    pub http_status: u16,
    pub fetch_ms: u64,
}

/// Comic metadata scraped from a source's about page.
#[derive(Debug, Clone, Default)]
pub struct ComicProfile {
    /// Avatar image body, when the about page links one.
    pub avatar: Option<Bytes>,
    pub author: Option<String>,
    pub description: Option<String>,
}

/// One comic website the daemon can download strips from.
#[async_trait::async_trait]
pub trait SourceDownloader: Send + Sync {
    /// Registry key, matched against [`ComicDescriptor::source`].
    fn source(&self) -> &str;

    /// Fetch the strip `comic` published on `date`.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] whose [`status`](DownloadError::status)
    /// classifies the failure.
    async fn fetch(&self, comic: &ComicDescriptor, date: NaiveDate) -> Result<FetchedStrip, DownloadError>;

    /// Next date worth requesting after `date`.
    ///
    /// Depends only on `date` and the comic's static publication calendar.
    fn advance(&self, comic: &ComicDescriptor, date: NaiveDate) -> Option<NaiveDate> {
        next_publication_day(comic, date)
    }

    /// Newest date this source can have a strip for.
    fn latest_available_date(&self, clock: &dyn Clock) -> NaiveDate {
        clock.today()
    }

    /// Scrape author, description and avatar from the comic's about page.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] when the page cannot be fetched.
    async fn fetch_profile(&self, comic: &ComicDescriptor) -> Result<ComicProfile, DownloadError>;
}

/// First day after `date` on which `comic` publishes.
pub fn next_publication_day(comic: &ComicDescriptor, date: NaiveDate) -> Option<NaiveDate> {
    let mut candidate = date;
    for _ in 0..7 {
        candidate = candidate.succ_opt()?;
        if comic.publishes_on(candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Where a strip page points: the image and, if the page reveals it, the
/// date it actually shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StripLocation {
    pub image_url: Url,
    pub page_date: Option<NaiveDate>,
}

/// Links scraped from an about page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ProfileLinks {
    pub avatar_url: Option<Url>,
    pub author: Option<String>,
    pub description: Option<String>,
}

/// Fetch the strip page, locate the image with `locate` and download it.
///
/// A page that shows a different date than requested means the source has
/// nothing for `requested`.
pub(crate) async fn download_strip(
    client: &FetchClient, page_url: &str, requested: NaiveDate,
    locate: impl FnOnce(&Page) -> Result<StripLocation, DownloadError>,
) -> Result<FetchedStrip, DownloadError> {
    let page = client.fetch_page(page_url).await?;
    let location = locate(&page)?;

    if let Some(served) = location.page_date
        && served != requested
    {
        return Err(DownloadError::Unavailable(format!(
            "requested {requested}, source served {served} ({})",
            page.final_url
        )));
    }

    let image = client.fetch_image(&location.image_url).await?;
    Ok(FetchedStrip {
        bytes: image.bytes,
        publish_date: requested,
        image_url: location.image_url,
        http_status: image.status.as_u16(),
        fetch_ms: page.fetch_ms + image.fetch_ms,
    })
}

/// Fetch the about page, scrape it with `scrape` and download the avatar.
///
/// A failed avatar download still returns the scraped text fields.
pub(crate) async fn download_profile(
    client: &FetchClient, about_url: &str, scrape: impl FnOnce(&Page) -> Result<ProfileLinks, DownloadError>,
) -> Result<ComicProfile, DownloadError> {
    let page = client.fetch_page(about_url).await?;
    let links = scrape(&page)?;

    let avatar = match &links.avatar_url {
        Some(url) => match client.fetch_image(url).await {
            Ok(image) => Some(image.bytes),
            Err(e) => {
                tracing::warn!(%url, "avatar download failed: {e}");
                None
            }
        },
        None => None,
    };

    Ok(ComicProfile { avatar, author: links.author, description: links.description })
}

/// Shared handle type for registered strategies.
pub type SharedDownloader = Arc<dyn SourceDownloader>;
