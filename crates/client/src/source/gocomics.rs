//! GoComics strategy.
//!
//! Strip pages live at `/{slug}/{yyyy}/{mm}/{dd}` and expose the strip
//! through `og:image`. A date GoComics has no strip for redirects to a
//! different date, which shows up in the final URL.

use std::sync::Arc;

use chrono::NaiveDate;
use strips_core::model::ComicDescriptor;
use url::Url;

use super::{ComicProfile, FetchedStrip, ProfileLinks, SourceDownloader, StripLocation, download_profile, download_strip};
use crate::DownloadError;
use crate::extract::ScrapedPage;
use crate::fetch::{FetchClient, Page, resolve, url::segments};

/// Registry key for comics hosted on gocomics.com.
pub const SOURCE: &str = "gocomics";

const BASE_URL: &str = "https://www.gocomics.com";
const AVATAR_SELECTOR: &str = r#"img[src*="badge"], img[src*="avatar"]"#;

/// Scrapes gocomics.com strip pages via their `og:image` metadata.
pub struct GoComics {
    client: Arc<FetchClient>,
}

impl GoComics {
    pub fn new(client: Arc<FetchClient>) -> Self {
        Self { client }
    }
}

fn slug(comic: &ComicDescriptor) -> String {
    let ident = comic.source_identifier.trim();
    let slug = if ident.is_empty() { comic.name.replace(' ', "") } else { ident.to_string() };
    slug.to_lowercase()
}

fn strip_url(comic: &ComicDescriptor, date: NaiveDate) -> String {
    format!("{BASE_URL}/{}/{}", slug(comic), date.format("%Y/%m/%d"))
}

fn about_url(comic: &ComicDescriptor) -> String {
    format!("{BASE_URL}/{}/about", slug(comic))
}

/// Date encoded in the trailing `yyyy/mm/dd` of a strip URL.
fn date_in_url(url: &Url) -> Option<NaiveDate> {
    let segs = segments(url);
    let [.., y, m, d] = segs.as_slice() else {
        return None;
    };
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

fn locate_strip(page: &Page) -> Result<StripLocation, DownloadError> {
    let scraped = ScrapedPage::parse(&page.html);
    let content = scraped
        .meta_property("og:image")?
        .into_iter()
        .next()
        .ok_or_else(|| DownloadError::Parse(format!("no og:image on {}", page.final_url)))?;
    let image_url = resolve(&page.final_url, &content).map_err(|e| DownloadError::Parse(e.to_string()))?;
    Ok(StripLocation { image_url, page_date: date_in_url(&page.final_url) })
}

fn scrape_profile(page: &Page) -> Result<ProfileLinks, DownloadError> {
    let scraped = ScrapedPage::parse(&page.html);
    let avatar_url = scraped
        .attr_values(AVATAR_SELECTOR, "src")?
        .first()
        .and_then(|src| resolve(&page.final_url, src).ok());
    Ok(ProfileLinks {
        avatar_url,
        author: scraped.meta_name("author")?,
        description: scraped.meta_property("og:description")?.into_iter().next(),
    })
}

#[async_trait::async_trait]
impl SourceDownloader for GoComics {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self, comic: &ComicDescriptor, date: NaiveDate) -> Result<FetchedStrip, DownloadError> {
        let url = strip_url(comic, date);
        tracing::debug!(comic = %comic.name, %date, %url, "fetching gocomics strip");
        download_strip(&self.client, &url, date, locate_strip).await
    }

    async fn fetch_profile(&self, comic: &ComicDescriptor) -> Result<ComicProfile, DownloadError> {
        download_profile(&self.client, &about_url(comic), scrape_profile).await
    }
}
