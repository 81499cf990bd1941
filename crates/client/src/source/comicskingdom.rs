//! Comics Kingdom strategy.
//!
//! Strip pages live at `/{slug}/{yyyy-mm-dd}`. They carry several
//! `og:image` tags; the second one is the full-resolution strip.

use std::sync::Arc;

use chrono::NaiveDate;
use strips_core::model::ComicDescriptor;
use url::Url;

use super::{ComicProfile, FetchedStrip, ProfileLinks, SourceDownloader, StripLocation, download_profile, download_strip};
use crate::DownloadError;
use crate::extract::ScrapedPage;
use crate::fetch::{FetchClient, Page, resolve, url::segments};

/// Registry key for comics hosted on comicskingdom.com.
pub const SOURCE: &str = "comicskingdom";

const BASE_URL: &str = "https://comicskingdom.com";
const AVATAR_SELECTOR: &str = r#"img[src^="https://api.kingdigital.com/img/features/"]"#;

/// Scrapes dated strip pages and the about page on comicskingdom.com.
pub struct ComicsKingdom {
    client: Arc<FetchClient>,
}

impl ComicsKingdom {
    pub fn new(client: Arc<FetchClient>) -> Self {
        Self { client }
    }
}

fn slug(comic: &ComicDescriptor) -> String {
    let ident = comic.source_identifier.trim();
    if ident.is_empty() { comic.name.trim().replace(' ', "-") } else { ident.to_string() }
}

fn strip_url(comic: &ComicDescriptor, date: NaiveDate) -> String {
    format!("{BASE_URL}/{}/{}", slug(comic), date.format("%Y-%m-%d"))
}

fn about_url(comic: &ComicDescriptor) -> String {
    format!("{BASE_URL}/{}/about", slug(comic))
}

fn date_in_url(url: &Url) -> Option<NaiveDate> {
    segments(url).last().and_then(|seg| NaiveDate::parse_from_str(seg, "%Y-%m-%d").ok())
}

fn locate_strip(page: &Page) -> Result<StripLocation, DownloadError> {
    let scraped = ScrapedPage::parse(&page.html);
    let mut images = scraped.meta_property("og:image")?;
    let content = match images.len() {
        0 => return Err(DownloadError::Parse(format!("no og:image on {}", page.final_url))),
        1 => images.swap_remove(0),
        _ => images.swap_remove(1),
    };
    let image_url = resolve(&page.final_url, &content).map_err(|e| DownloadError::Parse(e.to_string()))?;
    Ok(StripLocation { image_url, page_date: date_in_url(&page.final_url) })
}

fn scrape_profile(page: &Page) -> Result<ProfileLinks, DownloadError> {
    let scraped = ScrapedPage::parse(&page.html);
    let avatar_url = scraped
        .attr_values(AVATAR_SELECTOR, "src")?
        .last()
        .and_then(|src| resolve(&page.final_url, src).ok());
    Ok(ProfileLinks {
        avatar_url,
        author: scraped.meta_name("author")?,
        description: scraped.meta_property("og:description")?.into_iter().next(),
    })
}

#[async_trait::async_trait]
impl SourceDownloader for ComicsKingdom {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self, comic: &ComicDescriptor, date: NaiveDate) -> Result<FetchedStrip, DownloadError> {
        let url = strip_url(comic, date);
        tracing::debug!(comic = %comic.name, %date, %url, "fetching comicskingdom strip");
        download_strip(&self.client, &url, date, locate_strip).await
    }

    async fn fetch_profile(&self, comic: &ComicDescriptor) -> Result<ComicProfile, DownloadError> {
        download_profile(&self.client, &about_url(comic), scrape_profile).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn page(final_url: &str, html: &str) -> Page {
        let url = Url::parse(final_url).unwrap();
        Page { url: url.clone(), final_url: url, status: StatusCode::OK, html: html.to_string(), fetch_ms: 0 }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_strip_url() {
        let comic = ComicDescriptor::new("Beetle Bailey", SOURCE, "");
        assert_eq!(strip_url(&comic, date(2024, 2, 9)), "https://comicskingdom.com/Beetle-Bailey/2024-02-09");

        let comic = ComicDescriptor::new("Zits", SOURCE, "zits");
        assert_eq!(about_url(&comic), "https://comicskingdom.com/zits/about");
    }

    #[test]
    fn test_prefers_second_og_image() {
        let html = r#"<head>
            <meta property="og:image" content="https://comicskingdom.com/thumb.jpg">
            <meta property="og:image" content="https://wp.comicskingdom.com/comicskingdom-redesign-uploads-production/2024/02/full.jpg">
            <meta property="og:image" content="https://comicskingdom.com/social.jpg">
        </head>"#;
        let location = locate_strip(&page("https://comicskingdom.com/zits/2024-02-09", html)).unwrap();
        assert!(location.image_url.as_str().ends_with("/full.jpg"));
        assert_eq!(location.page_date, Some(date(2024, 2, 9)));
    }

    #[test]
    fn test_single_og_image() {
        let html = r#"<meta property="og:image" content="/uploads/only.jpg">"#;
        let location = locate_strip(&page("https://comicskingdom.com/zits/2024-02-09", html)).unwrap();
        assert_eq!(location.image_url.as_str(), "https://comicskingdom.com/uploads/only.jpg");
    }

    #[test]
    fn test_missing_image() {
        let err = locate_strip(&page("https://comicskingdom.com/zits/2024-02-09", "<p>gone</p>")).unwrap_err();
        assert!(matches!(err, DownloadError::Parse(_)));
    }

    #[test]
    fn test_landing_page_has_no_date() {
        let url = Url::parse("https://comicskingdom.com/zits").unwrap();
        assert_eq!(date_in_url(&url), None);
    }

    #[test]
    fn test_scrape_profile_takes_last_feature_image() {
        let html = r#"<body>
            <img src="https://api.kingdigital.com/img/features/zits_small.png">
            <img src="https://example.com/ad.png">
            <img src="https://api.kingdigital.com/img/features/zits_large.png">
        </body>"#;
        let links = scrape_profile(&page("https://comicskingdom.com/zits/about", html)).unwrap();
        assert_eq!(
            links.avatar_url.map(|u| u.to_string()).as_deref(),
            Some("https://api.kingdigital.com/img/features/zits_large.png")
        );
        assert_eq!(links.author, None);
    }
}
