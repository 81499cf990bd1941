//! HTTP fetch pipeline for source pages and strip images.
//!
//! ### Requests
//! - Browser user agent, `DNT: 1`, per-request timeout (default 5s)
//! - Redirects are followed (max 5); the final URL is reported so callers
//!   can detect a source redirecting a date request elsewhere
//!
//! ### Safety Gates
//! - robots.txt is honored for page requests when enabled
//! - Image URLs come from scraped HTML: the host is resolved and every
//!   answer must be public before the request is sent
//! - Bodies are read incrementally and abandoned once past `max_bytes`
//!
//! ### Rendering
//! With the `render` feature a [`Renderer`](crate::render::Renderer) can be
//! attached; page fetches then go through the headless browser.

pub mod robots;
pub mod ssrf;
pub mod url;

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use reqwest::{Client, Response, StatusCode, header};
use strips_core::AppConfig;

pub use robots::{RobotsCache, RobotsError};
pub use ssrf::{SsrfError, check_url, validate_ip};
pub use self::url::{UrlError, canonicalize, resolve};

use crate::DownloadError;

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";

/// Settings shared by page and image requests.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Sent on every request and matched against robots.txt groups
    pub user_agent: String,

    /// Largest body accepted, pages and images alike (default: 10MB)
    pub max_bytes: usize,

    /// Per-request timeout (default: 5s)
    pub timeout: Duration,

    /// Redirect hops followed before giving up (default: 5)
    pub max_redirects: usize,

    /// Consult robots.txt before fetching source pages (default: true)
    pub respect_robots: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

impl FetchConfig {
    /// Derive the HTTP settings from the daemon configuration.
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: 5,
            respect_robots: config.respect_robots,
        }
    }
}

/// A fetched HTML page.
#[derive(Debug, Clone)]
pub struct Page {
    /// URL as requested.
    pub url: ::url::Url,
    /// URL after redirects.
    pub final_url: ::url::Url,
    pub status: StatusCode,
    /// Decoded body, truncated to `max_bytes`.
    pub html: String,
    /// Wall time of the request in milliseconds.
    pub fetch_ms: u64,
}

/// A fetched image body.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub url: ::url::Url,
    pub status: StatusCode,
    /// `Content-Type` header, if the server sent one.
    pub content_type: Option<String>,
    pub bytes: Bytes,
    pub fetch_ms: u64,
}

/// HTTP client shared by all source downloaders.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
    robots_cache: RobotsCache,
    #[cfg(feature = "render")]
    renderer: Option<std::sync::Arc<dyn crate::render::Renderer>>,
}

impl FetchClient {
    /// Build the client with rustls and compressed transfer support.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Network` if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: FetchConfig) -> Result<Self, DownloadError> {
        let mut headers = header::HeaderMap::new();
        headers.insert("DNT", header::HeaderValue::from_static("1"));

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| DownloadError::Network(format!("failed to build HTTP client: {e}")))?;

        let robots_cache = RobotsCache::new(config.user_agent.clone(), http.clone());

        Ok(Self {
            http,
            config,
            robots_cache,
            #[cfg(feature = "render")]
            renderer: None,
        })
    }

    /// Route page fetches through a headless browser.
    #[cfg(feature = "render")]
    pub fn with_renderer(mut self, renderer: std::sync::Arc<dyn crate::render::Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Settings this client was built with.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Per-host robots.txt rules consulted before page fetches.
    pub fn robots_cache(&self) -> &RobotsCache {
        &self.robots_cache
    }

    async fn check_robots(&self, url: &::url::Url) -> Result<(), DownloadError> {
        if !self.config.respect_robots {
            return Ok(());
        }
        self.robots_cache.check(url).await.map_err(|e| match e {
            RobotsError::Disallowed { .. } => DownloadError::RobotsDisallowed(e.to_string()),
            RobotsError::FetchError(_) | RobotsError::TooLarge => DownloadError::Network(e.to_string()),
        })
    }

    async fn send(&self, url: &::url::Url, accept: &str) -> Result<Response, DownloadError> {
        let response = self.http.get(url.as_str()).header(header::ACCEPT, accept).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http { status: status.as_u16(), url: response.url().to_string() });
        }
        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(DownloadError::TooLarge { size: len as usize, limit: self.config.max_bytes });
        }
        Ok(response)
    }

    async fn read_limited(&self, mut response: Response) -> Result<Bytes, DownloadError> {
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.config.max_bytes {
                return Err(DownloadError::TooLarge { size: body.len() + chunk.len(), limit: self.config.max_bytes });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    #[cfg(feature = "render")]
    async fn try_render(&self, url: &::url::Url, start: Instant) -> Option<Result<Page, DownloadError>> {
        let renderer = self.renderer.as_ref()?;
        let opts = crate::render::RenderOptions { timeout_ms: self.config.timeout.as_millis() as u64, ..Default::default() };
        let rendered = match renderer.render(url, &opts).await {
            Ok(rendered) => rendered,
            Err(e) => return Some(Err(e.into())),
        };
        tracing::debug!(%url, final_url = %rendered.final_url, ms = rendered.render_time_ms, "rendered page");
        Some(Ok(Page {
            url: url.clone(),
            final_url: rendered.final_url,
            status: StatusCode::OK,
            html: rendered.html,
            fetch_ms: start.elapsed().as_millis() as u64,
        }))
    }

    #[cfg(not(feature = "render"))]
    async fn try_render(&self, _url: &::url::Url, _start: Instant) -> Option<Result<Page, DownloadError>> {
        None
    }

    /// Fetch an HTML page.
    pub async fn fetch_page(&self, url_str: &str) -> Result<Page, DownloadError> {
        let start = Instant::now();
        let url = canonicalize(url_str).map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;
        self.check_robots(&url).await?;

        if let Some(rendered) = self.try_render(&url, start).await {
            return rendered;
        }

        let response = self.send(&url, PAGE_ACCEPT).await?;
        let status = response.status();
        let final_url = response.url().clone();
        let body = self.read_limited(response).await?;
        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(%url, %final_url, fetch_ms, bytes = body.len(), "fetched page");
        Ok(Page { url, final_url, status, html: String::from_utf8_lossy(&body).into_owned(), fetch_ms })
    }

    /// Fetch an image found on a source page.
    pub async fn fetch_image(&self, url: &::url::Url) -> Result<ImagePayload, DownloadError> {
        let start = Instant::now();
        check_url(url).await.map_err(|e| match e {
            SsrfError::BlockedIp(_) | SsrfError::MissingHost(_) => DownloadError::Blocked(e.to_string()),
            SsrfError::DnsError(_) => DownloadError::Network(e.to_string()),
        })?;

        let response = self.send(url, IMAGE_ACCEPT).await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = self.read_limited(response).await?;
        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(%url, fetch_ms, bytes = bytes.len(), "fetched image");
        Ok(ImagePayload { url: url.clone(), status, content_type, bytes, fetch_ms })
    }
}
