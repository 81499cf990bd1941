//! Headless browser rendering for sources that assemble strip pages with
//! JavaScript.
//!
//! Compiled with the `render` feature and attached to the
//! [`FetchClient`](crate::FetchClient) only when `render_enabled` is set.

use std::time::{Duration, Instant};

use thiserror::Error;
use url::Url;

use crate::DownloadError;

/// Selector that signals a strip page has finished rendering.
pub const STRIP_READY_SELECTOR: &str = r#"meta[property="og:image"]"#;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("content retrieval failed: {0}")]
    ContentRetrieval(String),

    #[error("render timeout after {0}ms")]
    Timeout(u64),

    #[error("wait_for selector not found: {0}")]
    SelectorNotFound(String),
}

impl From<RenderError> for DownloadError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Timeout(_) => DownloadError::Timeout(err.to_string()),
            RenderError::Navigation(_) => DownloadError::Network(err.to_string()),
            RenderError::SelectorNotFound(_) => DownloadError::Parse(err.to_string()),
            RenderError::BrowserLaunch(_) | RenderError::ContentRetrieval(_) => DownloadError::Render(err.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Budget for navigation plus waiting (default: 30000).
    pub timeout_ms: u64,

    /// CSS selector to wait for before reading the DOM.
    pub wait_for: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { timeout_ms: 30_000, wait_for: Some(STRIP_READY_SELECTOR.to_string()) }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub final_url: Url,
    pub render_time_ms: u64,
}

#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<RenderedPage, RenderError>;
}

/// Chromium driven over the DevTools protocol.
pub struct HeadlessRenderer {
    browser: chromiumoxide::Browser,
}

impl HeadlessRenderer {
    /// Launch a headless browser with the given viewport.
    ///
    /// DevTools events are drained on a background task for the lifetime of
    /// the browser.
    pub async fn launch(viewport: (u32, u32)) -> Result<Self, RenderError> {
        use chromiumoxide::browser::{Browser, BrowserConfig};
        use futures_util::StreamExt;

        let config = BrowserConfig::builder()
            .window_size(viewport.0, viewport.1)
            .build()
            .map_err(RenderError::BrowserLaunch)?;
        let (browser, mut handler) =
            Browser::launch(config).await.map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {e}");
                    break;
                }
            }
        });

        tracing::info!(width = viewport.0, height = viewport.1, "headless renderer launched");
        Ok(Self { browser })
    }
}

#[async_trait::async_trait]
impl Renderer for HeadlessRenderer {
    async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
        let start = Instant::now();
        let budget = Duration::from_millis(opts.timeout_ms);

        let page = tokio::time::timeout(budget, self.browser.new_page(url.as_str()))
            .await
            .map_err(|_| RenderError::Timeout(opts.timeout_ms))?
            .map_err(|e| RenderError::Navigation(e.to_string()))?;

        if let Some(selector) = &opts.wait_for {
            let remaining = budget.saturating_sub(start.elapsed());
            let found = tokio::time::timeout(remaining, async {
                loop {
                    if page.find_element(selector.as_str()).await.is_ok() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            })
            .await;
            if found.is_err() {
                page.close().await.ok();
                return Err(RenderError::SelectorNotFound(selector.clone()));
            }
        }

        let html = page.content().await.map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;
        let page_url = page.url().await.map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;
        let final_url = Url::parse(page_url.as_deref().unwrap_or(url.as_str()))
            .map_err(|e| RenderError::Navigation(e.to_string()))?;

        page.close().await.ok();
        Ok(RenderedPage { html, final_url, render_time_ms: start.elapsed().as_millis() as u64 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_classification() {
        use strips_core::model::RetrievalStatus;

        assert_eq!(DownloadError::from(RenderError::Timeout(10)).status(), RetrievalStatus::NetworkError);
        assert_eq!(
            DownloadError::from(RenderError::SelectorNotFound("x".into())).status(),
            RetrievalStatus::ParsingError
        );
        assert_eq!(DownloadError::from(RenderError::BrowserLaunch("x".into())).status(), RetrievalStatus::UnknownError);
    }

    #[test]
    fn test_default_waits_for_strip_meta() {
        assert_eq!(RenderOptions::default().wait_for.as_deref(), Some(STRIP_READY_SELECTOR));
    }

    #[tokio::test]
    #[ignore = "requires Chrome/Chromium installation"]
    async fn test_headless_renderer_launch() {
        assert!(HeadlessRenderer::launch((1280, 720)).await.is_ok());
    }

    #[tokio::test]
    #[ignore = "requires network and Chrome/Chromium"]
    async fn test_render_strip_page() {
        let renderer = HeadlessRenderer::launch((1280, 720)).await.unwrap();
        let url = Url::parse("https://www.gocomics.com/garfield").unwrap();
        let page = renderer.render(&url, &RenderOptions::default()).await.unwrap();
        assert!(page.html.contains("og:image"));
    }
}
