//! robots.txt compliance with a per-host cache.
//!
//! Sources are polled daily, so each host's robots.txt is fetched at most
//! once per 24 hours. A missing robots.txt (4xx) allows everything; a
//! server error is surfaced so the fetch is retried on the next cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use robotstxt_rs::RobotsTxt;
use tokio::sync::RwLock;
use url::Url;

/// How long a fetched robots.txt is trusted (24 hours).
const ROBOTS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Largest robots.txt accepted (1MB).
const MAX_ROBOTS_SIZE: usize = 1024 * 1024;

/// Why a robots.txt check did not allow the request.
#[derive(Debug, thiserror::Error)]
pub enum RobotsError {
    #[error("robots.txt disallowed: {path} (robots_url: {robots_url})")]
    Disallowed { path: String, robots_url: String },

    #[error("failed to fetch robots.txt: {0}")]
    FetchError(String),

    #[error("robots.txt too large")]
    TooLarge,
}

/// Parsed robots.txt and when it was fetched.
struct CachedRobots {
    robots: RobotsTxt,
    fetched_at: Instant,
}

impl CachedRobots {
    fn is_expired(&self) -> bool {
        self.fetched_at.elapsed() > ROBOTS_TTL
    }
}

/// Per-host robots.txt rules, keyed by robots.txt URL.
///
/// Expired entries are refetched on the next check for that host and
/// swept whenever a fresh robots.txt is cached.
pub struct RobotsCache {
    cache: Arc<RwLock<HashMap<String, CachedRobots>>>,
    user_agent: String,
    http: reqwest::Client,
}

/// `scheme://host[:port]/robots.txt` for the host serving `url`.
fn robots_url(url: &Url) -> String {
    match url.port() {
        Some(port) => format!("{}://{}:{port}/robots.txt", url.scheme(), url.host_str().unwrap_or("")),
        None => format!("{}://{}/robots.txt", url.scheme(), url.host_str().unwrap_or("")),
    }
}

/// Path and query of `url`, the form robots.txt rules are matched against.
fn request_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

impl RobotsCache {
    /// Share `http` with the fetch client so robots requests use the same
    /// timeout and TLS setup.
    pub fn new(user_agent: String, http: reqwest::Client) -> Self {
        Self { cache: Arc::new(RwLock::new(HashMap::new())), user_agent, http }
    }

    /// Ok if `url` may be fetched, `Disallowed` if robots.txt forbids it.
    ///
    /// Fetches and caches the host's robots.txt on a miss or after expiry.
    ///
    /// # Errors
    ///
    /// Returns `FetchError`/`TooLarge` when robots.txt cannot be obtained.
    pub async fn check(&self, url: &Url) -> Result<(), RobotsError> {
        let robots_url = robots_url(url);
        let path = request_path(url);

        let cached = {
            let cache = self.cache.read().await;
            cache
                .get(&robots_url)
                .filter(|c| !c.is_expired())
                .map(|c| c.robots.can_fetch(&self.user_agent, &path))
        };

        let allowed = match cached {
            Some(allowed) => {
                tracing::debug!(%robots_url, allowed, "robots.txt cache hit");
                allowed
            }
            None => {
                let robots = self.fetch_robots(&robots_url).await?;
                let allowed = robots.can_fetch(&self.user_agent, &path);
                let mut cache = self.cache.write().await;
                cache.retain(|_, cached| !cached.is_expired());
                cache.insert(robots_url.clone(), CachedRobots { robots, fetched_at: Instant::now() });
                allowed
            }
        };

        if allowed { Ok(()) } else { Err(RobotsError::Disallowed { path, robots_url }) }
    }

    /// Fetch and parse robots.txt. A 4xx means no rules.
    async fn fetch_robots(&self, url: &str) -> Result<RobotsTxt, RobotsError> {
        let response = self
            .http
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| RobotsError::FetchError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            if let Some(len) = response.content_length()
                && len as usize > MAX_ROBOTS_SIZE
            {
                return Err(RobotsError::TooLarge);
            }
            let bytes = response.bytes().await.map_err(|e| RobotsError::FetchError(e.to_string()))?;
            if bytes.len() > MAX_ROBOTS_SIZE {
                return Err(RobotsError::TooLarge);
            }
            Ok(RobotsTxt::parse(&String::from_utf8_lossy(&bytes)))
        } else if status.is_client_error() {
            tracing::debug!(url, %status, "no robots.txt, allowing all");
            Ok(RobotsTxt::parse(""))
        } else {
            Err(RobotsError::FetchError(format!("status {status}")))
        }
    }

    #[cfg(test)]
    async fn seed(&self, robots_url: &str, body: &str, fetched_at: Instant) {
        self.cache
            .write()
            .await
            .insert(robots_url.to_string(), CachedRobots { robots: RobotsTxt::parse(body), fetched_at });
    }
}
