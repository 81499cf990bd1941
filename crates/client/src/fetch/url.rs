//! URL handling for source pages and scraped image links.

use url::Url;

/// A page or image URL that could not be normalized.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse and normalize a page or image URL.
///
/// Whitespace is trimmed, a missing scheme becomes `https`, the host is
/// lowercased and any fragment is dropped. Only `http` and `https` pass.
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{trimmed}")
    };

    let mut parsed = Url::parse(&with_scheme).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    check_scheme(&parsed)?;

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed.set_host(Some(&host)).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }
    parsed.set_fragment(None);
    Ok(parsed)
}

/// Resolve a scraped `href`/`src`/`content` value against the page it was
/// found on.
pub fn resolve(base: &Url, href: &str) -> Result<Url, UrlError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(UrlError::Empty);
    }
    let mut joined = base.join(href).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    check_scheme(&joined)?;
    joined.set_fragment(None);
    Ok(joined)
}

fn check_scheme(url: &Url) -> Result<(), UrlError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }
}

/// Non-empty path segments of `url`.
pub fn segments(url: &Url) -> Vec<&str> {
    url.path_segments().map(|s| s.filter(|seg| !seg.is_empty()).collect()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_defaults_and_lowercases() {
        let url = canonicalize("  WWW.GoComics.com/garfield/2024/01/05#top ").unwrap();
        assert_eq!(url.as_str(), "https://www.gocomics.com/garfield/2024/01/05");
    }

    #[test]
    fn test_canonicalize_protocol_relative() {
        let url = canonicalize("//assets.example.com/strip.png").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("assets.example.com"));
    }

    #[test]
    fn test_canonicalize_rejects() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("file:///etc/passwd"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let base = Url::parse("https://comicskingdom.com/zits/about").unwrap();
        assert_eq!(resolve(&base, "/img/a.png").unwrap().as_str(), "https://comicskingdom.com/img/a.png");
        assert_eq!(
            resolve(&base, "https://api.kingdigital.com/img/features/zits.png#x").unwrap().as_str(),
            "https://api.kingdigital.com/img/features/zits.png"
        );
        assert!(matches!(resolve(&base, "data:image/png;base64,AAAA"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_segments() {
        let url = Url::parse("https://www.gocomics.com/garfield/2024/01/05/").unwrap();
        assert_eq!(segments(&url), vec!["garfield", "2024", "01", "05"]);
    }
}
