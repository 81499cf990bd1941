//! Metadata and image extraction from source HTML.
//!
//! Strip pages advertise the strip image through Open Graph tags; about
//! pages carry the avatar as a plain `<img>`. A [`ScrapedPage`] parses the
//! document once and answers both kinds of query. `scraper::Html` is not
//! `Send`, so a page is always parsed and queried inside one synchronous
//! call and only owned strings leave it.

use scraper::{Html, Selector};

use crate::DownloadError;

fn selector(css: &str) -> Result<Selector, DownloadError> {
    Selector::parse(css).map_err(|e| DownloadError::Parse(format!("bad selector {css}: {e}")))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub struct ScrapedPage {
    document: Html,
}

impl ScrapedPage {
    pub fn parse(html: &str) -> Self {
        Self { document: Html::parse_document(html) }
    }

    /// `content` of every `<meta property=...>` in document order.
    pub fn meta_property(&self, property: &str) -> Result<Vec<String>, DownloadError> {
        self.attr_values(&format!(r#"meta[property="{property}"]"#), "content")
    }

    /// `content` of the first `<meta name=...>`.
    pub fn meta_name(&self, name: &str) -> Result<Option<String>, DownloadError> {
        Ok(self.attr_values(&format!(r#"meta[name="{name}"]"#), "content")?.into_iter().next())
    }

    /// Non-empty values of `attr` on elements matching `css`.
    pub fn attr_values(&self, css: &str, attr: &str) -> Result<Vec<String>, DownloadError> {
        let selector = selector(css)?;
        Ok(self
            .document
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .filter_map(non_empty)
            .collect())
    }

    pub fn title(&self) -> Result<Option<String>, DownloadError> {
        let selector = selector("title")?;
        Ok(self.document.select(&selector).next().and_then(|el| non_empty(&el.text().collect::<String>())))
    }
}
