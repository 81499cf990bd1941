//! Comic catalog persistence and bootstrap loading.
//!
//! The catalog is a JSON document of [`ComicDescriptor`]s behind the
//! [`CatalogStore`] seam. Writes go to a sibling temp file which is then
//! renamed over the original, so a crash mid-write leaves the previous
//! catalog intact.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::model::{BootstrapEntry, ComicDescriptor};

/// Persistence seam for the comic catalog.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    /// Load every descriptor. A missing catalog is an empty catalog.
    async fn load(&self) -> Result<Vec<ComicDescriptor>, Error>;

    /// Replace the persisted catalog with `comics`.
    async fn save(&self, comics: &[ComicDescriptor]) -> Result<(), Error>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    comics: Vec<ComicDescriptor>,
}

/// Catalog stored as pretty-printed JSON on disk.
#[derive(Debug, Clone)]
pub struct JsonCatalogStore {
    path: PathBuf,
}

impl JsonCatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl CatalogStore for JsonCatalogStore {
    async fn load(&self) -> Result<Vec<ComicDescriptor>, Error> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no catalog found, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::Catalog(format!("{}: {e}", self.path.display()))),
        };

        let doc: CatalogDocument = serde_json::from_slice(&bytes)?;
        Ok(doc.comics)
    }

    async fn save(&self, comics: &[ComicDescriptor]) -> Result<(), Error> {
        let doc = CatalogDocument { comics: comics.to_vec() };
        let json = serde_json::to_vec_pretty(&doc)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), count = comics.len(), "catalog saved");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct BootstrapDocument {
    #[serde(default)]
    comics: Vec<BootstrapEntry>,
}

/// Load bootstrap entries from a JSON document of the form
/// `{"comics": [{"strip_name": .., "start_date": .., "source": ..}]}`.
///
/// # Errors
///
/// Returns `Error::Catalog` if the file cannot be read or parsed.
pub async fn load_bootstrap(path: &Path) -> Result<Vec<BootstrapEntry>, Error> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::Catalog(format!("bootstrap {}: {e}", path.display())))?;
    let doc: BootstrapDocument = serde_json::from_slice(&bytes)?;

    for entry in &doc.comics {
        if entry.strip_name.trim().is_empty() || entry.source.trim().is_empty() {
            return Err(Error::Catalog(format!("bootstrap {}: entry missing name or source", path.display())));
        }
    }

    Ok(doc.comics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_catalog_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCatalogStore::new(dir.path().join("comics.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCatalogStore::new(dir.path().join("data").join("comics.json"));
        let mut comic = ComicDescriptor::new("Foo Bar", "gocomics", "foobar");
        comic.author = Some("A. Cartoonist".into());

        store.save(std::slice::from_ref(&comic)).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, vec![comic]);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_catalog_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comics.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let store = JsonCatalogStore::new(path);
        assert!(matches!(store.load().await, Err(Error::Catalog(_))));
    }

    #[tokio::test]
    async fn test_load_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.json");
        tokio::fs::write(
            &path,
            br#"{"comics": [
                {"strip_name": "Foo", "start_date": "2019-04-01", "source": "gocomics"},
                {"strip_name": "Bar", "start_date": "2020-01-01", "source": "comicskingdom",
                 "source_identifier": "bar-strip", "publication_days": ["Sun"]}
            ]}"#,
        )
        .await
        .unwrap();

        let entries = load_bootstrap(&path).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].source_identifier.as_deref(), Some("bar-strip"));
        assert_eq!(entries[1].publication_days, vec![chrono::Weekday::Sun]);
    }

    #[tokio::test]
    async fn test_load_bootstrap_rejects_blank_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.json");
        tokio::fs::write(&path, br#"{"comics": [{"strip_name": "Foo", "start_date": "2019-04-01", "source": " "}]}"#)
            .await
            .unwrap();
        assert!(load_bootstrap(&path).await.is_err());
    }
}
