use std::path::{Path, PathBuf};

use crate::error::MediaError;
use crate::model::{Media, MediaKind};

/// Maps a message's media to a local file reference.
#[allow(async_fn_in_trait)]
pub trait MediaResolver {
    /// Must return the cached reference without fetching when one exists.
    async fn resolve(&self, message_id: i64, media: &Media) -> Result<Option<String>, MediaError>;
}

/// Downloads the bytes of one attachment. `Ok(None)` means nothing to fetch.
#[allow(async_fn_in_trait)]
pub trait MediaFetcher {
    async fn fetch(&self, media: &Media) -> Result<Option<Vec<u8>>, MediaError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, media: &Media) -> Result<Option<Vec<u8>>, MediaError> {
        let Some(url) = media.download_url.as_deref() else {
            return Ok(None);
        };
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes.to_vec()))
    }
}

/// Photo cache at `<dir>/photo_<id>.jpg`. Other media kinds are ignored.
pub struct PhotoCache<F> {
    dir: PathBuf,
    fetcher: F,
}

impl<F: MediaFetcher> PhotoCache<F> {
    pub fn new(dir: impl Into<PathBuf>, fetcher: F) -> Self {
        PhotoCache {
            dir: dir.into(),
            fetcher,
        }
    }

    pub fn photo_path(&self, message_id: i64) -> PathBuf {
        self.dir.join(format!("photo_{}.jpg", message_id))
    }
}

impl<F: MediaFetcher> MediaResolver for PhotoCache<F> {
    async fn resolve(&self, message_id: i64, media: &Media) -> Result<Option<String>, MediaError> {
        if media.kind != MediaKind::Photo {
            return Ok(None);
        }

        let path = self.photo_path(message_id);
        if tokio::fs::try_exists(&path).await.map_err(|source| io_err(&path, source))? {
            return Ok(Some(path.to_string_lossy().into_owned()));
        }

        let Some(bytes) = self.fetcher.fetch(media).await? else {
            return Ok(None);
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| io_err(&self.dir, source))?;
        let tmp = path.with_extension("jpg.part");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| io_err(&tmp, source))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| io_err(&path, source))?;

        Ok(Some(path.to_string_lossy().into_owned()))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> MediaError {
    MediaError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingFetcher {
        calls: AtomicUsize,
        bytes: Option<Vec<u8>>,
    }

    impl MediaFetcher for CountingFetcher {
        async fn fetch(&self, _media: &Media) -> Result<Option<Vec<u8>>, MediaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.bytes.clone())
        }
    }

    fn photo() -> Media {
        Media {
            kind: MediaKind::Photo,
            download_url: Some("https://cdn.example/p/1.jpg".into()),
        }
    }

    fn cache(dir: &TempDir, bytes: Option<Vec<u8>>) -> PhotoCache<CountingFetcher> {
        PhotoCache::new(
            dir.path().join("photos"),
            CountingFetcher {
                calls: AtomicUsize::new(0),
                bytes,
            },
        )
    }

    #[tokio::test]
    async fn second_resolve_uses_cache() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, Some(vec![0xFF, 0xD8, 0xFF]));

        let first = cache.resolve(42, &photo()).await.unwrap();
        let second = cache.resolve(42, &photo()).await.unwrap();

        assert_eq!(first, second);
        assert!(first.unwrap().ends_with("photo_42.jpg"));
        assert_eq!(cache.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(cache.photo_path(42)).unwrap(), vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn non_photo_media_is_ignored() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, Some(vec![1]));
        let doc = Media {
            kind: MediaKind::Document,
            download_url: Some("https://cdn.example/d".into()),
        };
        assert_eq!(cache.resolve(1, &doc).await.unwrap(), None);
        assert_eq!(cache.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn nothing_fetched_means_no_reference() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, None);
        assert_eq!(cache.resolve(3, &photo()).await.unwrap(), None);
        assert!(!cache.photo_path(3).exists());
    }
}
