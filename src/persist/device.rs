use super::{sanitize_hint, PersistenceAdapter, SavedImage};
use crate::models::{Format, ImageRef};
use crate::source;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Name attempts per save before giving up on finding a free filename.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Device persistence: copies results into `{cache_dir}/images/`.
pub struct DevicePersistence {
    client: Client,
    cache_dir: PathBuf,
}

impl DevicePersistence {
    pub fn new(cache_dir: &Path) -> Self {
        Self::new_with_client(cache_dir, Client::new())
    }

    pub fn new_with_client(cache_dir: &Path, client: Client) -> Self {
        Self {
            client,
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.cache_dir.join("images")
    }

    /// Creates the images directory if needed. Safe to call any number of times.
    async fn ensure_images_dir(&self) -> Result<PathBuf> {
        let dir = self.images_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| Error::DirectoryCreateFailed {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    /// Writes `bytes` under `dir` as `{stem}-{millis}.{ext}`, never replacing an
    /// existing file. A taken name gets a `-N` counter after the timestamp.
    fn write_unique(
        dir: &Path,
        stem: &str,
        millis: i64,
        extension: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let copy_failed =
            |e: io::Error| Error::CopyFailed(format!("Writing into {}: {}", dir.display(), e));

        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(copy_failed)?;
        file.write_all(bytes).map_err(copy_failed)?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = match attempt {
                0 => format!("{}-{}.{}", stem, millis, extension),
                n => format!("{}-{}-{}.{}", stem, millis, n, extension),
            };
            let target = dir.join(name);
            match file.persist_noclobber(&target) {
                Ok(_) => return Ok(target),
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => file = e.file,
                Err(e) => return Err(copy_failed(e.error)),
            }
        }

        Err(Error::CopyFailed(format!(
            "No free filename for {}-{}.{} in {}",
            stem,
            millis,
            extension,
            dir.display()
        )))
    }
}

#[async_trait]
impl PersistenceAdapter for DevicePersistence {
    async fn persist(
        &self,
        image: &ImageRef,
        format: Format,
        filename_hint: &str,
    ) -> Result<SavedImage> {
        let dir = self.ensure_images_dir().await?;

        let bytes = source::load_bytes(&self.client, image)
            .await
            .map_err(|e| Error::CopyFailed(format!("Reading {}: {}", image, e)))?;

        let stem = sanitize_hint(filename_hint);
        let millis = Utc::now().timestamp_millis();
        let extension = format.extension();
        let path = tokio::task::spawn_blocking(move || {
            Self::write_unique(&dir, &stem, millis, extension, &bytes)
        })
        .await
        .map_err(|e| Error::CopyFailed(format!("Save task join error: {}", e)))??;

        tracing::info!("Image saved to: {}", path.display());

        Ok(SavedImage::File { path })
    }
}
