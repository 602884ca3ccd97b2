use super::{sanitize_hint, PersistenceAdapter, SavedImage};
use crate::models::{Format, ImageRef};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

/// A download the page should start, e.g. by clicking a generated anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub href: String,
    pub filename: String,
    pub mime_type: &'static str,
}

/// Browser persistence: hands downloads to the page over a channel.
///
/// Success means the download was handed off; whether the user kept the file is
/// not observable.
pub struct BrowserPersistence {
    downloads: mpsc::UnboundedSender<DownloadRequest>,
}

impl BrowserPersistence {
    pub fn new(downloads: mpsc::UnboundedSender<DownloadRequest>) -> Self {
        Self { downloads }
    }

    /// Creates the adapter together with the receiving end the page drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DownloadRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl PersistenceAdapter for BrowserPersistence {
    async fn persist(
        &self,
        image: &ImageRef,
        format: Format,
        filename_hint: &str,
    ) -> Result<SavedImage> {
        let filename = format!("{}.{}", sanitize_hint(filename_hint), format.extension());
        let request = DownloadRequest {
            href: image.to_string(),
            filename: filename.clone(),
            mime_type: format.mime_type(),
        };

        self.downloads
            .send(request)
            .map_err(|_| Error::CopyFailed("Download channel closed".to_string()))?;
        tracing::info!("Web download initiated for {}", filename);

        Ok(SavedImage::Download { filename })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::persist::DEFAULT_FILENAME_HINT;

    #[tokio::test]
    async fn test_persist_uses_hint_and_extension() {
        let (adapter, mut downloads) = BrowserPersistence::channel();
        let image = ImageRef::new("blob:https://app.test/1234");

        let saved = adapter.persist(&image, Format::Png, "photo").await.unwrap();

        assert_eq!(
            saved,
            SavedImage::Download {
                filename: "photo.png".to_string()
            }
        );
        let request = downloads.recv().await.unwrap();
        assert_eq!(request.href, "blob:https://app.test/1234");
        assert_eq!(request.filename, "photo.png");
        assert_eq!(request.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_default_hint_gives_converted_image_name() {
        let (adapter, mut downloads) = BrowserPersistence::channel();

        adapter
            .persist(&ImageRef::new("img://a"), Format::Jpg, DEFAULT_FILENAME_HINT)
            .await
            .unwrap();

        assert_eq!(downloads.recv().await.unwrap().filename, "converted-image.jpg");
    }

    #[tokio::test]
    async fn test_closed_channel_fails() {
        let (adapter, downloads) = BrowserPersistence::channel();
        drop(downloads);

        let err = adapter
            .persist(&ImageRef::new("img://a"), Format::Webp, "photo")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CopyFailed);
    }
}
