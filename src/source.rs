//! Resolution of opaque image references into bytes.

use crate::models::ImageRef;
use crate::{Error, Result};
use base64::Engine as _;
use reqwest::Client;
use std::path::PathBuf;

/// Where an [`ImageRef`] points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocation {
    Remote(String),
    Inline { mime: String, data: String },
    Local(PathBuf),
}

impl ImageLocation {
    pub fn parse(image: &ImageRef) -> Result<Self> {
        let raw = image.as_str().trim();
        if image.is_empty() {
            return Err(Error::InvalidState("Empty image reference".to_string()));
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(ImageLocation::Remote(raw.to_string()));
        }

        if let Some(rest) = raw.strip_prefix("data:") {
            let (header, data) = rest.split_once(',').ok_or_else(|| {
                Error::Unsupported("Malformed data URI: missing ','".to_string())
            })?;
            let mime = header.strip_suffix(";base64").ok_or_else(|| {
                Error::Unsupported("Only base64 data URIs are supported".to_string())
            })?;
            return Ok(ImageLocation::Inline {
                mime: mime.to_string(),
                data: data.to_string(),
            });
        }

        if let Some(path) = raw.strip_prefix("file://") {
            return Ok(ImageLocation::Local(PathBuf::from(path)));
        }

        Ok(ImageLocation::Local(PathBuf::from(raw)))
    }
}

/// Reads the bytes behind `image`, fetching remote references with `client`.
pub async fn load_bytes(client: &Client, image: &ImageRef) -> Result<Vec<u8>> {
    match ImageLocation::parse(image)? {
        ImageLocation::Remote(url) => {
            tracing::debug!("Fetching remote image {}", url);
            let response = client.get(&url).send().await.map_err(Error::from_transport)?;
            if !response.status().is_success() {
                return Err(Error::Unreachable(format!(
                    "Fetching {} returned status {}",
                    url,
                    response.status()
                )));
            }
            let bytes = response.bytes().await.map_err(Error::from_transport)?;
            Ok(bytes.to_vec())
        }
        ImageLocation::Inline { data, .. } => base64::engine::general_purpose::STANDARD
            .decode(data.as_bytes())
            .map_err(|e| Error::Unsupported(format!("Failed to decode base64 image: {}", e))),
        ImageLocation::Local(path) => tokio::fs::read(&path).await.map_err(|e| {
            Error::Unreachable(format!("Cannot read image {}: {}", path.display(), e))
        }),
    }
}

/// Encodes bytes as a `data:` URI using the sniffed MIME type.
pub fn to_data_uri(bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{}", detect_image_mime(bytes), encoded)
}

pub fn detect_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, 0x50, 0x4E, 0x47, ..] => "image/png",
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => "image/webp",
        _ => {
            tracing::warn!(
                "Unrecognized image format (first 4 bytes: {:02X?}), falling back to application/octet-stream",
                &bytes[..bytes.len().min(4)]
            );
            "application/octet-stream"
        }
    }
}
