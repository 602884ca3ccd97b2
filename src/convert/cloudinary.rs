use super::ConversionService;
use crate::models::{CloudinaryCredentials, Format, ImageRef, DEFAULT_CLOUDINARY_BASE_URL};
use crate::source::{self, ImageLocation};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upload request body. Cloudinary converts the stored asset to `format`.
#[derive(Debug, Serialize)]
struct UploadRequest<'a> {
    file: String,
    api_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    upload_preset: Option<&'a str>,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: Option<String>,
    format: Option<String>,
}

pub struct CloudinaryClient {
    client: Client,
    credentials: CloudinaryCredentials,
    base_url: String,
}

impl CloudinaryClient {
    pub fn new(credentials: CloudinaryCredentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new_with_client(credentials, client))
    }

    pub fn new_with_client(credentials: CloudinaryCredentials, client: Client) -> Self {
        Self {
            client,
            credentials,
            base_url: DEFAULT_CLOUDINARY_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/v1_1/{}/image/upload",
            self.base_url, self.credentials.cloud_name
        )
    }

    /// Remote URLs and data URIs go to Cloudinary as-is; local files are inlined.
    async fn upload_source(&self, image: &ImageRef) -> Result<String> {
        match ImageLocation::parse(image)? {
            ImageLocation::Remote(url) => Ok(url),
            ImageLocation::Inline { .. } => Ok(image.as_str().trim().to_string()),
            ImageLocation::Local(_) => {
                let bytes = source::load_bytes(&self.client, image).await?;
                Ok(source::to_data_uri(&bytes))
            }
        }
    }
}

#[async_trait]
impl ConversionService for CloudinaryClient {
    async fn convert(&self, image: &ImageRef, format: Format) -> Result<ImageRef> {
        let request = UploadRequest {
            file: self.upload_source(image).await?,
            api_key: &self.credentials.api_key,
            upload_preset: self.credentials.upload_preset.as_deref(),
            format: format.extension(),
        };

        tracing::debug!("Uploading {} to Cloudinary as {}", image, format);

        let response = self
            .client
            .post(self.upload_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Cloudinary: {}", e);
                Error::from_transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Cloudinary error (status {}): {}", status, error_text);
            let message = format!("Cloudinary error (status {}): {}", status, error_text);
            return Err(match status {
                StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                    Error::Timeout(message)
                }
                // Unsigned requests without an upload preset are rejected as unauthorized.
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Error::NotConfigured(format!(
                        "{} (unsigned uploads need CLOUDINARY_UPLOAD_PRESET)",
                        message
                    ))
                }
                s if s.is_client_error() => Error::Unsupported(message),
                _ => Error::Unreachable(message),
            });
        }

        let body = response.text().await.map_err(Error::from_transport)?;
        let upload: UploadResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Cloudinary response: {}\nBody: {}", e, body);
            Error::Unreachable(format!("Failed to parse Cloudinary response: {}", e))
        })?;

        tracing::debug!(
            "Cloudinary stored {} (public id {:?})",
            upload.secure_url,
            upload.public_id
        );

        if let Some(returned) = upload.format.as_deref() {
            if !returned.eq_ignore_ascii_case(format.extension()) {
                tracing::warn!(
                    "Cloudinary stored format '{}' but '{}' was requested",
                    returned,
                    format
                );
            }
        }

        Ok(ImageRef::new(upload.secure_url))
    }
}
