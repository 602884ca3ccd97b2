//! Data models and configuration
//!
//! Defines the image references, target formats and session states shared by the
//! conversion services, the persistence adapters and the session itself.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Target image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Png,
    Jpg,
    Webp,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Jpg => "jpg",
            Format::Webp => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Png => "image/png",
            Format::Jpg => "image/jpeg",
            Format::Webp => "image/webp",
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            Format::Png => image::ImageFormat::Png,
            Format::Jpg => image::ImageFormat::Jpeg,
            Format::Webp => image::ImageFormat::WebP,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Format::Png),
            "jpg" | "jpeg" => Ok(Format::Jpg),
            "webp" => Ok(Format::Webp),
            other => Err(Error::Unsupported(format!(
                "Unknown format '{}'. Expected one of: png, jpg, webp",
                other
            ))),
        }
    }
}

/// Opaque handle to image bytes: a path, `file://`, `http(s)://` or `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<String> for ImageRef {
    fn from(uri: String) -> Self {
        Self(uri)
    }
}

impl From<PathBuf> for ImageRef {
    fn from(path: PathBuf) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    ImageSelected,
    Converting,
    Converted,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::ImageSelected => "image selected",
            SessionStatus::Converting => "converting",
            SessionStatus::Converted => "converted",
            SessionStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runtime environment, which decides how results are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Native,
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" | "browser" => Ok(Platform::Web),
            "native" | "device" | "ios" | "android" => Ok(Platform::Native),
            other => Err(Error::NotConfigured(format!(
                "Invalid PLATFORM '{}'. Expected: web, native",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConversionBackend {
    /// Waits, then echoes the source reference.
    Simulated,
    /// Transcodes on this machine with the `image` crate.
    Local,
    Cloudinary,
}

impl FromStr for ConversionBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" => Ok(ConversionBackend::Simulated),
            "local" => Ok(ConversionBackend::Local),
            "cloudinary" => Ok(ConversionBackend::Cloudinary),
            other => Err(Error::NotConfigured(format!(
                "Invalid CONVERSION_BACKEND '{}'. Expected: simulated, local, cloudinary",
                other
            ))),
        }
    }
}

pub const DEFAULT_CLOUDINARY_BASE_URL: &str = "https://api.cloudinary.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudinaryCredentials {
    pub api_key: String,
    pub cloud_name: String,
    pub upload_preset: Option<String>,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: ConversionBackend,
    pub platform: Platform,
    pub cloudinary_api_key: Option<String>,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_upload_preset: Option<String>,
    pub cloudinary_base_url: String,
    pub conversion_timeout: Duration,
    pub simulated_delay: Duration,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let backend = get("CONVERSION_BACKEND")
            .map(|v| v.parse::<ConversionBackend>())
            .transpose()?
            .unwrap_or(ConversionBackend::Simulated);
        let platform = get("PLATFORM")
            .map(|v| v.parse::<Platform>())
            .transpose()?
            .unwrap_or(Platform::Native);

        let conversion_timeout = Duration::from_secs(parse_number(
            get("CONVERSION_TIMEOUT_SECS"),
            "CONVERSION_TIMEOUT_SECS",
            30,
        )?);
        let simulated_delay = Duration::from_millis(parse_number(
            get("SIMULATED_DELAY_MS"),
            "SIMULATED_DELAY_MS",
            2000,
        )?);

        let cache_dir = get("CACHE_DIR").map(PathBuf::from).unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("image-format-converter")
        });
        let output_dir = get("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| cache_dir.join("converted"));

        Ok(Self {
            backend,
            platform,
            cloudinary_api_key: get("CLOUDINARY_API_KEY"),
            cloudinary_cloud_name: get("CLOUDINARY_CLOUD_NAME"),
            cloudinary_upload_preset: get("CLOUDINARY_UPLOAD_PRESET"),
            cloudinary_base_url: get("CLOUDINARY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_CLOUDINARY_BASE_URL.to_string()),
            conversion_timeout,
            simulated_delay,
            cache_dir,
            output_dir,
        })
    }

    pub fn cloudinary_credentials(&self) -> Result<CloudinaryCredentials> {
        match (&self.cloudinary_api_key, &self.cloudinary_cloud_name) {
            (Some(api_key), Some(cloud_name)) => Ok(CloudinaryCredentials {
                api_key: api_key.clone(),
                cloud_name: cloud_name.clone(),
                upload_preset: self.cloudinary_upload_preset.clone(),
            }),
            _ => Err(Error::NotConfigured(
                "Cloudinary credentials not configured (CLOUDINARY_API_KEY, CLOUDINARY_CLOUD_NAME)"
                    .to_string(),
            )),
        }
    }
}

fn parse_number(value: Option<String>, key: &str, default: u64) -> Result<u64> {
    match value {
        Some(raw) => raw.trim().parse().map_err(|_| {
            Error::NotConfigured(format!("{} must be a whole number, got '{}'", key, raw))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("PNG".parse::<Format>().unwrap(), Format::Png);
        assert_eq!("jpeg".parse::<Format>().unwrap(), Format::Jpg);
        assert_eq!(" webp ".parse::<Format>().unwrap(), Format::Webp);

        let err = "gif".parse::<Format>().unwrap_err();
        assert!(err.to_string().contains("gif"));
    }

    #[test]
    fn test_format_defaults_to_png() {
        assert_eq!(Format::default(), Format::Png);
        assert_eq!(Format::Jpg.extension(), "jpg");
        assert_eq!(Format::Jpg.mime_type(), "image/jpeg");
    }

    #[test]
    fn test_format_serialization() {
        let json = serde_json::to_string(&Format::Webp).unwrap();
        assert_eq!(json, "\"webp\"");
    }

    #[test]
    fn test_image_ref_is_transparent() {
        let image = ImageRef::new("img://a");
        assert_eq!(serde_json::to_string(&image).unwrap(), "\"img://a\"");
        assert!(ImageRef::new("  ").is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.backend, ConversionBackend::Simulated);
        assert_eq!(config.platform, Platform::Native);
        assert_eq!(config.conversion_timeout, Duration::from_secs(30));
        assert_eq!(config.simulated_delay, Duration::from_millis(2000));
        assert_eq!(config.cloudinary_base_url, DEFAULT_CLOUDINARY_BASE_URL);
        assert!(config.output_dir.starts_with(&config.cache_dir));
    }

    #[test]
    fn test_config_reads_overrides() {
        let config = config_from(&[
            ("CONVERSION_BACKEND", "local"),
            ("PLATFORM", "web"),
            ("SIMULATED_DELAY_MS", "5"),
            ("CACHE_DIR", "/tmp/cache"),
        ])
        .unwrap();

        assert_eq!(config.backend, ConversionBackend::Local);
        assert_eq!(config.platform, Platform::Web);
        assert_eq!(config.simulated_delay, Duration::from_millis(5));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/cache/converted"));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let err = config_from(&[("CONVERSION_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));

        let err = config_from(&[("CONVERSION_BACKEND", "ftp")]).unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));
    }

    #[test]
    fn test_missing_cloudinary_credentials_is_not_configured() {
        let config = config_from(&[("CLOUDINARY_API_KEY", "key")]).unwrap();
        let err = config.cloudinary_credentials().unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));

        let config = config_from(&[
            ("CLOUDINARY_API_KEY", "key"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
        ])
        .unwrap();
        let credentials = config.cloudinary_credentials().unwrap();
        assert_eq!(credentials.cloud_name, "demo");
        assert_eq!(credentials.upload_preset, None);
    }
}
