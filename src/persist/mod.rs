//! Persistence of converted images
//!
//! Where a converted image ends up depends on the runtime: a browser gets a
//! download handed to the page, a device gets a file in its cache directory. The
//! variant is picked once when the app is composed.

pub mod browser;
pub mod device;
pub mod mock;

pub use browser::{BrowserPersistence, DownloadRequest};
pub use device::DevicePersistence;
pub use mock::MockPersistence;

use crate::models::{Format, ImageRef};
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Filename stem used when the caller has no better name.
pub const DEFAULT_FILENAME_HINT: &str = "converted-image";

/// Where a persisted image went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SavedImage {
    Download { filename: String },
    File { path: PathBuf },
}

impl fmt::Display for SavedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SavedImage::Download { filename } => write!(f, "download of {}", filename),
            SavedImage::File { path } => write!(f, "{}", path.display()),
        }
    }
}

#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn persist(
        &self,
        image: &ImageRef,
        format: Format,
        filename_hint: &str,
    ) -> Result<SavedImage>;
}

/// Makes a hint safe to use as a single file name component.
pub fn sanitize_hint(hint: &str) -> String {
    let cleaned: String = hint
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        DEFAULT_FILENAME_HINT.to_string()
    } else {
        cleaned
    }
}
