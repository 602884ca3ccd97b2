use super::{sanitize_hint, PersistenceAdapter, SavedImage};
use crate::models::{Format, ImageRef};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistCall {
    pub image: ImageRef,
    pub format: Format,
    pub filename_hint: String,
}

/// Records persist calls instead of touching any storage.
#[derive(Clone)]
pub struct MockPersistence {
    calls: Arc<Mutex<Vec<PersistCall>>>,
    failures_remaining: Arc<Mutex<usize>>,
}

impl MockPersistence {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failures_remaining: Arc::new(Mutex::new(0)),
        }
    }

    /// Makes the next `count` calls fail with `CopyFailed`.
    pub fn with_failures(self, count: usize) -> Self {
        *self.failures_remaining.lock().unwrap() = count;
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn get_calls(&self) -> Vec<PersistCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceAdapter for MockPersistence {
    async fn persist(
        &self,
        image: &ImageRef,
        format: Format,
        filename_hint: &str,
    ) -> Result<SavedImage> {
        self.calls.lock().unwrap().push(PersistCall {
            image: image.clone(),
            format,
            filename_hint: filename_hint.to_string(),
        });

        let mut failures = self.failures_remaining.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(Error::CopyFailed("Mock failure".to_string()));
        }

        Ok(SavedImage::Download {
            filename: format!("{}.{}", sanitize_hint(filename_hint), format.extension()),
        })
    }
}
