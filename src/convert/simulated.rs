use super::ConversionService;
use crate::models::{Format, ImageRef};
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Stand-in backend: waits `delay`, then hands back the source reference unchanged.
pub struct SimulatedConversionService {
    delay: Duration,
}

impl SimulatedConversionService {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedConversionService {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000))
    }
}

#[async_trait]
impl ConversionService for SimulatedConversionService {
    async fn convert(&self, image: &ImageRef, format: Format) -> Result<ImageRef> {
        tracing::debug!(
            "Simulating conversion of {} to {} ({:?})",
            image,
            format,
            self.delay
        );
        tokio::time::sleep(self.delay).await;
        Ok(image.clone())
    }
}
