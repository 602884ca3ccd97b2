//! Image conversion backends
//!
//! A [`ConversionService`] takes a source image reference and a target format and
//! produces a reference to the converted image. Each call is a single attempt;
//! retrying is left to the caller.

pub mod cloudinary;
pub mod local;
pub mod mock;
pub mod simulated;

pub use cloudinary::CloudinaryClient;
pub use local::LocalConversionService;
pub use mock::MockConversionService;
pub use simulated::SimulatedConversionService;

use crate::models::{Format, ImageRef};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ConversionService: Send + Sync {
    async fn convert(&self, image: &ImageRef, format: Format) -> Result<ImageRef>;
}
