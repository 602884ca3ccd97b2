use super::ConversionService;
use crate::models::{Format, ImageRef};
use crate::source::{self, ImageLocation};
use crate::{Error, Result};
use async_trait::async_trait;
use image::DynamicImage;
use reqwest::Client;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Transcodes images on this machine and writes the results under `output_dir`.
pub struct LocalConversionService {
    client: Client,
    output_dir: PathBuf,
}

impl LocalConversionService {
    pub fn new(output_dir: &Path) -> Self {
        Self::new_with_client(output_dir, Client::new())
    }

    pub fn new_with_client(output_dir: &Path, client: Client) -> Self {
        Self {
            client,
            output_dir: output_dir.to_path_buf(),
        }
    }

    fn encode(image: DynamicImage, format: Format) -> Result<Vec<u8>> {
        // JPEG has no alpha channel and the WebP encoder only takes 8-bit RGB(A).
        let image = match format {
            Format::Jpg => DynamicImage::ImageRgb8(image.to_rgb8()),
            Format::Webp => DynamicImage::ImageRgba8(image.to_rgba8()),
            Format::Png => image,
        };

        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format.image_format())?;
        Ok(bytes)
    }

    fn convert_sync(data: Vec<u8>, format: Format, target: PathBuf) -> Result<PathBuf> {
        let image = image::load_from_memory(&data)?;
        let encoded = Self::encode(image, format)?;

        let dir = target
            .parent()
            .ok_or_else(|| Error::Invariant(format!("No parent for {}", target.display())))?;
        let write_failed =
            |e: std::io::Error| Error::Unreachable(format!("Writing {}: {}", target.display(), e));
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_failed)?;
        file.write_all(&encoded).map_err(write_failed)?;
        file.persist(&target).map_err(|e| write_failed(e.error))?;
        Ok(target)
    }
}

fn stem_for(image: &ImageRef) -> String {
    let name = match ImageLocation::parse(image) {
        Ok(ImageLocation::Local(path)) => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned()),
        Ok(ImageLocation::Remote(url)) => url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .and_then(|segment| segment.split('.').next())
            .map(str::to_string),
        _ => None,
    };

    name.filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "image".to_string())
}

#[async_trait]
impl ConversionService for LocalConversionService {
    async fn convert(&self, image: &ImageRef, format: Format) -> Result<ImageRef> {
        let data = source::load_bytes(&self.client, image).await?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| {
                Error::Unreachable(format!(
                    "Cannot create output directory {}: {}",
                    self.output_dir.display(),
                    e
                ))
            })?;

        let filename = format!("{}_{}.{}", stem_for(image), Uuid::new_v4(), format.extension());
        let target = self.output_dir.join(filename);
        tracing::debug!("Transcoding {} to {}", image, target.display());

        let path = tokio::task::spawn_blocking(move || Self::convert_sync(data, format, target))
            .await
            .map_err(|e| Error::Invariant(format!("Conversion task join error: {}", e)))??;

        Ok(ImageRef::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use image::ImageFormat;
    use tempfile::TempDir;

    fn create_test_image(dir: &Path) -> PathBuf {
        let img = image::RgbaImage::from_pixel(10, 10, image::Rgba([255, 0, 0, 128]));
        let path = dir.join("sample.png");
        img.save_with_format(&path, ImageFormat::Png).unwrap();
        path
    }

    #[tokio::test]
    async fn test_converts_png_to_each_format() {
        let input_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        let source = ImageRef::from(create_test_image(input_dir.path()));
        let service = LocalConversionService::new(output_dir.path());

        for (format, expected) in [
            (Format::Jpg, ImageFormat::Jpeg),
            (Format::Webp, ImageFormat::WebP),
            (Format::Png, ImageFormat::Png),
        ] {
            let result = service.convert(&source, format).await.unwrap();
            let path = PathBuf::from(result.as_str());

            assert!(path.starts_with(output_dir.path()));
            assert!(result.as_str().ends_with(&format!(".{}", format.extension())));

            let bytes = std::fs::read(&path).unwrap();
            assert_eq!(image::guess_format(&bytes).unwrap(), expected);

            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (10, 10));
        }
    }

    #[tokio::test]
    async fn test_output_names_use_source_stem_and_are_unique() {
        let input_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        let source = ImageRef::from(create_test_image(input_dir.path()));
        let service = LocalConversionService::new(output_dir.path());

        let first = service.convert(&source, Format::Png).await.unwrap();
        let second = service.convert(&source, Format::Png).await.unwrap();

        assert_ne!(first, second);
        let name = Path::new(first.as_str()).file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("sample_"));
    }

    #[tokio::test]
    async fn test_creates_missing_output_dir() {
        let input_dir = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let output_dir = root.path().join("nested").join("converted");
        let source = ImageRef::from(create_test_image(input_dir.path()));

        let service = LocalConversionService::new(&output_dir);
        service.convert(&source, Format::Jpg).await.unwrap();

        assert!(output_dir.is_dir());
    }

    #[tokio::test]
    async fn test_undecodable_input_is_unsupported() {
        let input_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        let path = input_dir.path().join("notes.txt");
        std::fs::write(&path, b"definitely not pixels").unwrap();

        let service = LocalConversionService::new(output_dir.path());
        let err = service
            .convert(&ImageRef::from(path), Format::Png)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_blocked_output_dir_is_unreachable() {
        let input_dir = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let blocker = root.path().join("out");
        std::fs::write(&blocker, b"a file, not a directory").unwrap();
        let source = ImageRef::from(create_test_image(input_dir.path()));

        let service = LocalConversionService::new(&blocker);
        let err = service.convert(&source, Format::Png).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }

    #[tokio::test]
    async fn test_missing_source_is_unreachable() {
        let input_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        let service = LocalConversionService::new(output_dir.path());

        let err = service
            .convert(&ImageRef::from(input_dir.path().join("gone.png")), Format::Webp)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }

    #[test]
    fn test_stem_for_references() {
        assert_eq!(stem_for(&ImageRef::new("/photos/cat.heic")), "cat");
        assert_eq!(
            stem_for(&ImageRef::new("https://cdn.test/a/dog.png?v=2")),
            "dog"
        );
        assert_eq!(stem_for(&ImageRef::new("data:image/png;base64,AAAA")), "image");
    }
}
