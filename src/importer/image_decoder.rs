use std::path::Path;

use image::DynamicImage;

use crate::importer::ImportError;
use crate::importer::external::{DecodedImage, ImageDecoder};

/// Decodes any format the `image` crate was built with. Images with an alpha channel become RGBA8,
/// everything else RGB8.
#[derive(Debug, Default)]
pub struct ImageFileDecoder;

impl ImageFileDecoder {
    pub fn convert(image: DynamicImage) -> DecodedImage {
        let (width, height) = (image.width(), image.height());
        if image.color().has_alpha() {
            DecodedImage {
                width,
                height,
                num_channels: 4,
                pixels: image.into_rgba8().into_raw(),
            }
        } else {
            DecodedImage {
                width,
                height,
                num_channels: 3,
                pixels: image.into_rgb8().into_raw(),
            }
        }
    }
}

impl ImageDecoder for ImageFileDecoder {
    fn decode_image(&self, path: &Path) -> Result<DecodedImage, ImportError> {
        let image = image::open(path).map_err(|err| ImportError::AssetFileImport {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        Ok(Self::convert(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    pub fn alpha_decides_the_channel_count() {
        let rgb = ImageFileDecoder::convert(DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([1, 2, 3]))));
        assert_eq!((rgb.width, rgb.height, rgb.num_channels), (3, 2, 3));
        assert_eq!(rgb.pixels.len(), 3 * 2 * 3);

        let rgba = ImageFileDecoder::convert(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            2,
            2,
            Rgba([1, 2, 3, 4]),
        )));
        assert_eq!(rgba.num_channels, 4);
        assert_eq!(&rgba.pixels[..4], &[1, 2, 3, 4]);
    }

    #[test]
    pub fn png_files_are_decoded() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pixel.png");
        RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])).save(&path)?;

        let decoded = ImageFileDecoder.decode_image(&path)?;
        assert_eq!((decoded.width, decoded.height, decoded.num_channels), (4, 4, 3));
        assert_eq!(&decoded.pixels[..3], &[10, 20, 30]);
        Ok(())
    }

    #[test]
    pub fn garbage_is_an_import_error() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png")?;

        assert!(matches!(
            ImageFileDecoder.decode_image(&path),
            Err(ImportError::AssetFileImport { .. })
        ));
        Ok(())
    }
}
