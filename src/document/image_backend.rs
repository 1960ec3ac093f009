//! Single-page documents backed by a raster image (scans, screenshots)

use std::io::Cursor;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbaImage};
use log::debug;

use super::backend::{PageDims, RasterBackend, Rasterizer};
use super::source::LoadError;
use crate::render::RenderError;

/// Treats a PNG/JPEG/GIF/WebP image as a one-page document whose unscaled
/// size is the image's pixel size.
pub struct ImageBackend;

impl RasterBackend for ImageBackend {
    fn name(&self) -> &'static str {
        "image"
    }

    fn accepts(&self, bytes: &[u8]) -> bool {
        image::guess_format(bytes).is_ok()
    }

    fn probe(&self, bytes: &[u8]) -> Result<Vec<PageDims>, LoadError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| LoadError::corrupt(format!("unreadable image: {e}")))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| LoadError::corrupt(format!("image header: {e}")))?;
        if width == 0 || height == 0 {
            return Err(LoadError::corrupt("image has zero size"));
        }
        Ok(vec![PageDims::new(width as f32, height as f32)])
    }

    fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn Rasterizer>, RenderError> {
        Ok(Box::new(ImageRasterizer {
            bytes,
            decoded: None,
        }))
    }
}

struct ImageRasterizer {
    bytes: Arc<[u8]>,
    decoded: Option<DynamicImage>,
}

impl ImageRasterizer {
    fn decoded(&mut self) -> Result<&DynamicImage, RenderError> {
        if self.decoded.is_none() {
            let image = image::load_from_memory(&self.bytes)
                .map_err(|e| RenderError::rasterize(1, format!("decode failed: {e}")))?;
            debug!("Decoded image page {}x{}", image.width(), image.height());
            self.decoded = Some(image);
        }
        self.decoded
            .as_ref()
            .ok_or_else(|| RenderError::rasterize(1, "decode produced no image"))
    }
}

impl Rasterizer for ImageRasterizer {
    fn rasterize(&mut self, page: u32, scale: f32) -> Result<RgbaImage, RenderError> {
        if page != 1 {
            return Err(RenderError::PageOutOfRange {
                page,
                page_count: 1,
            });
        }
        let image = self.decoded()?;

        let width = ((image.width() as f32) * scale).round().max(1.0) as u32;
        let height = ((image.height() as f32) * scale).round().max(1.0) as u32;
        if width == image.width() && height == image.height() {
            return Ok(image.to_rgba8());
        }
        Ok(image.resize_exact(width, height, FilterType::Triangle).to_rgba8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn probes_png_dimensions() {
        let bytes = png_bytes(40, 60);
        assert!(ImageBackend.accepts(&bytes));

        let dims = ImageBackend.probe(&bytes).unwrap();
        assert_eq!(dims, vec![PageDims::new(40.0, 60.0)]);
    }

    #[test]
    fn truncated_png_is_corrupt() {
        let bytes = png_bytes(40, 60);
        let truncated = &bytes[..12];

        assert!(ImageBackend.accepts(truncated));
        assert!(matches!(
            ImageBackend.probe(truncated),
            Err(LoadError::Corrupt { .. })
        ));
    }

    #[test]
    fn rasterizes_at_scale() {
        let bytes: Arc<[u8]> = Arc::from(png_bytes(40, 60));
        let mut rasterizer = ImageBackend.open(bytes).unwrap();

        let image = rasterizer.rasterize(1, 2.0).unwrap();
        assert_eq!(image.dimensions(), (80, 120));

        assert!(matches!(
            rasterizer.rasterize(2, 1.0),
            Err(RenderError::PageOutOfRange { page: 2, .. })
        ));
    }
}
