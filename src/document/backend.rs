//! Pluggable rasterization backends
//!
//! A backend is shared across the render workers. It sniffs and probes raw
//! document bytes on the owner thread, and hands each worker its own
//! [`Rasterizer`] so engines that are not thread-safe can still be used.

use std::sync::Arc;

use image::RgbaImage;

use super::source::LoadError;
use crate::render::RenderError;

/// Unscaled page dimensions as reported by the backend
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageDims {
    pub width: f32,
    pub height: f32,
}

impl PageDims {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Page size in pixels at a given scale
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    /// 1-based page number
    pub page_number: u32,
    pub width_px: f32,
    pub height_px: f32,
}

impl PageSize {
    #[must_use]
    pub fn from_dims(page_number: u32, dims: PageDims, scale: f32) -> Self {
        Self {
            page_number,
            width_px: dims.width * scale,
            height_px: dims.height * scale,
        }
    }
}

/// A rasterized page
#[derive(Clone)]
pub struct Bitmap {
    /// 1-based page number
    pub page: u32,
    /// Scale the page was rasterized at
    pub scale: f32,
    pub image: RgbaImage,
}

impl Bitmap {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("page", &self.page)
            .field("scale", &self.scale)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish_non_exhaustive()
    }
}

/// Per-worker page rasterizer
pub trait Rasterizer {
    /// Rasterize a 1-based page at `scale` into RGBA pixels
    fn rasterize(&mut self, page: u32, scale: f32) -> Result<RgbaImage, RenderError>;
}

/// Document format capability shared by the loader and all workers
pub trait RasterBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap content sniff: does this backend claim these bytes?
    fn accepts(&self, bytes: &[u8]) -> bool;

    /// Parse the bytes far enough to learn page count and page sizes
    fn probe(&self, bytes: &[u8]) -> Result<Vec<PageDims>, LoadError>;

    /// Open a rasterizer over the bytes. Called on the worker thread.
    fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn Rasterizer>, RenderError>;
}

/// Backends compiled into this build, in sniffing order
#[must_use]
pub fn default_backends() -> Vec<Arc<dyn RasterBackend>> {
    let mut backends: Vec<Arc<dyn RasterBackend>> = Vec::new();
    #[cfg(feature = "pdf")]
    backends.push(Arc::new(super::mupdf_backend::MupdfBackend));
    backends.push(Arc::new(super::image_backend::ImageBackend));
    backends
}
