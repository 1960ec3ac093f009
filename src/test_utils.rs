//! Synthetic rasterization backend for tests
//!
//! Claims any buffer starting with [`SYNTHETIC_MAGIC`], reports a fixed
//! number of equally sized pages, and counts every rasterization so tests
//! can assert on coalescing and cache hits.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{Rgba, RgbaImage};

use crate::document::{
    Document, DocumentReference, DocumentSource, LoadError, PageDims, RasterBackend, Rasterizer,
};
use crate::render::RenderError;

pub const SYNTHETIC_MAGIC: &[u8] = b"SYNTHETIC";

/// Page background painted by the synthetic rasterizer
pub const PAGE_COLOR: Rgba<u8> = Rgba([250, 250, 250, 255]);

#[derive(Clone)]
pub struct SyntheticBackend {
    page_count: u32,
    dims: PageDims,
    delay: Option<Duration>,
    failing: Arc<Vec<u32>>,
    rasterizations: Arc<AtomicUsize>,
}

impl SyntheticBackend {
    #[must_use]
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            dims: PageDims::new(100.0, 140.0),
            delay: None,
            failing: Arc::new(Vec::new()),
            rasterizations: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn with_dims(mut self, width: f32, height: f32) -> Self {
        self.dims = PageDims::new(width, height);
        self
    }

    /// Sleep this long inside every rasterization
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make rasterizing `page` fail
    #[must_use]
    pub fn failing_on(mut self, page: u32) -> Self {
        let mut failing = (*self.failing).clone();
        failing.push(page);
        self.failing = Arc::new(failing);
        self
    }

    /// Rasterizations performed so far, across all workers
    #[must_use]
    pub fn rasterizations(&self) -> usize {
        self.rasterizations.load(Ordering::SeqCst)
    }

    /// Buffer this backend claims
    #[must_use]
    pub fn bytes(&self) -> Arc<[u8]> {
        let mut bytes = SYNTHETIC_MAGIC.to_vec();
        bytes.extend_from_slice(&self.page_count.to_le_bytes());
        Arc::from(bytes)
    }

    #[must_use]
    pub fn reference(&self) -> DocumentReference {
        DocumentReference::Buffer(self.bytes())
    }

    /// Document source that only knows this backend
    #[must_use]
    pub fn source(&self) -> DocumentSource {
        DocumentSource::with_backends(vec![Arc::new(self.clone())], Duration::from_secs(1))
    }
}

impl RasterBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn accepts(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(SYNTHETIC_MAGIC)
    }

    fn probe(&self, bytes: &[u8]) -> Result<Vec<PageDims>, LoadError> {
        if bytes.len() < SYNTHETIC_MAGIC.len() + 4 {
            return Err(LoadError::corrupt("synthetic buffer truncated"));
        }
        Ok(vec![self.dims; self.page_count as usize])
    }

    fn open(&self, _bytes: Arc<[u8]>) -> Result<Box<dyn Rasterizer>, RenderError> {
        Ok(Box::new(self.clone()))
    }
}

impl Rasterizer for SyntheticBackend {
    fn rasterize(&mut self, page: u32, scale: f32) -> Result<RgbaImage, RenderError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.rasterizations.fetch_add(1, Ordering::SeqCst);

        if page == 0 || page > self.page_count {
            return Err(RenderError::PageOutOfRange {
                page,
                page_count: self.page_count,
            });
        }
        if self.failing.contains(&page) {
            return Err(RenderError::rasterize(page, "synthetic failure"));
        }

        let width = (self.dims.width * scale).round().max(1.0) as u32;
        let height = (self.dims.height * scale).round().max(1.0) as u32;
        Ok(RgbaImage::from_pixel(width, height, PAGE_COLOR))
    }
}

/// Load a document through `backend`
///
/// # Panics
/// When the synthetic buffer is rejected, which would be a bug in this module.
#[must_use]
pub fn synthetic_document(backend: &SyntheticBackend) -> Document {
    backend
        .source()
        .load(&backend.reference())
        .expect("synthetic document loads")
}
