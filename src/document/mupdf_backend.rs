//! PDF documents rasterized with MuPDF

use std::sync::Arc;

use image::RgbaImage;
use log::debug;
use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::backend::{PageDims, RasterBackend, Rasterizer};
use super::source::LoadError;
use crate::render::RenderError;

const PDF_MAGIC: &[u8] = b"%PDF-";
const PDF_MIME: &str = "application/pdf";

pub struct MupdfBackend;

impl RasterBackend for MupdfBackend {
    fn name(&self) -> &'static str {
        "mupdf"
    }

    fn accepts(&self, bytes: &[u8]) -> bool {
        // Some producers prepend junk before the header; MuPDF tolerates it
        bytes
            .windows(PDF_MAGIC.len())
            .take(1024)
            .any(|w| w == PDF_MAGIC)
    }

    fn probe(&self, bytes: &[u8]) -> Result<Vec<PageDims>, LoadError> {
        let doc = Document::from_bytes(bytes, PDF_MIME)
            .map_err(|e| LoadError::corrupt(format!("PDF open failed: {e}")))?;
        let page_count = doc
            .page_count()
            .map_err(|e| LoadError::corrupt(format!("PDF page count: {e}")))?;
        if page_count <= 0 {
            return Err(LoadError::corrupt("PDF has no pages"));
        }

        let mut dims = Vec::with_capacity(page_count as usize);
        for index in 0..page_count {
            let page = doc
                .load_page(index)
                .map_err(|e| LoadError::corrupt(format!("PDF page {}: {e}", index + 1)))?;
            let bounds = page
                .bounds()
                .map_err(|e| LoadError::corrupt(format!("PDF page {} bounds: {e}", index + 1)))?;
            dims.push(PageDims::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0));
        }
        debug!("Probed PDF with {page_count} pages");
        Ok(dims)
    }

    fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn Rasterizer>, RenderError> {
        let doc = Document::from_bytes(&bytes, PDF_MIME)
            .map_err(|e| RenderError::backend(format!("PDF open failed: {e}")))?;
        let page_count = doc
            .page_count()
            .map_err(|e| RenderError::backend(format!("PDF page count: {e}")))?;
        Ok(Box::new(MupdfRasterizer {
            doc,
            page_count: page_count.max(0) as u32,
        }))
    }
}

struct MupdfRasterizer {
    doc: Document,
    page_count: u32,
}

impl Rasterizer for MupdfRasterizer {
    fn rasterize(&mut self, page: u32, scale: f32) -> Result<RgbaImage, RenderError> {
        if page == 0 || page > self.page_count {
            return Err(RenderError::PageOutOfRange {
                page,
                page_count: self.page_count,
            });
        }
        let fail = |e: mupdf::error::Error| RenderError::rasterize(page, e.to_string());

        let loaded = self.doc.load_page((page - 1) as i32).map_err(fail)?;
        let rgb = Colorspace::device_rgb();
        let pixmap = loaded
            .to_pixmap(&Matrix::new_scale(scale, scale), &rgb, false, false)
            .map_err(fail)?;

        pixmap_to_rgba(page, &pixmap)
    }
}

fn pixmap_to_rgba(page: u32, pixmap: &Pixmap) -> Result<RgbaImage, RenderError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(RenderError::rasterize(
            page,
            format!("unsupported pixmap format: {n} channels"),
        ));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    let expected_min = stride.saturating_mul(height);
    if samples.len() < expected_min || row_bytes > stride {
        return Err(RenderError::rasterize(page, "pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        let row_start = y * stride;
        let row = &samples[row_start..row_start + row_bytes];
        for px in row.chunks_exact(n) {
            out.extend_from_slice(&px[..3]);
            out.push(if n >= 4 { px[3] } else { 0xFF });
        }
    }

    RgbaImage::from_raw(width as u32, height as u32, out)
        .ok_or_else(|| RenderError::rasterize(page, "pixmap size overflow"))
}
