//! Document loading and rasterization backends

mod backend;
mod image_backend;
#[cfg(feature = "pdf")]
mod mupdf_backend;
mod source;

pub use backend::{default_backends, Bitmap, PageDims, PageSize, RasterBackend, Rasterizer};
pub use image_backend::ImageBackend;
#[cfg(feature = "pdf")]
pub use mupdf_backend::MupdfBackend;
pub use source::{
    decode_data_uri, Document, DocumentReference, DocumentSource, LoadError, LoadErrorKind,
    RemoteFetcher, DEFAULT_FETCH_TIMEOUT,
};
