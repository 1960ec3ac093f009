//! Render request and response types

use crate::document::Bitmap;

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Request sent to render workers
#[derive(Debug)]
pub enum RenderRequest {
    /// Rasterize a page
    Page {
        id: RequestId,
        page: u32,
        scale: f32,
        /// Epoch the request was issued under; stale epochs are skipped
        epoch: u64,
    },

    /// Shutdown the worker
    Shutdown,
}

/// Per-page render failure
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("rasterizer unavailable: {detail}")]
    Backend { detail: String },

    #[error("page {page}: {detail}")]
    Rasterize { page: u32, detail: String },
}

impl RenderError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend { detail: msg.into() }
    }

    pub fn rasterize(page: u32, msg: impl Into<String>) -> Self {
        Self::Rasterize {
            page,
            detail: msg.into(),
        }
    }
}

/// Response from render workers
#[derive(Debug)]
pub enum RenderResponse {
    /// Rasterized page
    Page {
        id: RequestId,
        epoch: u64,
        bitmap: Bitmap,
    },

    /// Request skipped because its epoch went stale before it ran
    Cancelled { id: RequestId, page: u32 },

    /// Rasterization failed
    Error {
        id: RequestId,
        page: u32,
        epoch: u64,
        error: RenderError,
    },
}
