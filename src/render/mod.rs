//! Page rasterization on background workers
//!
//! Architecture:
//! - Render requests go to worker threads over a flume channel
//! - Workers rasterize pages through the document's backend
//! - The service applies completions, caches bitmaps and owns page state

mod cache;
mod request;
mod service;
mod state;
mod worker;

pub use cache::{CacheKey, PageCache};
pub use request::{RenderError, RenderRequest, RenderResponse, RequestId};
pub use service::{
    DEFAULT_CACHE_SIZE, DEFAULT_WORKERS, PageUpdate, RenderConfig, RenderService,
};
pub use state::{PageEvent, PageRegistry, PageRenderState, PageSlot, PageStatus};
