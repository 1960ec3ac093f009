//! Rasterization worker - runs in separate thread(s)

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flume::{Receiver, Sender};
use log::{debug, warn};

use super::request::{RenderError, RenderRequest, RenderResponse};
use crate::document::{Bitmap, RasterBackend, Rasterizer};

/// Main worker function - runs in a dedicated thread.
///
/// The rasterizer is opened lazily on the first request so a backend that
/// fails to open reports the failure per page instead of silently dying.
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn render_worker(
    backend: Arc<dyn RasterBackend>,
    bytes: Arc<[u8]>,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
    epoch: Arc<AtomicU64>,
) {
    let mut rasterizer: Option<Box<dyn Rasterizer>> = None;

    for request in requests {
        match request {
            RenderRequest::Page {
                id,
                page,
                scale,
                epoch: request_epoch,
            } => {
                if epoch.load(Ordering::Acquire) != request_epoch {
                    debug!("Skipping stale render of page {page} ({id:?})");
                    let _ = responses.send(RenderResponse::Cancelled { id, page });
                    continue;
                }

                let response = match rasterize_page(&backend, &bytes, &mut rasterizer, page, scale) {
                    Ok(bitmap) => RenderResponse::Page {
                        id,
                        epoch: request_epoch,
                        bitmap,
                    },
                    Err(error) => {
                        warn!("Render of page {page} failed: {error}");
                        RenderResponse::Error {
                            id,
                            page,
                            epoch: request_epoch,
                            error,
                        }
                    }
                };

                if responses.send(response).is_err() {
                    // Service dropped; nobody is listening
                    break;
                }
            }

            RenderRequest::Shutdown => break,
        }
    }
}

fn rasterize_page(
    backend: &Arc<dyn RasterBackend>,
    bytes: &Arc<[u8]>,
    rasterizer: &mut Option<Box<dyn Rasterizer>>,
    page: u32,
    scale: f32,
) -> Result<Bitmap, RenderError> {
    if rasterizer.is_none() {
        *rasterizer = Some(backend.open(Arc::clone(bytes))?);
    }
    let Some(rasterizer) = rasterizer.as_mut() else {
        return Err(RenderError::backend("rasterizer not available"));
    };

    let image = rasterizer.rasterize(page, scale)?;
    Ok(Bitmap { page, scale, image })
}

