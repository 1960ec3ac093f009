//! Render service - manages the worker pool, page registry and bitmap cache
//!
//! The service is the sole mutator of per-page render state. Workers only
//! rasterize; their completions are applied here, on the owner's thread,
//! in `poll` or `settle`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use log::{debug, info, trace, warn};

use super::cache::{CacheKey, PageCache};
use super::request::{RenderError, RenderRequest, RenderResponse, RequestId};
use super::state::{PageEvent, PageRegistry, PageRenderState, PageStatus};
use super::worker::render_worker;
use crate::document::{Bitmap, Document};

/// Default number of rasterization threads
pub const DEFAULT_WORKERS: usize = 2;
/// Default number of page bitmaps held at once
pub const DEFAULT_CACHE_SIZE: usize = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    pub workers: usize,
    pub cache_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            cache_capacity: DEFAULT_CACHE_SIZE,
        }
    }
}

/// Outcome of applying a worker response
#[derive(Clone, Debug, PartialEq)]
pub enum PageUpdate {
    Ready(u32),
    Failed(u32, RenderError),
}

/// Per-document rendering engine: `ensure_rendered` is its entry point
pub struct RenderService {
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    epoch: Arc<AtomicU64>,
    scale: f32,
    registry: PageRegistry,
    cache: PageCache,
    in_flight: HashMap<RequestId, u32>,
    next_request_id: u64,
    num_workers: usize,
    requests_sent: u64,
    updates: Vec<PageUpdate>,
    generation: u64,
}

impl RenderService {
    /// Spawn workers for a document
    #[must_use]
    pub fn new(document: &Document, config: RenderConfig, scale: f32) -> Self {
        // flume gives MPMC: every worker pulls from the one request queue
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();
        let epoch = Arc::new(AtomicU64::new(0));

        let num_workers = config.workers.max(1);
        for _ in 0..num_workers {
            let backend = Arc::clone(document.backend());
            let bytes = Arc::clone(document.bytes());
            let rx = request_rx.clone();
            let tx = response_tx.clone();
            let epoch = Arc::clone(&epoch);

            std::thread::spawn(move || {
                render_worker(backend, bytes, rx, tx, epoch);
            });
        }

        info!(
            "Render service for document {} started with {num_workers} workers",
            document.generation()
        );

        Self {
            request_tx,
            response_rx,
            epoch,
            scale: sanitize_scale(scale),
            registry: PageRegistry::new(document.page_count()),
            cache: PageCache::new(config.cache_capacity),
            in_flight: HashMap::new(),
            next_request_id: 1,
            num_workers,
            requests_sent: 0,
            updates: Vec::new(),
            generation: document.generation(),
        }
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.registry.page_count()
    }

    /// Generation of the document this service renders
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Total rasterization requests sent to workers
    #[must_use]
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    /// Make sure a page is rendered at `scale`.
    ///
    /// Returns immediately: a ready page at the same scale is a cache hit,
    /// a page already rendering is coalesced onto the in-flight request,
    /// a pending page gets exactly one new request. A failed page keeps its
    /// error until [`RenderService::retry_page`]. A different scale first
    /// invalidates every page (see [`RenderService::set_scale`]).
    pub fn ensure_rendered(&mut self, page: u32, scale: f32) -> PageRenderState {
        let scale = sanitize_scale(scale);
        if page == 0 || page > self.page_count() {
            return PageRenderState {
                page_number: page,
                scale,
                status: PageStatus::Error,
                bitmap: None,
                error: Some(RenderError::PageOutOfRange {
                    page,
                    page_count: self.page_count(),
                }),
            };
        }

        self.set_scale(scale);

        match self.registry.status(page) {
            PageStatus::Ready => {
                if self.cache.get(&CacheKey::new(page, self.scale)).is_some() {
                    trace!("Cache hit for page {page}");
                    return self.snapshot(page);
                }
                // Bitmap was evicted behind our back
                self.registry.apply(page, PageEvent::Invalidated);
                self.request_page(page);
            }
            PageStatus::Rendering => {
                trace!("Coalescing render of page {page}");
            }
            PageStatus::Pending => {
                self.request_page(page);
            }
            PageStatus::Error => {
                trace!("Page {page} failed earlier, not retrying");
            }
        }

        self.snapshot(page)
    }

    /// Rasterize a failed page again at the current scale
    pub fn retry_page(&mut self, page: u32) -> PageRenderState {
        if self.registry.status(page) == PageStatus::Error {
            debug!("Retrying page {page}");
            self.registry.apply(page, PageEvent::Invalidated);
        }
        self.ensure_rendered(page, self.scale)
    }

    /// Change the render scale. Every cached bitmap and every in-flight
    /// render for the old scale is invalidated; workers skip queued work
    /// from the old epoch and stale completions are discarded on receipt.
    ///
    /// Returns true when the scale actually changed.
    pub fn set_scale(&mut self, scale: f32) -> bool {
        let scale = sanitize_scale(scale);
        if (self.scale - scale).abs() <= f32::EPSILON {
            return false;
        }

        info!("Render scale {} -> {scale}", self.scale);
        self.scale = scale;
        self.bump_epoch();
        self.registry.invalidate_all();
        self.cache.invalidate_all();
        true
    }

    /// Release bitmaps of ready pages outside `window` to bound memory
    pub fn release_outside(&mut self, window: &BTreeSet<u32>) -> Vec<u32> {
        let released: Vec<u32> = self
            .registry
            .pages_with(PageStatus::Ready)
            .filter(|page| !window.contains(page))
            .collect();

        for &page in &released {
            self.cache.invalidate_page(page);
            self.registry.apply(page, PageEvent::Invalidated);
        }
        if !released.is_empty() {
            debug!("Released {} page bitmaps outside the window", released.len());
        }
        released
    }

    /// Current state of a page without requesting anything
    #[must_use]
    pub fn snapshot(&self, page: u32) -> PageRenderState {
        let slot = self.registry.get(page);
        let status = slot.map(|s| s.status).unwrap_or_default();
        let bitmap = if status == PageStatus::Ready {
            self.cache.peek(&CacheKey::new(page, self.scale))
        } else {
            None
        };

        PageRenderState {
            page_number: page,
            scale: slot.map_or(self.scale, |s| s.scale),
            status,
            bitmap,
            error: slot.and_then(|s| s.error.clone()),
        }
    }

    #[must_use]
    pub fn status(&self, page: u32) -> PageStatus {
        self.registry.status(page)
    }

    /// Ready bitmap for a page at the current scale
    #[must_use]
    pub fn bitmap(&self, page: u32) -> Option<Arc<Bitmap>> {
        if self.registry.status(page) != PageStatus::Ready {
            return None;
        }
        self.cache.peek(&CacheKey::new(page, self.scale))
    }

    /// Apply every completed response and return the resulting updates
    pub fn poll(&mut self) -> Vec<PageUpdate> {
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response);
        }
        std::mem::take(&mut self.updates)
    }

    /// Block until `page` settles (ready or error) or `timeout` passes.
    ///
    /// Updates for other pages received meanwhile are kept for the next
    /// `poll`.
    pub fn settle(&mut self, page: u32, timeout: Duration) -> PageRenderState {
        let deadline = Instant::now() + timeout;
        loop {
            while let Ok(response) = self.response_rx.try_recv() {
                self.handle_response(response);
            }
            let state = self.snapshot(page);
            if state.is_settled() || state.status == PageStatus::Pending {
                return state;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return state;
            }
            match self.response_rx.recv_timeout(remaining) {
                Ok(response) => self.handle_response(response),
                Err(_) => return self.snapshot(page),
            }
        }
    }

    fn handle_response(&mut self, response: RenderResponse) {
        let current_epoch = self.epoch.load(Ordering::Acquire);
        match response {
            RenderResponse::Page { id, epoch, bitmap } => {
                let Some(page) = self.in_flight.remove(&id) else {
                    trace!("Dropping response for unknown request {id:?}");
                    return;
                };
                if epoch != current_epoch {
                    debug!("Dropping stale bitmap for page {page} (epoch {epoch})");
                    return;
                }

                let (_, evicted) = self.cache.insert(CacheKey::new(page, bitmap.scale), bitmap);
                if let Some(evicted) = evicted {
                    debug!("Evicted page {} from bitmap cache", evicted.page);
                    self.registry.apply(evicted.page, PageEvent::Invalidated);
                }

                if self
                    .registry
                    .apply(page, PageEvent::LoadSucceeded { request: id })
                {
                    self.updates.push(PageUpdate::Ready(page));
                } else {
                    self.cache.invalidate_page(page);
                }
            }

            RenderResponse::Error {
                id,
                page,
                epoch,
                error,
            } => {
                if self.in_flight.remove(&id).is_none() || epoch != current_epoch {
                    trace!("Dropping stale failure for page {page}");
                    return;
                }
                if self.registry.apply(
                    page,
                    PageEvent::LoadFailed {
                        request: id,
                        error: error.clone(),
                    },
                ) {
                    self.updates.push(PageUpdate::Failed(page, error));
                }
            }

            RenderResponse::Cancelled { id, page } => {
                self.in_flight.remove(&id);
                let still_waiting = self
                    .registry
                    .get(page)
                    .is_some_and(|slot| slot.request == Some(id));
                if still_waiting {
                    self.registry.apply(page, PageEvent::Invalidated);
                }
            }
        }
    }

    fn request_page(&mut self, page: u32) -> RequestId {
        let id = self.next_id();
        let epoch = self.epoch.load(Ordering::Acquire);

        if self
            .request_tx
            .send(RenderRequest::Page {
                id,
                page,
                scale: self.scale,
                epoch,
            })
            .is_err()
        {
            warn!("Render workers are gone; page {page} cannot be rendered");
        }
        self.registry.apply(
            page,
            PageEvent::LoadRequested {
                request: id,
                scale: self.scale,
            },
        );
        self.in_flight.insert(id, page);
        self.requests_sent += 1;

        id
    }

    fn bump_epoch(&mut self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.in_flight.clear();
    }

    /// Cancel queued work and stop all workers
    pub fn shutdown(&mut self) {
        self.bump_epoch();
        for _ in 0..self.num_workers {
            let _ = self.request_tx.send(RenderRequest::Shutdown);
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for RenderService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sanitize_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{synthetic_document, SyntheticBackend};

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn concurrent_requests_are_coalesced() {
        let backend = SyntheticBackend::new(3);
        let document = synthetic_document(&backend);
        let mut service = RenderService::new(&document, RenderConfig::default(), 1.0);

        for _ in 0..10 {
            let state = service.ensure_rendered(2, 1.0);
            assert_eq!(state.status, PageStatus::Rendering);
        }
        assert_eq!(service.requests_sent(), 1);

        let state = service.settle(2, WAIT);
        assert_eq!(state.status, PageStatus::Ready);
        assert_eq!(backend.rasterizations(), 1);
    }

    #[test]
    fn ready_page_is_a_cache_hit() {
        let backend = SyntheticBackend::new(2);
        let document = synthetic_document(&backend);
        let mut service = RenderService::new(&document, RenderConfig::default(), 1.0);

        service.ensure_rendered(1, 1.0);
        service.settle(1, WAIT);
        let state = service.ensure_rendered(1, 1.0);

        assert_eq!(state.status, PageStatus::Ready);
        assert!(state.bitmap.is_some());
        assert_eq!(service.requests_sent(), 1);
        assert_eq!(backend.rasterizations(), 1);
    }

    #[test]
    fn scale_change_rerasterizes() {
        let backend = SyntheticBackend::new(2);
        let document = synthetic_document(&backend);
        let mut service = RenderService::new(&document, RenderConfig::default(), 1.0);

        service.ensure_rendered(1, 1.0);
        let first = service.settle(1, WAIT);
        let first_width = first.bitmap.as_ref().map(|b| b.width());

        let state = service.ensure_rendered(1, 2.0);
        assert_eq!(state.status, PageStatus::Rendering);
        let second = service.settle(1, WAIT);

        let bitmap = second.bitmap.expect("page rendered at new scale");
        assert_eq!(bitmap.scale, 2.0);
        assert_eq!(Some(bitmap.width() / 2), first_width);
    }

    #[test]
    fn stale_scale_never_lands() {
        let backend = SyntheticBackend::new(1).with_delay(Duration::from_millis(30));
        let document = synthetic_document(&backend);
        let mut service = RenderService::new(&document, RenderConfig::default(), 1.0);

        service.ensure_rendered(1, 1.0);
        assert!(service.set_scale(1.5));
        service.ensure_rendered(1, 1.5);

        let state = service.settle(1, WAIT);
        let bitmap = state.bitmap.expect("rendered");
        assert_eq!(bitmap.scale, 1.5);

        // Let any old-epoch work drain; it must not replace the new bitmap
        std::thread::sleep(Duration::from_millis(80));
        service.poll();
        let bitmap = service.bitmap(1).expect("still ready");
        assert_eq!(bitmap.scale, 1.5);
    }

    #[test]
    fn failing_page_degrades_alone() {
        let backend = SyntheticBackend::new(3).failing_on(2);
        let document = synthetic_document(&backend);
        let mut service = RenderService::new(&document, RenderConfig::default(), 1.0);

        service.ensure_rendered(2, 1.0);
        service.ensure_rendered(3, 1.0);
        let failed = service.settle(2, WAIT);
        let ok = service.settle(3, WAIT);

        assert_eq!(failed.status, PageStatus::Error);
        assert!(failed.error.is_some());
        assert_eq!(ok.status, PageStatus::Ready);

        let updates = service.poll();
        assert!(updates.contains(&PageUpdate::Ready(3)));
        assert!(updates.iter().any(|u| matches!(u, PageUpdate::Failed(2, _))));
    }

    #[test]
    fn failed_page_stays_failed_until_retried() {
        let backend = SyntheticBackend::new(2).failing_on(2);
        let document = synthetic_document(&backend);
        let mut service = RenderService::new(&document, RenderConfig::default(), 1.0);

        service.ensure_rendered(2, 1.0);
        assert_eq!(service.settle(2, WAIT).status, PageStatus::Error);

        for _ in 0..5 {
            let state = service.ensure_rendered(2, 1.0);
            assert_eq!(state.status, PageStatus::Error);
            assert!(state.error.is_some());
        }
        assert_eq!(service.requests_sent(), 1);
        assert_eq!(backend.rasterizations(), 1);

        assert_eq!(service.retry_page(2).status, PageStatus::Rendering);
        assert_eq!(service.settle(2, WAIT).status, PageStatus::Error);
        assert_eq!(backend.rasterizations(), 2);
    }

    #[test]
    fn out_of_range_page_reports_error() {
        let backend = SyntheticBackend::new(2);
        let document = synthetic_document(&backend);
        let mut service = RenderService::new(&document, RenderConfig::default(), 1.0);

        let state = service.ensure_rendered(5, 1.0);
        assert_eq!(state.status, PageStatus::Error);
        assert_eq!(service.requests_sent(), 0);
    }

    #[test]
    fn lru_eviction_returns_page_to_pending() {
        let backend = SyntheticBackend::new(3);
        let document = synthetic_document(&backend);
        let config = RenderConfig {
            workers: 1,
            cache_capacity: 2,
        };
        let mut service = RenderService::new(&document, config, 1.0);

        for page in 1..=3 {
            service.ensure_rendered(page, 1.0);
            service.settle(page, WAIT);
        }

        assert_eq!(service.status(1), PageStatus::Pending);
        assert_eq!(service.status(2), PageStatus::Ready);
        assert_eq!(service.status(3), PageStatus::Ready);
    }

    #[test]
    fn release_outside_window_frees_bitmaps() {
        let backend = SyntheticBackend::new(4);
        let document = synthetic_document(&backend);
        let mut service = RenderService::new(&document, RenderConfig::default(), 1.0);

        for page in 1..=4 {
            service.ensure_rendered(page, 1.0);
            service.settle(page, WAIT);
        }

        let window: BTreeSet<u32> = [3, 4].into_iter().collect();
        let released = service.release_outside(&window);

        assert_eq!(released, vec![1, 2]);
        assert!(service.bitmap(1).is_none());
        assert!(service.bitmap(3).is_some());
    }
}
