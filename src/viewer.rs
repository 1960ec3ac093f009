//! The evidence viewer engine
//!
//! `EvidenceViewer` owns the loaded document, its render service, the
//! evidence index, the virtualizer, the selection cell and the overlays.
//! Hosts feed it signals (visibility, pointer, list selection), call
//! [`EvidenceViewer::pump`] to apply finished renders, and read back page
//! views and events.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use log::{debug, error, info};

use crate::document::{Bitmap, Document, DocumentReference, DocumentSource, LoadError};
use crate::evidence::{CategoryFilter, EvidenceIndex, EvidenceItem, EvidenceList};
use crate::export::ExportPayload;
use crate::hit_test::hit_test;
use crate::overlay::{self, Highlight, Overlay, OverlayRenderer, OverlayStyle};
use crate::render::{
    DEFAULT_CACHE_SIZE, DEFAULT_WORKERS, PageRenderState, PageStatus, PageUpdate, RenderConfig,
    RenderError, RenderService,
};
use crate::selection::{SelectionCommand, SelectionEffect, SelectionState, SelectionSynchronizer};
use crate::viewport::{Placeholder, ViewportVirtualizer, VirtualizerConfig};

#[derive(Clone, Debug, PartialEq)]
pub struct ViewerConfig {
    pub scale: f32,
    pub render: RenderConfig,
    pub viewport: VirtualizerConfig,
    pub overlay: OverlayStyle,
    pub fetch_timeout: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            render: RenderConfig {
                workers: DEFAULT_WORKERS,
                cache_capacity: DEFAULT_CACHE_SIZE,
            },
            viewport: VirtualizerConfig::default(),
            overlay: OverlayStyle::default(),
            fetch_timeout: crate::document::DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// What to show instead of the viewer when the document cannot load
#[derive(Clone, Debug, PartialEq)]
pub struct FallbackView {
    /// The reference as given, for a plain embedded view of the raw source
    pub reference: DocumentReference,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum ViewerStatus {
    #[default]
    Empty,
    Ready {
        page_count: u32,
    },
    Failed {
        error: LoadError,
        fallback: FallbackView,
    },
}

/// Notifications for the host
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    EvidenceClicked(EvidenceItem),
    EvidenceHovered(Option<EvidenceItem>),
    ScrollTo { page: u32, offset_px: f32 },
    PageReady(u32),
    PageFailed { page: u32, error: RenderError },
}

/// How a page should be shown right now
#[derive(Clone, Debug)]
pub enum PageView {
    Rendered {
        page: u32,
        bitmap: Arc<Bitmap>,
        highlights: Vec<Highlight>,
    },
    Placeholder {
        placeholder: Placeholder,
        status: PageStatus,
        error: Option<RenderError>,
    },
}

pub struct EvidenceViewer {
    config: ViewerConfig,
    source: DocumentSource,
    reference: Option<DocumentReference>,
    document: Option<Document>,
    service: Option<RenderService>,
    scale: f32,
    index: EvidenceIndex,
    virtualizer: ViewportVirtualizer,
    selection: SelectionSynchronizer,
    overlays: OverlayRenderer,
    /// Pages whose overlay must be redrawn once their bitmap is ready
    dirty: BTreeSet<u32>,
    events: Vec<ViewerEvent>,
    status: ViewerStatus,
}

impl EvidenceViewer {
    #[must_use]
    pub fn new(config: ViewerConfig) -> Self {
        let source = DocumentSource::new(config.fetch_timeout);
        Self::with_source(config, source)
    }

    /// Viewer resolving documents through a custom source
    #[must_use]
    pub fn with_source(config: ViewerConfig, source: DocumentSource) -> Self {
        Self {
            scale: config.scale,
            virtualizer: ViewportVirtualizer::new(config.viewport),
            overlays: OverlayRenderer::new(config.overlay),
            config,
            source,
            reference: None,
            document: None,
            service: None,
            index: EvidenceIndex::default(),
            selection: SelectionSynchronizer::new(),
            dirty: BTreeSet::new(),
            events: Vec::new(),
            status: ViewerStatus::Empty,
        }
    }

    /// Load a document, replacing the current one.
    ///
    /// Failure is also recorded as [`ViewerStatus::Failed`]; nothing of the
    /// previous document survives either way.
    pub fn load(&mut self, reference: DocumentReference) -> Result<u32, LoadError> {
        self.unload();
        self.reference = Some(reference.clone());

        let document = match self.source.load(&reference) {
            Ok(document) => document,
            Err(error) => {
                error!("Failed to load {}: {error}", reference.describe());
                self.status = ViewerStatus::Failed {
                    fallback: FallbackView {
                        message: error.to_string(),
                        reference,
                    },
                    error: error.clone(),
                };
                return Err(error);
            }
        };

        let page_count = document.page_count();
        self.service = Some(RenderService::new(&document, self.config.render, self.scale));
        self.virtualizer.reset(page_heights(&document, self.scale));
        self.virtualizer.set_evidence_pages(self.index.pages_with_evidence());
        self.document = Some(document);
        self.status = ViewerStatus::Ready { page_count };
        self.refresh_window();
        Ok(page_count)
    }

    /// Load the last reference again
    pub fn retry(&mut self) -> Result<u32, LoadError> {
        let Some(reference) = self.reference.clone() else {
            return Err(LoadError::unsupported("nothing to retry"));
        };
        info!("Retrying {}", reference.describe());
        self.load(reference)
    }

    /// Drop the document. In-flight renders are cancelled and every bitmap
    /// and overlay is released.
    pub fn unload(&mut self) {
        if let Some(document) = self.document.take() {
            debug!("Unloading document {}", document.fingerprint());
        }
        // Dropping the service bumps its epoch and stops the workers
        self.service = None;
        self.overlays.clear();
        self.dirty.clear();
        self.virtualizer.reset(Vec::new());
        self.status = ViewerStatus::Empty;
    }

    /// Replace the evidence collection
    pub fn set_evidence(&mut self, evidence: impl Into<EvidenceList>) {
        let evidence = evidence.into();
        info!("Evidence replaced ({} items)", evidence.len());
        self.index = EvidenceIndex::build(evidence, self.selection.state().filter);

        let effects = self.selection.reconcile(&self.index);
        self.apply_effects(effects);
        self.virtualizer.set_evidence_pages(self.index.pages_with_evidence());
        self.mark_all_dirty();
        self.refresh_window();
    }

    /// Change the display scale. Every page re-rasterizes.
    pub fn set_scale(&mut self, scale: f32) {
        if !(scale.is_finite() && scale > 0.0) || (self.scale - scale).abs() <= f32::EPSILON {
            return;
        }
        self.scale = scale;
        let Some(service) = self.service.as_mut() else {
            return;
        };
        service.set_scale(scale);
        self.overlays.clear();
        self.dirty.clear();
        if let Some(document) = &self.document {
            self.virtualizer.set_page_heights(page_heights(document, scale));
        }
        self.refresh_window();
    }

    pub fn set_filter(&mut self, filter: CategoryFilter) {
        let effects = self.selection.apply(SelectionCommand::SetFilter(filter), &self.index);
        self.apply_effects(effects);
    }

    /// Visibility signal from the host's scroll container
    pub fn report_visible(&mut self, pages: impl IntoIterator<Item = u32>) {
        self.virtualizer.report_visible(pages);
        self.refresh_window();
    }

    /// Scroll position signal, in layout pixels
    pub fn report_scroll(&mut self, offset_px: f32, viewport_height_px: f32) {
        self.virtualizer.report_scroll(offset_px, viewport_height_px);
        self.refresh_window();
    }

    /// Bring a page into the window and scroll to it
    pub fn scroll_to(&mut self, page: u32) -> Option<f32> {
        let offset_px = self.virtualizer.jump_to(page)?;
        self.events.push(ViewerEvent::ScrollTo { page, offset_px });
        self.refresh_window();
        Some(offset_px)
    }

    /// Hover whatever is under the pointer
    pub fn pointer_move(&mut self, page: u32, x: f32, y: f32) -> Option<&EvidenceItem> {
        let hit = self.hit(page, x, y);
        self.hover(hit.as_deref());
        let id = hit?;
        self.index.find(&id)
    }

    /// Select whatever is under the pointer. A click on empty space does
    /// nothing.
    pub fn pointer_click(&mut self, page: u32, x: f32, y: f32) -> Option<&EvidenceItem> {
        let id = self.hit(page, x, y)?;
        let effects = self
            .selection
            .apply(SelectionCommand::Select(Some(id.clone())), &self.index);
        self.apply_effects(effects);

        let item = self.index.find(&id)?;
        self.events.push(ViewerEvent::EvidenceClicked(item.clone()));
        Some(item)
    }

    /// Select from the list view. Jumps to the item's page when it is not
    /// currently visible.
    pub fn select(&mut self, id: Option<&str>) {
        let effects = self
            .selection
            .apply(SelectionCommand::Select(id.map(String::from)), &self.index);
        self.apply_effects(effects);

        let page = id
            .filter(|id| self.selection.state().is_selected(id))
            .and_then(|id| self.index.find(id))
            .map(|item| item.page_number);
        if let Some(page) = page {
            if !self.virtualizer.is_visible(page) {
                self.scroll_to(page);
            }
        }
    }

    pub fn hover(&mut self, id: Option<&str>) {
        let effects = self
            .selection
            .apply(SelectionCommand::Hover(id.map(String::from)), &self.index);
        self.apply_effects(effects);
    }

    /// Apply finished renders and redraw pending overlays
    pub fn pump(&mut self) -> Vec<PageUpdate> {
        let updates = self.service.as_mut().map(RenderService::poll).unwrap_or_default();
        self.record_updates(&updates);
        self.flush_overlays();
        updates
    }

    /// Rasterize a page that failed earlier. Failed pages are otherwise left
    /// as error placeholders.
    pub fn retry_page(&mut self, page: u32) -> Option<PageRenderState> {
        let state = self.service.as_mut()?.retry_page(page);
        self.pump();
        Some(state)
    }

    /// Request a page and wait for it to settle, up to `timeout`
    pub fn settle_page(&mut self, page: u32, timeout: Duration) -> Option<PageRenderState> {
        let scale = self.scale;
        let service = self.service.as_mut()?;
        let state = service.ensure_rendered(page, scale);
        let state = if state.is_settled() {
            state
        } else {
            service.settle(page, timeout)
        };
        self.dirty.insert(page);
        self.pump();
        Some(state)
    }

    /// Current view of a page: its bitmap and highlights when ready,
    /// otherwise a placeholder
    #[must_use]
    pub fn page_view(&self, page: u32) -> Option<PageView> {
        let service = self.service.as_ref()?;
        if page == 0 || page > service.page_count() {
            return None;
        }

        let state = service.snapshot(page);
        if let Some(bitmap) = state.bitmap.filter(|_| self.virtualizer.in_window(page)) {
            let highlights = self
                .overlays
                .get(page)
                .map(|o| o.highlights().to_vec())
                .unwrap_or_default();
            return Some(PageView::Rendered {
                page,
                bitmap,
                highlights,
            });
        }

        Some(PageView::Placeholder {
            placeholder: self
                .virtualizer
                .placeholder(page, self.index.count_for_page(page)),
            status: state.status,
            error: state.error,
        })
    }

    /// Ready bitmap with its overlay composited on top
    pub fn compose_page(&mut self, page: u32) -> Option<RgbaImage> {
        self.flush_overlays();
        let bitmap = self.service.as_ref()?.bitmap(page)?;
        if self.overlays.get(page).is_none() {
            self.draw_overlay(page);
        }
        let composed = match self.overlays.get(page) {
            Some(overlay) => overlay::compose(&bitmap, overlay),
            None => bitmap.image.clone(),
        };
        Some(composed)
    }

    #[must_use]
    pub fn overlay(&self, page: u32) -> Option<&Overlay> {
        self.overlays.get(page)
    }

    #[must_use]
    pub fn export_payload(&self, id: &str) -> Option<ExportPayload> {
        self.index.find(id).map(ExportPayload::new)
    }

    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.events)
    }

    #[must_use]
    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    /// 1-based page under the viewport midpoint; 0 with no document
    #[must_use]
    pub fn current_page(&self) -> u32 {
        self.virtualizer.current_page()
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, Document::page_count)
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[must_use]
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    #[must_use]
    pub fn index(&self) -> &EvidenceIndex {
        &self.index
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionState {
        self.selection.state()
    }

    #[must_use]
    pub fn window(&self) -> &BTreeSet<u32> {
        self.virtualizer.window()
    }

    #[must_use]
    pub fn virtualizer(&self) -> &ViewportVirtualizer {
        &self.virtualizer
    }

    #[must_use]
    pub fn page_status(&self, page: u32) -> Option<PageStatus> {
        self.service.as_ref().map(|s| s.status(page))
    }

    /// Total overlay render passes, for checking redraw cost
    #[must_use]
    pub fn overlay_renders(&self) -> u64 {
        self.overlays.render_count()
    }

    fn hit(&self, page: u32, x: f32, y: f32) -> Option<String> {
        let (width, height) = self.page_pixel_size(page)?;
        hit_test(
            &self.index,
            self.selection.state(),
            page,
            width,
            height,
            x,
            y,
        )
        .map(|item| item.id.clone())
    }

    /// Pixel size of a page at the current scale, preferring the actual
    /// bitmap so hit-testing matches what was drawn
    fn page_pixel_size(&self, page: u32) -> Option<(f32, f32)> {
        if let Some(bitmap) = self.service.as_ref().and_then(|s| s.bitmap(page)) {
            return Some((bitmap.width() as f32, bitmap.height() as f32));
        }
        let size = self.document.as_ref()?.page_size(page, self.scale)?;
        Some((size.width_px, size.height_px))
    }

    /// Selection and hover only redraw overlays; the render set is synced
    /// again only when a filter change moves the window.
    fn apply_effects(&mut self, effects: Vec<SelectionEffect>) {
        if effects.is_empty() {
            return;
        }
        let mut window_changed = false;
        for effect in effects {
            match effect {
                SelectionEffect::Selected(id) => {
                    debug!("Selected evidence {id:?}");
                }
                SelectionEffect::Hovered(id) => {
                    let item = id.and_then(|id| self.index.find(&id).cloned());
                    self.events.push(ViewerEvent::EvidenceHovered(item));
                }
                SelectionEffect::RebuildIndex(filter) => {
                    self.index = self.index.with_filter(filter);
                    self.virtualizer
                        .set_evidence_pages(self.index.pages_with_evidence());
                    window_changed = true;
                }
                SelectionEffect::RedrawPages(pages) => {
                    self.dirty.extend(pages);
                }
                SelectionEffect::RedrawAll => self.mark_all_dirty(),
            }
        }
        if window_changed {
            self.refresh_window();
        } else {
            self.flush_overlays();
        }
    }

    fn mark_all_dirty(&mut self) {
        self.dirty.extend(self.overlays.pages());
        self.dirty.extend(self.virtualizer.window().iter().copied());
    }

    fn record_updates(&mut self, updates: &[PageUpdate]) {
        for update in updates {
            match update {
                PageUpdate::Ready(page) => {
                    self.dirty.insert(*page);
                    self.events.push(ViewerEvent::PageReady(*page));
                }
                PageUpdate::Failed(page, error) => {
                    self.overlays.remove(*page);
                    self.events.push(ViewerEvent::PageFailed {
                        page: *page,
                        error: error.clone(),
                    });
                }
            }
        }
    }

    /// Sync the render set with the window: release pages that left it and
    /// request the highest-priority pages in it, no more than the cache
    /// holds. Failed pages are not requested again.
    fn refresh_window(&mut self) {
        let scale = self.scale;
        let Some(service) = self.service.as_mut() else {
            return;
        };
        let window = self.virtualizer.window();

        for page in service.release_outside(window) {
            self.overlays.remove(page);
        }
        self.overlays.retain(|page| window.contains(&page));

        let limit = self.config.render.cache_capacity.max(1);
        let render_set = self.virtualizer.render_order(limit);
        if render_set.len() < window.len() {
            debug!(
                "Rendering {} of {} window pages",
                render_set.len(),
                window.len()
            );
        }
        for page in render_set {
            let state = service.ensure_rendered(page, scale);
            if state.status == PageStatus::Ready && self.overlays.get(page).is_none() {
                self.dirty.insert(page);
            }
        }

        let updates = service.poll();
        self.record_updates(&updates);
        self.flush_overlays();
    }

    /// Redraw dirty overlays of ready pages. Pages not ready yet are
    /// redrawn when their bitmap lands.
    fn flush_overlays(&mut self) {
        let dirty = std::mem::take(&mut self.dirty);
        for page in dirty {
            self.draw_overlay(page);
        }
    }

    fn draw_overlay(&mut self, page: u32) {
        let Some(bitmap) = self.service.as_ref().and_then(|s| s.bitmap(page)) else {
            return;
        };
        self.overlays.render(
            page,
            bitmap.width(),
            bitmap.height(),
            self.index.page(page),
            self.selection.state(),
        );
    }
}

impl Default for EvidenceViewer {
    fn default() -> Self {
        Self::new(ViewerConfig::default())
    }
}

fn page_heights(document: &Document, scale: f32) -> Vec<f32> {
    document
        .page_sizes(scale)
        .into_iter()
        .map(|size| size.height_px)
        .collect()
}
