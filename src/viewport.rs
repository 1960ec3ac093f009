//! Viewport virtualization and vertical page layout
//!
//! Pages are stacked top to bottom with a fixed gap. The render window is
//! recomputed from scratch on every signal:
//!
//! ```text
//! window = baseline ∪ visible ∪ margin ∪ evidence pages ∪ jump target
//! ```
//!
//! Pages outside the window are shown as placeholders.

use std::collections::BTreeSet;

use log::{debug, trace};

pub const DEFAULT_BASELINE_PAGES: u32 = 5;
pub const DEFAULT_MARGIN_PAGES: u32 = 1;
pub const DEFAULT_PAGE_GAP_PX: f32 = 16.0;
pub const DEFAULT_PROXIMITY_PX: f32 = 200.0;
pub const DEFAULT_PLACEHOLDER_HEIGHT_PX: f32 = 1100.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VirtualizerConfig {
    /// First K pages always rendered
    pub baseline_pages: u32,
    /// Pages added before and after each visible page
    pub margin_pages: u32,
    pub page_gap_px: f32,
    /// How far outside the viewport a page still counts as visible
    pub proximity_px: f32,
    /// Height used for pages whose size is not known
    pub placeholder_height_px: f32,
}

impl Default for VirtualizerConfig {
    fn default() -> Self {
        Self {
            baseline_pages: DEFAULT_BASELINE_PAGES,
            margin_pages: DEFAULT_MARGIN_PAGES,
            page_gap_px: DEFAULT_PAGE_GAP_PX,
            proximity_px: DEFAULT_PROXIMITY_PX,
            placeholder_height_px: DEFAULT_PLACEHOLDER_HEIGHT_PX,
        }
    }
}

/// Lightweight stand-in for a page outside the render window
#[derive(Clone, Debug, PartialEq)]
pub struct Placeholder {
    pub page: u32,
    pub height_px: f32,
    pub label: String,
    pub evidence_count: usize,
}

impl Placeholder {
    #[must_use]
    pub fn new(page: u32, height_px: f32, evidence_count: usize) -> Self {
        Self {
            page,
            height_px,
            label: format!("Page {page}"),
            evidence_count,
        }
    }
}

#[derive(Debug, Default)]
pub struct ViewportVirtualizer {
    config: VirtualizerConfig,
    heights: Vec<f32>,
    visible: BTreeSet<u32>,
    evidence_pages: BTreeSet<u32>,
    /// Jump-to-page target held until the next visibility signal
    pinned: Option<u32>,
    window: BTreeSet<u32>,
    scroll_offset: f32,
    viewport_height: f32,
}

impl ViewportVirtualizer {
    #[must_use]
    pub fn new(config: VirtualizerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &VirtualizerConfig {
        &self.config
    }

    /// Start over for a new document. `heights` holds each page's height in
    /// pixels at the current scale.
    pub fn reset(&mut self, heights: Vec<f32>) {
        self.heights = heights;
        self.visible.clear();
        self.pinned = None;
        self.scroll_offset = 0.0;
        self.recompute();
    }

    /// Page heights changed (scale change); keeps visibility and pin
    pub fn set_page_heights(&mut self, heights: Vec<f32>) {
        self.heights = heights;
        self.recompute();
    }

    /// Pages holding evidence under the current filter
    pub fn set_evidence_pages(&mut self, pages: impl IntoIterator<Item = u32>) {
        self.evidence_pages = pages.into_iter().collect();
        self.recompute();
    }

    /// Visibility signal: exactly these pages are near the viewport.
    /// Feeding the same signal twice yields the same window.
    pub fn report_visible(&mut self, pages: impl IntoIterator<Item = u32>) -> &BTreeSet<u32> {
        let count = self.page_count();
        self.visible = pages.into_iter().filter(|p| (1..=count).contains(p)).collect();
        self.pinned = None;
        self.recompute();
        &self.window
    }

    /// Scroll signal: derive visible pages from the scroll position
    pub fn report_scroll(&mut self, offset_px: f32, viewport_height_px: f32) -> &BTreeSet<u32> {
        self.scroll_offset = offset_px.max(0.0);
        self.viewport_height = viewport_height_px.max(0.0);
        let visible = self.visible_pages_at(self.scroll_offset, self.viewport_height);
        self.report_visible(visible)
    }

    /// Force a page and its margin into the window and scroll it to the
    /// top. Returns the new scroll offset, or `None` for a page out of range.
    pub fn jump_to(&mut self, page: u32) -> Option<f32> {
        let offset = self.page_offset(page)?;
        debug!("Jumping to page {page} at {offset}px");
        self.pinned = Some(page);
        self.scroll_offset = offset;
        self.recompute();
        Some(offset)
    }

    #[must_use]
    pub fn window(&self) -> &BTreeSet<u32> {
        &self.window
    }

    #[must_use]
    pub fn in_window(&self, page: u32) -> bool {
        self.window.contains(&page)
    }

    #[must_use]
    pub fn visible(&self) -> &BTreeSet<u32> {
        &self.visible
    }

    #[must_use]
    pub fn is_visible(&self, page: u32) -> bool {
        self.visible.contains(&page)
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.heights.len() as u32
    }

    #[must_use]
    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset
    }

    #[must_use]
    pub fn page_height(&self, page: u32) -> Option<f32> {
        let idx = page.checked_sub(1)? as usize;
        let height = *self.heights.get(idx)?;
        Some(if height > 0.0 {
            height
        } else {
            self.config.placeholder_height_px
        })
    }

    /// Distance from the top of the document to the top of `page`
    #[must_use]
    pub fn page_offset(&self, page: u32) -> Option<f32> {
        if page == 0 || page > self.page_count() {
            return None;
        }
        Some(
            (1..page)
                .filter_map(|p| self.page_height(p))
                .map(|h| h + self.config.page_gap_px)
                .sum(),
        )
    }

    #[must_use]
    pub fn total_height(&self) -> f32 {
        (1..=self.page_count())
            .filter_map(|p| self.page_height(p))
            .map(|h| h + self.config.page_gap_px)
            .sum()
    }

    /// Pages intersecting the viewport widened by the proximity threshold
    #[must_use]
    pub fn visible_pages_at(&self, offset_px: f32, viewport_height_px: f32) -> BTreeSet<u32> {
        let top = offset_px - self.config.proximity_px;
        let bottom = offset_px + viewport_height_px + self.config.proximity_px;

        let mut pages = BTreeSet::new();
        let mut page_top = 0.0;
        for page in 1..=self.page_count() {
            let height = self.page_height(page).unwrap_or_default();
            let page_bottom = page_top + height;
            if page_bottom >= top && page_top <= bottom {
                pages.insert(page);
            } else if page_top > bottom {
                break;
            }
            page_top = page_bottom + self.config.page_gap_px;
        }
        pages
    }

    /// Page under the vertical midpoint of the viewport
    #[must_use]
    pub fn current_page(&self) -> u32 {
        let count = self.page_count();
        if count == 0 {
            return 0;
        }
        let midpoint = self.scroll_offset + self.viewport_height / 2.0;

        let mut page_top = 0.0;
        for page in 1..=count {
            let page_bottom = page_top + self.page_height(page).unwrap_or_default();
            if midpoint < page_bottom + self.config.page_gap_px {
                return page;
            }
            page_top = page_bottom + self.config.page_gap_px;
        }
        count
    }

    #[must_use]
    pub fn placeholder(&self, page: u32, evidence_count: usize) -> Placeholder {
        let height = self
            .page_height(page)
            .unwrap_or(self.config.placeholder_height_px);
        Placeholder::new(page, height, evidence_count)
    }

    /// Window pages in the order they should be rasterized, at most `limit`
    /// of them: the jump target and visible pages with their margin, then
    /// the baseline, then evidence pages nearest the viewport.
    #[must_use]
    pub fn render_order(&self, limit: usize) -> Vec<u32> {
        let count = self.page_count();
        let margin = self.config.margin_pages;
        let mut order = Vec::with_capacity(self.window.len());
        let mut push = |page: u32| {
            if (1..=count).contains(&page) && !order.contains(&page) {
                order.push(page);
            }
        };

        for &page in self.pinned.iter().chain(&self.visible) {
            push(page);
            for step in 1..=margin {
                push(page.saturating_sub(step));
                push(page.saturating_add(step));
            }
        }
        for page in 1..=self.config.baseline_pages.min(count) {
            push(page);
        }

        let focus = self
            .pinned
            .or_else(|| self.visible.first().copied())
            .unwrap_or_else(|| self.current_page());
        let mut evidence: Vec<u32> = self.evidence_pages.iter().copied().collect();
        evidence.sort_by_key(|page| (page.abs_diff(focus), *page));
        for page in evidence {
            push(page);
        }

        order.truncate(limit);
        order
    }

    fn recompute(&mut self) {
        let count = self.page_count();
        let margin = self.config.margin_pages;
        let mut window = BTreeSet::new();

        window.extend(1..=self.config.baseline_pages.min(count));
        for &page in self.visible.iter().chain(self.pinned.as_ref()) {
            let first = page.saturating_sub(margin).max(1);
            let last = page.saturating_add(margin).min(count);
            window.extend(first..=last);
        }
        window.extend(self.evidence_pages.iter().copied().filter(|p| (1..=count).contains(p)));

        trace!("Render window: {window:?}");
        self.window = window;
    }
}
