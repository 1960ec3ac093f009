//! Evidence highlight overlays
//!
//! Each ready page gets one transparent surface the size of its bitmap.
//! Rendering always clears the whole surface first, so the same inputs
//! produce the same pixels no matter what was drawn before.

use std::collections::HashMap;

use image::{Rgba, RgbaImage};
use log::{debug, warn};
use tiny_skia::{Color, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::document::Bitmap;
use crate::evidence::EvidenceItem;
use crate::geometry::{PixelRect, to_pixel_rect};
use crate::selection::SelectionState;

pub const STROKE_NORMAL: f32 = 1.0;
pub const STROKE_HOVERED: f32 = 2.0;
pub const STROKE_SELECTED: f32 = 3.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayStyle {
    /// Opacity of the category-colored fill
    pub fill_opacity: f32,
    /// Extra width of the glow around the selected item
    pub glow_width: f32,
    pub glow_opacity: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            fill_opacity: 0.2,
            glow_width: 6.0,
            glow_opacity: 0.35,
        }
    }
}

/// One highlight in page-pixel space, ready to draw
#[derive(Clone, Debug, PartialEq)]
pub struct Highlight {
    pub id: String,
    pub rect: PixelRect,
    pub color: (u8, u8, u8),
    pub stroke_width: f32,
    pub glow: bool,
}

/// Items that get drawn, bottom to top: those with a bounding box in
/// index order, with the selected item moved last.
pub fn draw_order<'a, I>(items: I, selection: &SelectionState) -> Vec<&'a EvidenceItem>
where
    I: IntoIterator<Item = &'a EvidenceItem>,
{
    let mut ordered: Vec<&EvidenceItem> = items
        .into_iter()
        .filter(|item| item.bounding_box.is_some())
        .collect();

    if let Some(pos) = ordered.iter().position(|item| selection.is_selected(&item.id)) {
        let selected = ordered.remove(pos);
        ordered.push(selected);
    }
    ordered
}

/// Pixel rectangle of an item on a page, clamping boxes that spill off it
#[must_use]
pub fn item_rect(item: &EvidenceItem, page_width_px: f32, page_height_px: f32) -> Option<PixelRect> {
    let bbox = item.bounding_box?;
    let (clamped, warning) = bbox.sanitized();
    if let Some(warning) = warning {
        warn!("Evidence {} on page {}: {warning}", item.id, item.page_number);
    }
    Some(to_pixel_rect(&clamped, page_width_px, page_height_px))
}

/// Highlights for a page in draw order
pub fn layout<'a, I>(
    items: I,
    page_width_px: f32,
    page_height_px: f32,
    selection: &SelectionState,
) -> Vec<Highlight>
where
    I: IntoIterator<Item = &'a EvidenceItem>,
{
    draw_order(items, selection)
        .into_iter()
        .filter_map(|item| {
            let rect = item_rect(item, page_width_px, page_height_px)?;
            let selected = selection.is_selected(&item.id);
            let stroke_width = if selected {
                STROKE_SELECTED
            } else if selection.is_hovered(&item.id) {
                STROKE_HOVERED
            } else {
                STROKE_NORMAL
            };
            Some(Highlight {
                id: item.id.clone(),
                rect,
                color: item.category.color(),
                stroke_width,
                glow: selected,
            })
        })
        .collect()
}

/// A drawn overlay surface for one page
pub struct Overlay {
    page: u32,
    pixmap: Pixmap,
    highlights: Vec<Highlight>,
}

impl Overlay {
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// What was drawn, bottom to top
    #[must_use]
    pub fn highlights(&self) -> &[Highlight] {
        &self.highlights
    }

    /// Raw premultiplied RGBA pixels
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Overlay as a straight-alpha image
    #[must_use]
    pub fn to_image(&self) -> RgbaImage {
        let mut image = RgbaImage::new(self.pixmap.width(), self.pixmap.height());
        for (dst, src) in image.pixels_mut().zip(self.pixmap.pixels()) {
            let c = src.demultiply();
            *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
        }
        image
    }
}

impl std::fmt::Debug for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overlay")
            .field("page", &self.page)
            .field("width", &self.pixmap.width())
            .field("height", &self.pixmap.height())
            .field("highlights", &self.highlights.len())
            .finish()
    }
}

/// Owns per-page overlay surfaces, keyed by page number
#[derive(Debug, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
    surfaces: HashMap<u32, Overlay>,
    renders: u64,
}

impl OverlayRenderer {
    #[must_use]
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            style,
            surfaces: HashMap::new(),
            renders: 0,
        }
    }

    #[must_use]
    pub fn style(&self) -> OverlayStyle {
        self.style
    }

    /// Clear and redraw the overlay of one page.
    ///
    /// Returns `None` for a zero-sized page.
    pub fn render<'a, I>(
        &mut self,
        page: u32,
        page_width_px: u32,
        page_height_px: u32,
        evidence: I,
        selection: &SelectionState,
    ) -> Option<&Overlay>
    where
        I: IntoIterator<Item = &'a EvidenceItem>,
    {
        let reuse = self
            .surfaces
            .remove(&page)
            .filter(|o| o.width() == page_width_px && o.height() == page_height_px);
        let mut pixmap = match reuse {
            Some(overlay) => overlay.pixmap,
            None => Pixmap::new(page_width_px, page_height_px)?,
        };
        pixmap.fill(Color::TRANSPARENT);

        let highlights = layout(
            evidence,
            page_width_px as f32,
            page_height_px as f32,
            selection,
        );
        for highlight in &highlights {
            draw_highlight(&mut pixmap, highlight, self.style);
        }

        self.renders += 1;
        debug!("Drew {} highlights on page {page}", highlights.len());
        self.surfaces.insert(
            page,
            Overlay {
                page,
                pixmap,
                highlights,
            },
        );
        self.surfaces.get(&page)
    }

    #[must_use]
    pub fn get(&self, page: u32) -> Option<&Overlay> {
        self.surfaces.get(&page)
    }

    pub fn remove(&mut self, page: u32) -> Option<Overlay> {
        self.surfaces.remove(&page)
    }

    /// Keep only the overlays of pages for which `keep` is true
    pub fn retain(&mut self, mut keep: impl FnMut(u32) -> bool) {
        self.surfaces.retain(|page, _| keep(*page));
    }

    pub fn clear(&mut self) {
        self.surfaces.clear();
    }

    /// Pages currently holding an overlay
    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.surfaces.keys().copied()
    }

    /// Number of render passes so far
    #[must_use]
    pub fn render_count(&self) -> u64 {
        self.renders
    }
}

fn draw_highlight(pixmap: &mut Pixmap, highlight: &Highlight, style: OverlayStyle) {
    let r = highlight.rect;
    let Some(rect) = Rect::from_xywh(r.left, r.top, r.width, r.height) else {
        return;
    };
    let path = PathBuilder::from_rect(rect);
    let (red, green, blue) = highlight.color;

    if highlight.glow {
        let glow = Stroke {
            width: highlight.stroke_width + style.glow_width,
            ..Stroke::default()
        };
        pixmap.stroke_path(
            &path,
            &paint(red, green, blue, style.glow_opacity),
            &glow,
            Transform::identity(),
            None,
        );
    }

    pixmap.fill_rect(
        rect,
        &paint(red, green, blue, style.fill_opacity),
        Transform::identity(),
        None,
    );

    let stroke = Stroke {
        width: highlight.stroke_width,
        ..Stroke::default()
    };
    pixmap.stroke_path(
        &path,
        &paint(red, green, blue, 1.0),
        &stroke,
        Transform::identity(),
        None,
    );
}

fn paint(red: u8, green: u8, blue: u8, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    paint.set_color_rgba8(red, green, blue, alpha);
    paint.anti_alias = true;
    paint
}

/// Page bitmap with its overlay drawn on top
#[must_use]
pub fn compose(bitmap: &Bitmap, overlay: &Overlay) -> RgbaImage {
    let mut composed = bitmap.image.clone();
    image::imageops::overlay(&mut composed, &overlay.to_image(), 0, 0);
    composed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::Category;
    use crate::geometry::BoundingBox;

    fn boxed(id: &str, category: Category, bbox: BoundingBox) -> EvidenceItem {
        EvidenceItem::new(id, category, 3).with_bbox(bbox)
    }

    fn selection(selected: Option<&str>, hovered: Option<&str>) -> SelectionState {
        SelectionState {
            selected_id: selected.map(String::from),
            hovered_id: hovered.map(String::from),
            ..SelectionState::default()
        }
    }

    #[test]
    fn highlight_lands_on_page_pixels() {
        let items = [boxed("e1", Category::Bias, BoundingBox::new(0.1, 0.2, 0.3, 0.1))];
        let mut renderer = OverlayRenderer::default();

        let overlay = renderer
            .render(3, 800, 1000, &items, &SelectionState::default())
            .expect("overlay");
        let rect = overlay.highlights()[0].rect;

        assert!((rect.left - 80.0).abs() < 1e-3);
        assert!((rect.top - 200.0).abs() < 1e-3);
        assert!((rect.width - 240.0).abs() < 1e-3);
        assert!((rect.height - 100.0).abs() < 1e-3);

        let image = overlay.to_image();
        assert!(image.get_pixel(200, 250)[3] > 0);
        assert_eq!(image.get_pixel(10, 10)[3], 0);
        assert_eq!(image.get_pixel(400, 250)[3], 0);
    }

    #[test]
    fn render_is_idempotent() {
        let items = [
            boxed("a", Category::Bias, BoundingBox::new(0.1, 0.1, 0.5, 0.5)),
            boxed("b", Category::Statistics, BoundingBox::new(0.3, 0.3, 0.5, 0.5)),
        ];
        let sel = selection(Some("a"), Some("b"));
        let mut renderer = OverlayRenderer::default();

        let first = renderer.render(1, 200, 200, &items, &sel).expect("overlay").data().to_vec();
        // Draw something else in between to prove the surface is cleared
        renderer.render(1, 200, 200, &items[..1], &SelectionState::default());
        let second = renderer.render(1, 200, 200, &items, &sel).expect("overlay").data().to_vec();

        assert_eq!(first, second);
        assert_eq!(renderer.render_count(), 3);
    }

    #[test]
    fn selected_item_drawn_last() {
        let items = [
            boxed("a", Category::Bias, BoundingBox::new(0.1, 0.1, 0.2, 0.2)),
            boxed("b", Category::Other, BoundingBox::new(0.1, 0.1, 0.2, 0.2)),
            boxed("c", Category::Limitation, BoundingBox::new(0.5, 0.5, 0.2, 0.2)),
        ];
        let highlights = layout(&items, 100.0, 100.0, &selection(Some("a"), Some("c")));

        let ids: Vec<&str> = highlights.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(highlights[0].stroke_width, STROKE_NORMAL);
        assert_eq!(highlights[1].stroke_width, STROKE_HOVERED);
        assert_eq!(highlights[2].stroke_width, STROKE_SELECTED);
        assert!(highlights[2].glow);
    }

    #[test]
    fn items_without_box_are_not_drawn() {
        let items = [EvidenceItem::new("loose", Category::Bias, 1)];
        let mut renderer = OverlayRenderer::default();

        let overlay = renderer
            .render(1, 50, 50, &items, &SelectionState::default())
            .expect("overlay");

        assert!(overlay.highlights().is_empty());
        assert!(overlay.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn out_of_range_box_is_clamped() {
        let items = [boxed("wide", Category::Bias, BoundingBox::new(0.8, 0.5, 0.4, 0.1))];
        let highlights = layout(&items, 100.0, 100.0, &SelectionState::default());

        let rect = highlights[0].rect;
        assert!((rect.right() - 100.0).abs() < 1e-3);
    }

    #[test]
    fn unrecognized_category_uses_neutral_color() {
        let items = [boxed("x", Category::Unrecognized, BoundingBox::new(0.0, 0.0, 0.5, 0.5))];
        let highlights = layout(&items, 10.0, 10.0, &SelectionState::default());
        assert_eq!(highlights[0].color, Category::Unrecognized.color());
    }

    #[test]
    fn compose_keeps_bitmap_size() {
        let bitmap = Bitmap {
            page: 1,
            scale: 1.0,
            image: RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255])),
        };
        let items = [boxed("a", Category::Bias, BoundingBox::new(0.0, 0.0, 0.5, 0.5))];
        let mut renderer = OverlayRenderer::default();
        let overlay = renderer
            .render(1, 40, 40, &items, &SelectionState::default())
            .expect("overlay");

        let composed = compose(&bitmap, overlay);

        assert_eq!(composed.dimensions(), (40, 40));
        assert_ne!(composed.get_pixel(5, 5), &Rgba([255, 255, 255, 255]));
        assert_eq!(composed.get_pixel(35, 35), &Rgba([255, 255, 255, 255]));
    }
}
