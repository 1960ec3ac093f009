//! Conversions between page-relative unit coordinates and page pixels
//!
//! Evidence locations arrive as normalized boxes in `[0,1]×[0,1]` relative
//! to the page, origin at the top-left. Everything drawn or hit-tested
//! happens in page-pixel space at the current render scale.

use serde::{Deserialize, Serialize};

/// Slack allowed past the page edge before a box counts as out of range.
pub const BBOX_EPSILON: f32 = 1e-3;

/// Rectangle in page-relative unit coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Rectangle in page-pixel coordinates (top-left origin)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PixelRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// A bounding box that had to be clamped to fit on the page.
///
/// Extraction noise regularly produces boxes a hair outside the unit
/// square; these are reported and clamped, never rejected.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryWarning {
    pub original: BoundingBox,
    pub clamped: BoundingBox,
}

impl std::fmt::Display for GeometryWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bounding box ({}, {}, {}x{}) out of range, clamped to ({}, {}, {}x{})",
            self.original.x,
            self.original.y,
            self.original.width,
            self.original.height,
            self.clamped.x,
            self.clamped.y,
            self.clamped.width,
            self.clamped.height
        )
    }
}

impl BoundingBox {
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when every field is finite, within `[0,1]`, and the box ends
    /// on the page (with `BBOX_EPSILON` of tolerance).
    #[must_use]
    pub fn is_in_range(&self) -> bool {
        let fields = [self.x, self.y, self.width, self.height];
        fields
            .iter()
            .all(|v| v.is_finite() && *v >= -BBOX_EPSILON && *v <= 1.0 + BBOX_EPSILON)
            && self.x + self.width <= 1.0 + BBOX_EPSILON
            && self.y + self.height <= 1.0 + BBOX_EPSILON
    }

    /// Clamp the box onto the unit square. Non-finite fields collapse to 0.
    #[must_use]
    pub fn clamped(&self) -> Self {
        let unit = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        let x = unit(self.x);
        let y = unit(self.y);
        Self {
            x,
            y,
            width: unit(self.width).min(1.0 - x),
            height: unit(self.height).min(1.0 - y),
        }
    }

    /// Clamp the box, reporting a warning when it was out of range
    #[must_use]
    pub fn sanitized(&self) -> (Self, Option<GeometryWarning>) {
        let clamped = self.clamped();
        let warning = (!self.is_in_range()).then_some(GeometryWarning {
            original: *self,
            clamped,
        });
        (clamped, warning)
    }
}

impl PixelRect {
    #[must_use]
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }
}

/// Map a normalized box onto a page of the given pixel size
#[must_use]
pub fn to_pixel_rect(bbox: &BoundingBox, page_width_px: f32, page_height_px: f32) -> PixelRect {
    PixelRect {
        left: bbox.x * page_width_px,
        top: bbox.y * page_height_px,
        width: bbox.width * page_width_px,
        height: bbox.height * page_height_px,
    }
}

/// Inverse of [`to_pixel_rect`]: the extraction-side normalization.
///
/// Returns `None` for a degenerate page size.
#[must_use]
pub fn to_normalized(rect: &PixelRect, page_width_px: f32, page_height_px: f32) -> Option<BoundingBox> {
    if page_width_px <= 0.0 || page_height_px <= 0.0 {
        return None;
    }
    Some(BoundingBox {
        x: rect.left / page_width_px,
        y: rect.top / page_height_px,
        width: rect.width / page_width_px,
        height: rect.height / page_height_px,
    })
}

/// Inclusive point-in-rectangle test
#[must_use]
pub fn contains_point(rect: &PixelRect, x: f32, y: f32) -> bool {
    x >= rect.left && x <= rect.right() && y >= rect.top && y <= rect.bottom()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_rect_matches_page_size() {
        let bbox = BoundingBox::new(0.1, 0.2, 0.3, 0.1);
        let rect = to_pixel_rect(&bbox, 800.0, 1000.0);

        assert!((rect.left - 80.0).abs() < 1e-3);
        assert!((rect.top - 200.0).abs() < 1e-3);
        assert!((rect.width - 240.0).abs() < 1e-3);
        assert!((rect.height - 100.0).abs() < 1e-3);
    }

    #[test]
    fn contains_point_is_inclusive() {
        let rect = PixelRect::new(10.0, 10.0, 20.0, 20.0);

        assert!(contains_point(&rect, 10.0, 10.0));
        assert!(contains_point(&rect, 30.0, 30.0));
        assert!(contains_point(&rect, 20.0, 15.0));
        assert!(!contains_point(&rect, 9.9, 15.0));
        assert!(!contains_point(&rect, 20.0, 30.1));
    }

    #[test]
    fn slightly_overflowing_box_is_tolerated() {
        let bbox = BoundingBox::new(0.5, 0.5, 0.5005, 0.2);
        assert!(bbox.is_in_range());

        let (clamped, warning) = bbox.sanitized();
        assert!(warning.is_none());
        assert!(clamped.x + clamped.width <= 1.0);
    }

    #[test]
    fn out_of_range_box_is_clamped_with_warning() {
        let bbox = BoundingBox::new(-0.2, 0.9, 0.5, 0.4);
        let (clamped, warning) = bbox.sanitized();

        let warning = warning.expect("box is out of range");
        assert_eq!(warning.original, bbox);
        assert_eq!(clamped.x, 0.0);
        assert_eq!(clamped.y, 0.9);
        assert!((clamped.height - 0.1).abs() < 1e-6);
    }

    #[test]
    fn nan_fields_collapse() {
        let bbox = BoundingBox::new(f32::NAN, 0.1, 0.2, f32::INFINITY);
        assert!(!bbox.is_in_range());
        let clamped = bbox.clamped();
        assert_eq!(clamped.x, 0.0);
        assert_eq!(clamped.height, 0.0);
    }

    #[test]
    fn normalize_rejects_degenerate_page() {
        let rect = PixelRect::new(1.0, 1.0, 1.0, 1.0);
        assert!(to_normalized(&rect, 0.0, 100.0).is_none());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn unit() -> impl Strategy<Value = f32> {
        0.0f32..=1.0
    }

    fn dimension() -> impl Strategy<Value = f32> {
        1.0f32..4000.0
    }

    proptest! {
        /// Denormalize then normalize returns the original box
        #[test]
        fn bbox_round_trip(
            x in unit(),
            y in unit(),
            w in unit(),
            h in unit(),
            page_w in dimension(),
            page_h in dimension(),
        ) {
            let bbox = BoundingBox::new(x, y, w, h);
            let rect = to_pixel_rect(&bbox, page_w, page_h);
            let back = to_normalized(&rect, page_w, page_h).expect("page size is positive");

            let tolerance = 1e-4;
            prop_assert!((back.x - bbox.x).abs() < tolerance, "x: {} vs {}", back.x, bbox.x);
            prop_assert!((back.y - bbox.y).abs() < tolerance, "y: {} vs {}", back.y, bbox.y);
            prop_assert!((back.width - bbox.width).abs() < tolerance);
            prop_assert!((back.height - bbox.height).abs() < tolerance);
        }

        /// A pixel position survives normalize then denormalize at a fixed scale
        #[test]
        fn pixel_round_trip(
            px in 0.0f32..800.0,
            py in 0.0f32..1000.0,
        ) {
            let rect = PixelRect::new(px, py, 0.0, 0.0);
            let bbox = to_normalized(&rect, 800.0, 1000.0).expect("page size is positive");
            let back = to_pixel_rect(&bbox, 800.0, 1000.0);

            prop_assert!((back.left - px).abs() < 1e-3);
            prop_assert!((back.top - py).abs() < 1e-3);
        }

        /// Clamped boxes always lie on the page
        #[test]
        fn clamped_box_fits(
            x in -2.0f32..2.0,
            y in -2.0f32..2.0,
            w in -2.0f32..2.0,
            h in -2.0f32..2.0,
        ) {
            let clamped = BoundingBox::new(x, y, w, h).clamped();
            prop_assert!(clamped.x >= 0.0 && clamped.y >= 0.0);
            prop_assert!(clamped.width >= 0.0 && clamped.height >= 0.0);
            prop_assert!(clamped.x + clamped.width <= 1.0 + 1e-6);
            prop_assert!(clamped.y + clamped.height <= 1.0 + 1e-6);
        }
    }
}
