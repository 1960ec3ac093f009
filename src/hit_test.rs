//! Pointer position to evidence item
//!
//! Walks a page's highlights in reverse draw order so the item on top wins,
//! which puts the selected item first.

use crate::evidence::{EvidenceIndex, EvidenceItem};
use crate::geometry::contains_point;
use crate::overlay::{draw_order, item_rect};
use crate::selection::SelectionState;

/// Evidence under `(x, y)` on a page rendered at `page_width_px × page_height_px`
#[must_use]
pub fn hit_test<'a>(
    index: &'a EvidenceIndex,
    selection: &SelectionState,
    page: u32,
    page_width_px: f32,
    page_height_px: f32,
    x: f32,
    y: f32,
) -> Option<&'a EvidenceItem> {
    draw_order(index.page(page), selection)
        .into_iter()
        .rev()
        .find(|item| {
            item_rect(item, page_width_px, page_height_px)
                .is_some_and(|rect| contains_point(&rect, x, y))
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::evidence::{Category, CategoryFilter};
    use crate::geometry::BoundingBox;

    fn index(items: Vec<EvidenceItem>) -> EvidenceIndex {
        EvidenceIndex::build(Arc::from(items), CategoryFilter::All)
    }

    fn same_box() -> BoundingBox {
        BoundingBox::new(0.1, 0.1, 0.4, 0.4)
    }

    #[test]
    fn topmost_of_overlapping_wins() {
        let index = index(vec![
            EvidenceItem::new("first", Category::Bias, 2).with_bbox(same_box()),
            EvidenceItem::new("second", Category::Methodology, 2).with_bbox(same_box()),
        ]);

        let hit = hit_test(&index, &SelectionState::default(), 2, 100.0, 100.0, 20.0, 20.0);
        assert_eq!(hit.map(|i| i.id.as_str()), Some("second"));
    }

    #[test]
    fn selected_item_is_on_top() {
        let index = index(vec![
            EvidenceItem::new("first", Category::Bias, 2).with_bbox(same_box()),
            EvidenceItem::new("second", Category::Methodology, 2).with_bbox(same_box()),
        ]);
        let selection = SelectionState {
            selected_id: Some("first".into()),
            ..SelectionState::default()
        };

        let hit = hit_test(&index, &selection, 2, 100.0, 100.0, 20.0, 20.0);
        assert_eq!(hit.map(|i| i.id.as_str()), Some("first"));
    }

    #[test]
    fn edges_are_inclusive_and_misses_are_none() {
        let quarter = BoundingBox::new(0.25, 0.25, 0.5, 0.5);
        let index = index(vec![EvidenceItem::new("a", Category::Bias, 1).with_bbox(quarter)]);
        let sel = SelectionState::default();

        assert!(hit_test(&index, &sel, 1, 100.0, 100.0, 75.0, 75.0).is_some());
        assert!(hit_test(&index, &sel, 1, 100.0, 100.0, 25.0, 25.0).is_some());
        assert!(hit_test(&index, &sel, 1, 100.0, 100.0, 76.0, 60.0).is_none());
        assert!(hit_test(&index, &sel, 2, 100.0, 100.0, 20.0, 20.0).is_none());
    }

    #[test]
    fn filtered_and_unlocated_items_are_not_hit() {
        let items = vec![
            EvidenceItem::new("hidden", Category::Statistics, 1).with_bbox(same_box()),
            EvidenceItem::new("loose", Category::Bias, 1),
        ];
        let index = EvidenceIndex::build(Arc::from(items), CategoryFilter::Only(Category::Bias));

        assert!(hit_test(&index, &SelectionState::default(), 1, 100.0, 100.0, 20.0, 20.0).is_none());
    }
}
