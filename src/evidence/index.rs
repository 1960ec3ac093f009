//! Evidence grouped by page under a category filter
//!
//! The index references the evidence collection rather than copying it:
//! groups hold positions into the shared list. It is rebuilt whenever the
//! list or the filter changes and is never mutated in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::{CategoryFilter, EvidenceItem};

/// Shared, immutable evidence collection
pub type EvidenceList = Arc<[EvidenceItem]>;

#[derive(Clone, Debug)]
pub struct EvidenceIndex {
    evidence: EvidenceList,
    filter: CategoryFilter,
    by_page: BTreeMap<u32, Vec<usize>>,
    /// Filtered positions in list order
    filtered: Vec<usize>,
}

impl Default for EvidenceIndex {
    fn default() -> Self {
        Self::build(Arc::from(Vec::new()), CategoryFilter::All)
    }
}

impl EvidenceIndex {
    /// Filter then group by page, keeping list order within each page
    #[must_use]
    pub fn build(evidence: EvidenceList, filter: CategoryFilter) -> Self {
        let mut by_page: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        let mut filtered = Vec::new();

        for (pos, item) in evidence.iter().enumerate() {
            if !filter.matches(item.category) {
                continue;
            }
            filtered.push(pos);
            by_page.entry(item.page_number).or_default().push(pos);
        }

        Self {
            evidence,
            filter,
            by_page,
            filtered,
        }
    }

    /// Whether this index was built from a different list or filter
    #[must_use]
    pub fn is_stale_for(&self, evidence: &EvidenceList, filter: CategoryFilter) -> bool {
        !Arc::ptr_eq(&self.evidence, evidence) || self.filter != filter
    }

    /// Rebuilt index for a new filter over the same list
    #[must_use]
    pub fn with_filter(&self, filter: CategoryFilter) -> Self {
        Self::build(Arc::clone(&self.evidence), filter)
    }

    #[must_use]
    pub fn evidence(&self) -> &EvidenceList {
        &self.evidence
    }

    #[must_use]
    pub fn filter(&self) -> CategoryFilter {
        self.filter
    }

    /// Items on a page that pass the filter, in draw order
    pub fn page(&self, page: u32) -> impl DoubleEndedIterator<Item = &EvidenceItem> + '_ {
        self.by_page
            .get(&page)
            .into_iter()
            .flatten()
            .map(|&pos| &self.evidence[pos])
    }

    #[must_use]
    pub fn count_for_page(&self, page: u32) -> usize {
        self.by_page.get(&page).map_or(0, Vec::len)
    }

    /// Pages holding at least one filtered item, ascending
    pub fn pages_with_evidence(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_page.keys().copied()
    }

    /// Filtered items in list order, for the list view
    pub fn items(&self) -> impl Iterator<Item = &EvidenceItem> + '_ {
        self.filtered.iter().map(|&pos| &self.evidence[pos])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filtered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filtered.is_empty()
    }

    /// Look an item up by id, ignoring the filter
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&EvidenceItem> {
        self.evidence.iter().find(|item| item.id == id)
    }

    /// Look an item up by id among the filtered items only
    #[must_use]
    pub fn find_visible(&self, id: &str) -> Option<&EvidenceItem> {
        self.items().find(|item| item.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::types::Category;

    fn sample() -> EvidenceList {
        Arc::from(vec![
            EvidenceItem::new("a", Category::Bias, 2),
            EvidenceItem::new("b", Category::Methodology, 1),
            EvidenceItem::new("c", Category::Bias, 2),
            EvidenceItem::new("d", Category::Statistics, 2),
            EvidenceItem::new("e", Category::Bias, 7),
        ])
    }

    fn ids<'a>(items: impl Iterator<Item = &'a EvidenceItem>) -> Vec<&'a str> {
        items.map(|item| item.id.as_str()).collect()
    }

    #[test]
    fn groups_by_page_preserving_order() {
        let index = EvidenceIndex::build(sample(), CategoryFilter::All);

        assert_eq!(ids(index.page(2)), vec!["a", "c", "d"]);
        assert_eq!(ids(index.page(1)), vec!["b"]);
        assert_eq!(ids(index.page(3)), Vec::<&str>::new());
        assert_eq!(index.pages_with_evidence().collect::<Vec<_>>(), vec![1, 2, 7]);
    }

    #[test]
    fn filter_drops_other_categories() {
        let index = EvidenceIndex::build(sample(), CategoryFilter::Only(Category::Bias));

        assert_eq!(ids(index.page(2)), vec!["a", "c"]);
        assert_eq!(index.count_for_page(1), 0);
        assert_eq!(index.pages_with_evidence().collect::<Vec<_>>(), vec![2, 7]);
        assert_eq!(ids(index.items()), vec!["a", "c", "e"]);
    }

    #[test]
    fn build_never_mutates_input() {
        let list = sample();
        let before: Vec<EvidenceItem> = list.to_vec();

        let _ = EvidenceIndex::build(Arc::clone(&list), CategoryFilter::Only(Category::Bias));
        let _ = EvidenceIndex::build(Arc::clone(&list), CategoryFilter::All);

        assert_eq!(list.to_vec(), before);
    }

    #[test]
    fn staleness_tracks_list_identity_and_filter() {
        let list = sample();
        let index = EvidenceIndex::build(Arc::clone(&list), CategoryFilter::All);

        assert!(!index.is_stale_for(&list, CategoryFilter::All));
        assert!(index.is_stale_for(&list, CategoryFilter::Only(Category::Bias)));
        // Equal contents, different delivery: still a full replace
        assert!(index.is_stale_for(&sample(), CategoryFilter::All));
    }

    #[test]
    fn find_ignores_filter_but_find_visible_does_not() {
        let index = EvidenceIndex::build(sample(), CategoryFilter::Only(Category::Bias));

        assert!(index.find("b").is_some());
        assert!(index.find_visible("b").is_none());
        assert!(index.find_visible("a").is_some());
    }
}
