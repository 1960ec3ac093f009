//! Selection and hover state shared by the evidence list and the overlays
//!
//! `SelectionSynchronizer` owns the one `SelectionState` cell. Every command
//! builds the next state and swaps it in with a single assignment, then
//! reports which pages need an overlay redraw.

use std::collections::BTreeSet;

use log::debug;

use crate::evidence::{CategoryFilter, EvidenceIndex};

/// Which evidence is selected and hovered, and the active category filter
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub selected_id: Option<String>,
    pub hovered_id: Option<String>,
    pub filter: CategoryFilter,
}

impl SelectionState {
    #[must_use]
    pub fn is_selected(&self, id: &str) -> bool {
        self.selected_id.as_deref() == Some(id)
    }

    #[must_use]
    pub fn is_hovered(&self, id: &str) -> bool {
        self.hovered_id.as_deref() == Some(id)
    }
}

/// Commands that modify selection state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionCommand {
    Select(Option<String>),
    Hover(Option<String>),
    SetFilter(CategoryFilter),
}

/// Effects produced by selection changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionEffect {
    /// Selected evidence changed
    Selected(Option<String>),
    /// Hovered evidence changed
    Hovered(Option<String>),
    /// Rebuild the evidence index under a new filter
    RebuildIndex(CategoryFilter),
    /// Redraw overlays of these pages only
    RedrawPages(BTreeSet<u32>),
    /// Redraw every page overlay
    RedrawAll,
}

#[derive(Debug, Default)]
pub struct SelectionSynchronizer {
    state: SelectionState,
}

impl SelectionSynchronizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Apply a command and return resulting effects.
    ///
    /// `index` resolves evidence ids to pages. Selecting or hovering an id
    /// that is unknown or hidden by the filter is ignored.
    #[must_use]
    pub fn apply(&mut self, cmd: SelectionCommand, index: &EvidenceIndex) -> Vec<SelectionEffect> {
        match cmd {
            SelectionCommand::Select(id) => {
                let Some(id) = resolve(id, index) else {
                    return vec![];
                };
                if self.state.selected_id == id {
                    return vec![];
                }

                let pages = affected_pages(index, [self.state.selected_id.as_deref(), id.as_deref()]);
                self.state = SelectionState {
                    selected_id: id.clone(),
                    ..self.state.clone()
                };
                vec![SelectionEffect::Selected(id), SelectionEffect::RedrawPages(pages)]
            }

            SelectionCommand::Hover(id) => {
                let Some(id) = resolve(id, index) else {
                    return vec![];
                };
                // Also swallows repeated null-to-null hover transitions
                if self.state.hovered_id == id {
                    return vec![];
                }

                let pages = affected_pages(index, [self.state.hovered_id.as_deref(), id.as_deref()]);
                self.state = SelectionState {
                    hovered_id: id.clone(),
                    ..self.state.clone()
                };
                vec![SelectionEffect::Hovered(id), SelectionEffect::RedrawPages(pages)]
            }

            SelectionCommand::SetFilter(filter) => {
                if self.state.filter == filter {
                    return vec![];
                }

                let passes = |id: &Option<String>| {
                    id.as_deref()
                        .and_then(|id| index.find(id))
                        .is_some_and(|item| filter.matches(item.category))
                };
                let selected_id = self.state.selected_id.clone().filter(|_| passes(&self.state.selected_id));
                let hovered_id = self.state.hovered_id.clone().filter(|_| passes(&self.state.hovered_id));

                let mut effects = vec![SelectionEffect::RebuildIndex(filter)];
                if selected_id != self.state.selected_id {
                    effects.push(SelectionEffect::Selected(None));
                }
                if hovered_id != self.state.hovered_id {
                    effects.push(SelectionEffect::Hovered(None));
                }
                effects.push(SelectionEffect::RedrawAll);

                self.state = SelectionState {
                    selected_id,
                    hovered_id,
                    filter,
                };
                effects
            }
        }
    }

    /// Drop ids that no longer exist after the evidence list was replaced
    #[must_use]
    pub fn reconcile(&mut self, index: &EvidenceIndex) -> Vec<SelectionEffect> {
        let keep = |id: &Option<String>| {
            id.as_deref().is_some_and(|id| index.find_visible(id).is_some())
        };
        let selected_id = self.state.selected_id.clone().filter(|_| keep(&self.state.selected_id));
        let hovered_id = self.state.hovered_id.clone().filter(|_| keep(&self.state.hovered_id));

        let mut effects = Vec::new();
        if selected_id != self.state.selected_id {
            effects.push(SelectionEffect::Selected(None));
        }
        if hovered_id != self.state.hovered_id {
            effects.push(SelectionEffect::Hovered(None));
        }
        self.state = SelectionState {
            selected_id,
            hovered_id,
            filter: self.state.filter,
        };
        effects
    }
}

/// `None` when the requested id cannot be selected; `Some(None)` clears
fn resolve(id: Option<String>, index: &EvidenceIndex) -> Option<Option<String>> {
    match id {
        None => Some(None),
        Some(id) if index.find_visible(&id).is_some() => Some(Some(id)),
        Some(id) => {
            debug!("Ignoring selection of unknown or filtered evidence {id}");
            None
        }
    }
}

fn affected_pages(index: &EvidenceIndex, ids: [Option<&str>; 2]) -> BTreeSet<u32> {
    ids.into_iter()
        .flatten()
        .filter_map(|id| index.find(id))
        .map(|item| item.page_number)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::evidence::{Category, EvidenceItem};

    fn index() -> EvidenceIndex {
        let items = vec![
            EvidenceItem::new("a", Category::Bias, 1),
            EvidenceItem::new("b", Category::Statistics, 3),
            EvidenceItem::new("c", Category::Bias, 3),
        ];
        EvidenceIndex::build(Arc::from(items), CategoryFilter::All)
    }

    fn pages(list: &[u32]) -> BTreeSet<u32> {
        list.iter().copied().collect()
    }

    #[test]
    fn select_redraws_old_and_new_pages() {
        let index = index();
        let mut sync = SelectionSynchronizer::new();

        let effects = sync.apply(SelectionCommand::Select(Some("a".into())), &index);
        assert_eq!(
            effects,
            vec![
                SelectionEffect::Selected(Some("a".into())),
                SelectionEffect::RedrawPages(pages(&[1])),
            ]
        );

        let effects = sync.apply(SelectionCommand::Select(Some("b".into())), &index);
        assert_eq!(effects[1], SelectionEffect::RedrawPages(pages(&[1, 3])));
        assert!(sync.state().is_selected("b"));
    }

    #[test]
    fn reselecting_is_a_no_op() {
        let index = index();
        let mut sync = SelectionSynchronizer::new();
        let _ = sync.apply(SelectionCommand::Select(Some("c".into())), &index);

        let effects = sync.apply(SelectionCommand::Select(Some("c".into())), &index);
        assert!(effects.is_empty());
    }

    #[test]
    fn null_hover_is_debounced() {
        let index = index();
        let mut sync = SelectionSynchronizer::new();

        assert!(sync.apply(SelectionCommand::Hover(None), &index).is_empty());
        let _ = sync.apply(SelectionCommand::Hover(Some("b".into())), &index);
        let effects = sync.apply(SelectionCommand::Hover(None), &index);
        assert_eq!(
            effects,
            vec![
                SelectionEffect::Hovered(None),
                SelectionEffect::RedrawPages(pages(&[3])),
            ]
        );
        assert!(sync.apply(SelectionCommand::Hover(None), &index).is_empty());
    }

    #[test]
    fn unknown_id_is_ignored() {
        let index = index();
        let mut sync = SelectionSynchronizer::new();

        let effects = sync.apply(SelectionCommand::Select(Some("missing".into())), &index);
        assert!(effects.is_empty());
        assert_eq!(sync.state().selected_id, None);
    }

    #[test]
    fn filter_change_drops_hidden_selection() {
        let index = index();
        let mut sync = SelectionSynchronizer::new();
        let _ = sync.apply(SelectionCommand::Select(Some("b".into())), &index);
        let _ = sync.apply(SelectionCommand::Hover(Some("c".into())), &index);

        let effects = sync.apply(SelectionCommand::SetFilter(CategoryFilter::Only(Category::Bias)), &index);

        assert_eq!(
            effects,
            vec![
                SelectionEffect::RebuildIndex(CategoryFilter::Only(Category::Bias)),
                SelectionEffect::Selected(None),
                SelectionEffect::RedrawAll,
            ]
        );
        assert_eq!(sync.state().selected_id, None);
        assert!(sync.state().is_hovered("c"));
    }

    #[test]
    fn reconcile_clears_removed_ids() {
        let mut sync = SelectionSynchronizer::new();
        let _ = sync.apply(SelectionCommand::Select(Some("a".into())), &index());

        let replaced = EvidenceIndex::build(
            Arc::from(vec![EvidenceItem::new("z", Category::Other, 2)]),
            CategoryFilter::All,
        );
        let effects = sync.reconcile(&replaced);

        assert_eq!(effects, vec![SelectionEffect::Selected(None)]);
        assert_eq!(sync.state().selected_id, None);
    }
}
