//! Per-page render state machine and the page-state registry
//!
//! Each page moves `Pending → Rendering → Ready | Error`, driven only by
//! named events. `Invalidated` returns any state to `Pending`.

use std::sync::Arc;

use log::trace;

use super::request::{RenderError, RequestId};
use crate::document::Bitmap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PageStatus {
    #[default]
    Pending,
    Rendering,
    Ready,
    Error,
}

/// Events that drive a page's state
#[derive(Clone, Debug, PartialEq)]
pub enum PageEvent {
    LoadRequested { request: RequestId, scale: f32 },
    LoadSucceeded { request: RequestId },
    LoadFailed { request: RequestId, error: RenderError },
    Invalidated,
}

/// Registry entry for one page
#[derive(Clone, Debug, Default)]
pub struct PageSlot {
    pub status: PageStatus,
    /// Scale of the in-flight or completed render
    pub scale: f32,
    /// Request currently rendering this page
    pub request: Option<RequestId>,
    pub error: Option<RenderError>,
}

impl PageSlot {
    /// Apply an event. Returns false when the event does not apply in the
    /// current state (e.g. a completion for a request that was superseded).
    pub fn apply(&mut self, event: PageEvent) -> bool {
        match (self.status, event) {
            (PageStatus::Pending | PageStatus::Error, PageEvent::LoadRequested { request, scale }) => {
                self.status = PageStatus::Rendering;
                self.scale = scale;
                self.request = Some(request);
                self.error = None;
                true
            }
            (PageStatus::Rendering, PageEvent::LoadSucceeded { request })
                if self.request == Some(request) =>
            {
                self.status = PageStatus::Ready;
                self.request = None;
                true
            }
            (PageStatus::Rendering, PageEvent::LoadFailed { request, error })
                if self.request == Some(request) =>
            {
                self.status = PageStatus::Error;
                self.request = None;
                self.error = Some(error);
                true
            }
            (_, PageEvent::Invalidated) => {
                self.status = PageStatus::Pending;
                self.request = None;
                self.error = None;
                true
            }
            (status, event) => {
                trace!("Ignoring {event:?} in state {status:?}");
                false
            }
        }
    }
}

/// Snapshot of a page's render state handed to callers
#[derive(Clone, Debug)]
pub struct PageRenderState {
    pub page_number: u32,
    pub scale: f32,
    pub status: PageStatus,
    pub bitmap: Option<Arc<Bitmap>>,
    pub error: Option<RenderError>,
}

impl PageRenderState {
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self.status, PageStatus::Ready | PageStatus::Error)
    }
}

/// Page-state arena indexed by page number, owned by the render service.
///
/// Slots are created lazily on first touch and cleared wholesale on
/// document change.
#[derive(Debug, Default)]
pub struct PageRegistry {
    slots: Vec<Option<PageSlot>>,
}

impl PageRegistry {
    #[must_use]
    pub fn new(page_count: u32) -> Self {
        Self {
            slots: vec![None; page_count as usize],
        }
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Existing slot for a 1-based page
    #[must_use]
    pub fn get(&self, page: u32) -> Option<&PageSlot> {
        page.checked_sub(1)
            .and_then(|idx| self.slots.get(idx as usize))
            .and_then(Option::as_ref)
    }

    /// Slot for a 1-based page, created on first use. `None` when out of range.
    pub fn slot_mut(&mut self, page: u32) -> Option<&mut PageSlot> {
        let idx = page.checked_sub(1)? as usize;
        self.slots
            .get_mut(idx)
            .map(|slot| slot.get_or_insert_with(PageSlot::default))
    }

    /// Apply an event to a page. Out-of-range pages are ignored.
    pub fn apply(&mut self, page: u32, event: PageEvent) -> bool {
        self.slot_mut(page).is_some_and(|slot| slot.apply(event))
    }

    #[must_use]
    pub fn status(&self, page: u32) -> PageStatus {
        self.get(page).map(|slot| slot.status).unwrap_or_default()
    }

    /// Reset every page to `Pending`
    pub fn invalidate_all(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.apply(PageEvent::Invalidated);
        }
    }

    /// Pages whose status matches, ascending
    pub fn pages_with(&self, status: PageStatus) -> impl Iterator<Item = u32> + '_ {
        self.slots.iter().enumerate().filter_map(move |(idx, slot)| {
            slot.as_ref()
                .filter(|s| s.status == status)
                .map(|_| idx as u32 + 1)
        })
    }

    /// Drop every slot
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}
