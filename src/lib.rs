// Export modules for the binary and for integration tests
pub mod document;
pub mod evidence;
pub mod export;
pub mod geometry;
pub mod hit_test;
pub mod overlay;
pub mod render;
pub mod selection;
pub mod settings;
pub mod viewer;
pub mod viewport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the engine surface
pub use document::{Document, DocumentReference, DocumentSource, LoadError, LoadErrorKind};
pub use evidence::{Category, CategoryFilter, EvidenceIndex, EvidenceItem, Severity};
pub use geometry::{BoundingBox, PixelRect};
pub use render::{PageRenderState, PageStatus, RenderError};
pub use selection::SelectionState;
pub use viewer::{EvidenceViewer, FallbackView, PageView, ViewerConfig, ViewerEvent, ViewerStatus};
