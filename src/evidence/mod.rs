//! Evidence model and per-page grouping

mod index;
mod types;

pub use index::{EvidenceIndex, EvidenceList};
pub use types::{parse_evidence, Category, CategoryFilter, EvidenceItem, Severity};
