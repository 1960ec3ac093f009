//! Evidence records produced by the analysis pipeline

use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// Kind of claim an evidence item makes about the document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Bias,
    Methodology,
    Reproducibility,
    Statistics,
    Limitation,
    Other,
    /// Any category string the producer sent that this build doesn't know
    #[serde(other)]
    Unrecognized,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Bias,
        Category::Methodology,
        Category::Reproducibility,
        Category::Statistics,
        Category::Limitation,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Bias => "bias",
            Category::Methodology => "methodology",
            Category::Reproducibility => "reproducibility",
            Category::Statistics => "statistics",
            Category::Limitation => "limitation",
            Category::Other => "other",
            Category::Unrecognized => "unrecognized",
        }
    }

    /// Highlight color as opaque RGB. Unknown categories get neutral grey.
    pub fn color(&self) -> (u8, u8, u8) {
        match self {
            Category::Bias => (0xEF, 0x44, 0x44),
            Category::Methodology => (0x3B, 0x82, 0xF6),
            Category::Reproducibility => (0x10, 0xB9, 0x81),
            Category::Statistics => (0x8B, 0x5C, 0xF6),
            Category::Limitation => (0xF5, 0x9E, 0x0B),
            Category::Other => (0x6B, 0x72, 0x80),
            Category::Unrecognized => (0x9C, 0xA3, 0xAF),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category filter applied to the evidence list
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    #[must_use]
    pub fn matches(&self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => *wanted == category,
        }
    }
}

impl std::str::FromStr for CategoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        if lowered == "all" {
            return Ok(CategoryFilter::All);
        }
        Category::ALL
            .iter()
            .find(|c| c.as_str() == lowered)
            .map(|c| CategoryFilter::Only(*c))
            .ok_or_else(|| format!("unknown category filter: {s}"))
    }
}

impl std::fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CategoryFilter::All => f.write_str("all"),
            CategoryFilter::Only(category) => category.fmt(f),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

/// One claim about the document, optionally located on its page.
///
/// Page numbers are 1-based. Items are immutable once received.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    pub id: String,
    pub category: Category,
    pub page_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_impact: Option<f32>,
    #[serde(default)]
    pub text_snippet: String,
    #[serde(default)]
    pub rationale: String,
}

impl EvidenceItem {
    /// Minimal item with no location, severity or scores
    pub fn new(id: impl Into<String>, category: Category, page_number: u32) -> Self {
        Self {
            id: id.into(),
            category,
            page_number,
            bounding_box: None,
            severity: None,
            confidence: None,
            score_impact: None,
            text_snippet: String::new(),
            rationale: String::new(),
        }
    }

    #[must_use]
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bounding_box = Some(bbox);
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// Parse an evidence collection from its JSON array form
pub fn parse_evidence(json: &str) -> serde_json::Result<Vec<EvidenceItem>> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_evidence() {
        let json = r#"[{
            "id": "e1",
            "category": "bias",
            "pageNumber": 3,
            "boundingBox": {"x": 0.1, "y": 0.2, "width": 0.3, "height": 0.1},
            "severity": "high",
            "confidence": 0.8,
            "scoreImpact": -1.5,
            "textSnippet": "we selected participants",
            "rationale": "convenience sample"
        }]"#;

        let items = parse_evidence(json).unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.id, "e1");
        assert_eq!(item.category, Category::Bias);
        assert_eq!(item.page_number, 3);
        assert_eq!(item.severity, Some(Severity::High));
        assert_eq!(item.bounding_box, Some(BoundingBox::new(0.1, 0.2, 0.3, 0.1)));
    }

    #[test]
    fn unknown_category_is_not_fatal() {
        let json = r#"[{"id": "e9", "category": "ethics", "pageNumber": 1}]"#;
        let items = parse_evidence(json).unwrap();

        assert_eq!(items[0].category, Category::Unrecognized);
        assert_eq!(items[0].category.color(), (0x9C, 0xA3, 0xAF));
        assert!(items[0].bounding_box.is_none());
    }

    #[test]
    fn filter_parsing() {
        assert_eq!("all".parse::<CategoryFilter>(), Ok(CategoryFilter::All));
        assert_eq!(
            "Statistics".parse::<CategoryFilter>(),
            Ok(CategoryFilter::Only(Category::Statistics))
        );
        assert!("ethics".parse::<CategoryFilter>().is_err());
    }

    #[test]
    fn filter_matches() {
        assert!(CategoryFilter::All.matches(Category::Limitation));
        assert!(CategoryFilter::Only(Category::Bias).matches(Category::Bias));
        assert!(!CategoryFilter::Only(Category::Bias).matches(Category::Other));
    }
}
