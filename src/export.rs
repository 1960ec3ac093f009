//! Per-evidence export payload handed to an external export routine

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::evidence::EvidenceItem;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub evidence: EvidenceItem,
    pub timestamp: DateTime<Utc>,
    pub page: u32,
}

impl ExportPayload {
    /// Payload stamped with the current time
    #[must_use]
    pub fn new(evidence: &EvidenceItem) -> Self {
        Self::at(evidence, Utc::now())
    }

    #[must_use]
    pub fn at(evidence: &EvidenceItem, timestamp: DateTime<Utc>) -> Self {
        Self {
            page: evidence.page_number,
            evidence: evidence.clone(),
            timestamp,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::evidence::Category;

    #[test]
    fn payload_serializes_with_page_and_timestamp() {
        let item = EvidenceItem::new("e7", Category::Limitation, 12);
        let when = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let payload = ExportPayload::at(&item, when);
        let json: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();

        assert_eq!(json["page"], 12);
        assert_eq!(json["evidence"]["id"], "e7");
        assert_eq!(json["evidence"]["pageNumber"], 12);
        assert_eq!(json["evidence"]["category"], "limitation");
        assert_eq!(json["timestamp"], "2024-03-01T12:00:00Z");
    }
}
