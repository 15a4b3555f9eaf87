//! Typed view over the `result_summary` of a finished ingestion job.
//!
//! The progress subsystem forwards the summary as opaque JSON. Consumers
//! that know they are watching a document ingestion can decode it into an
//! [`IngestionSummary`] for display. Every field is optional so that a
//! publisher omitting a counter does not make the whole view unusable.

use serde::{Deserialize, Serialize};

/// Statistics reported by the document ingestion pipeline on completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionSummary {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub chunks_created: Option<u64>,
    #[serde(default)]
    pub entities_extracted: Option<u64>,
    #[serde(default)]
    pub relationships_created: Option<u64>,
    #[serde(default)]
    pub flashcards_generated: Option<u64>,
    /// Non-fatal errors collected by individual pipeline stages.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl IngestionSummary {
    /// Decode a summary, returning `None` if the value is not an object of
    /// the expected shape.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// One-line human readable digest, e.g. `12 chunks, 30 flashcards, 8 concepts`.
    pub fn headline(&self) -> String {
        let parts: Vec<String> = [
            (self.chunks_created, "chunks"),
            (self.flashcards_generated, "flashcards"),
            (self.entities_extracted, "concepts"),
        ]
        .iter()
        .filter_map(|(count, noun)| count.map(|c| format!("{c} {noun}")))
        .collect();

        if parts.is_empty() {
            "no statistics reported".to_string()
        } else {
            parts.join(", ")
        }
    }
}
