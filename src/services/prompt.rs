//! Prompt and payload construction for cost records.

use serde_json::{Map, Value};

use crate::models::{
    CostRecord, FIELD_MAIN_DIVISION, FIELD_MAJOR_CLASSIFICATION, FIELD_SUBDIVISION,
};

/// Tag identifying the costbook the records come from.
pub const SOURCE_TYPE: &str = "bni_csi";
/// Edition of the costbook.
pub const SOURCE_VERSION: &str = "2025";

/// Build the text embedded for `record`.
///
/// Pure and deterministic: the same record always yields the same prompt.
/// Optional classification fields are left out when the record lacks them.
pub fn build_prompt(record: &CostRecord) -> String {
    let mut parts = vec![SOURCE_TYPE.to_string(), format!("Code: {}", record.code())];

    for (label, field) in [
        ("Division", FIELD_MAIN_DIVISION),
        ("Subdivision", FIELD_SUBDIVISION),
        ("Classification", FIELD_MAJOR_CLASSIFICATION),
    ] {
        if let Some(value) = record.text_field(field) {
            parts.push(format!("{label}: {value}"));
        }
    }

    parts.push(format!("Description: {}", record.description()));
    parts.push(format!("Unit: {}", record.unit()));
    parts.push(format!("Unit cost: {}", format_cost(record.unit_cost())));

    parts.join(" | ")
}

/// Payload stored next to the vector: every input field plus provenance.
pub fn build_payload(record: &CostRecord, embedding_model: &str) -> Map<String, Value> {
    let mut payload = record.fields().clone();
    payload.insert("source_type".to_string(), SOURCE_TYPE.into());
    payload.insert("version".to_string(), SOURCE_VERSION.into());
    payload.insert("embedding_model".to_string(), embedding_model.into());
    payload
}

fn format_cost(cost: f64) -> String {
    format!("${cost:.2}")
}
