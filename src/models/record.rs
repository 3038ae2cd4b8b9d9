//! Cost record model as read from the input dataset.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::RecordError;

pub const FIELD_ID: &str = "id";
pub const FIELD_CODE: &str = "code";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_UNIT: &str = "unit";
pub const FIELD_UNIT_COST: &str = "unit_cost";
/// Older costbook exports label the cost column `total_cost`.
pub const FIELD_TOTAL_COST: &str = "total_cost";
pub const FIELD_MAIN_DIVISION: &str = "main_division";
pub const FIELD_SUBDIVISION: &str = "subdivision";
pub const FIELD_MAJOR_CLASSIFICATION: &str = "major_classification";

/// One row of the costbook.
///
/// Required fields are validated on construction; every other field is kept
/// verbatim so it can travel to the vector store as payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CostRecord {
    index: usize,
    identifier: String,
    code: String,
    description: String,
    unit: String,
    unit_cost: f64,
    fields: Map<String, Value>,
}

impl CostRecord {
    /// Validate one JSON value taken from position `index` of the input.
    pub fn from_json(index: usize, value: Value) -> Result<Self, RecordError> {
        let Value::Object(mut fields) = value else {
            return Err(RecordError::InvalidRecord {
                index,
                message: format!("expected a JSON object, found {}", json_kind(&value)),
            });
        };

        if is_absent(fields.get(FIELD_UNIT_COST))
            && let Some(total) = fields.get(FIELD_TOTAL_COST).cloned()
            && !total.is_null()
        {
            fields.insert(FIELD_UNIT_COST.to_string(), total);
        }

        let code = required_text(&fields, index, FIELD_CODE)?;
        let description = required_text(&fields, index, FIELD_DESCRIPTION)?;
        let unit = required_text(&fields, index, FIELD_UNIT)?;
        let unit_cost = match fields.get(FIELD_UNIT_COST) {
            Some(value) if !is_absent(Some(value)) => {
                parse_cost(value).ok_or_else(|| RecordError::InvalidRecord {
                    index,
                    message: format!("`{FIELD_UNIT_COST}` is not numeric: {value}"),
                })?
            }
            _ => {
                return Err(RecordError::MissingField {
                    index,
                    field: FIELD_UNIT_COST,
                });
            }
        };

        let identifier = fields
            .get(FIELD_ID)
            .and_then(text_value)
            .unwrap_or_else(|| code.clone());

        Ok(Self {
            index,
            identifier,
            code,
            description,
            unit,
            unit_cost,
            fields,
        })
    }

    /// Position of the record in its source, starting at zero.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn unit_cost(&self) -> f64 {
        self.unit_cost
    }

    /// Optional field rendered as text; `None` when absent, null, or empty.
    pub fn text_field(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(text_value)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Stable point id: re-ingesting the same record overwrites its point.
    pub fn point_id(&self) -> String {
        Self::generate_point_id(&self.identifier)
    }

    pub fn generate_point_id(identifier: &str) -> String {
        let name = format!("costbook:{identifier}");
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }
}

fn required_text(
    fields: &Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<String, RecordError> {
    fields
        .get(field)
        .and_then(text_value)
        .ok_or(RecordError::MissingField { index, field })
}

fn is_absent(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn parse_cost(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, ',' | '$' | ' '))
                .collect();
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
