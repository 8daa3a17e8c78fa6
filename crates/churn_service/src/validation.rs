//! Request validation
//!
//! Turns raw JSON objects into [`CustomerRecord`]s holding exactly the
//! columns the model consumes. The first bad record fails the whole batch.

use churn_core::{CustomerRecord, FeatureKind, FeatureValue, InputColumn, ValidationError};
use serde_json::{Map, Value};

/// A raw record as received on the wire
pub type RawRecord = Map<String, Value>;

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn numeric_value(index: usize, feature: &str, value: &Value) -> Result<FeatureValue, ValidationError> {
    let wrong_type = || ValidationError::WrongType {
        index,
        feature: feature.to_string(),
        expected: "number",
        found: json_type(value),
    };

    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(FeatureValue::Number)
            .ok_or_else(|| ValidationError::NonFinite {
                index,
                feature: feature.to_string(),
            }),
        Value::String(s) => FeatureValue::Text(s.clone())
            .as_number()
            .map(FeatureValue::Number)
            .ok_or_else(wrong_type),
        _ => Err(wrong_type()),
    }
}

fn categorical_value(
    index: usize,
    feature: &str,
    value: &Value,
) -> Result<FeatureValue, ValidationError> {
    match value {
        Value::String(s) => Ok(FeatureValue::Text(s.clone())),
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(FeatureValue::Number)
            .ok_or_else(|| ValidationError::NonFinite {
                index,
                feature: feature.to_string(),
            }),
        // Flags such as hasCrCard are trained on 0/1
        Value::Bool(b) => Ok(FeatureValue::Number(if *b { 1.0 } else { 0.0 })),
        other => Err(ValidationError::WrongType {
            index,
            feature: feature.to_string(),
            expected: "string or number",
            found: json_type(other),
        }),
    }
}

/// Validate one record against the model's input columns.
///
/// Missing and null values are both reported as missing. Fields not in
/// `columns` are dropped. Category values outside the training vocabulary
/// are kept; the encoder maps them to all zeros.
pub fn validate_record(
    index: usize,
    raw: &RawRecord,
    columns: &[InputColumn],
) -> Result<CustomerRecord, ValidationError> {
    let mut record = CustomerRecord::new();

    for column in columns {
        let value = match raw.get(&column.name) {
            None | Some(Value::Null) => {
                return Err(ValidationError::MissingFeature {
                    index,
                    feature: column.name.clone(),
                })
            }
            Some(value) => value,
        };

        let parsed = match column.kind {
            FeatureKind::Numeric => numeric_value(index, &column.name, value)?,
            FeatureKind::Categorical => categorical_value(index, &column.name, value)?,
        };
        record.insert(column.name.clone(), parsed);
    }

    Ok(record)
}

/// Validate a batch in order, stopping at the first invalid record
pub fn validate_batch(
    batch: &[RawRecord],
    columns: &[InputColumn],
) -> Result<Vec<CustomerRecord>, ValidationError> {
    batch
        .iter()
        .enumerate()
        .map(|(index, raw)| validate_record(index, raw, columns))
        .collect()
}
