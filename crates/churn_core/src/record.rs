//! Customer records as sent by clients and read from training data

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single raw feature value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
}

impl FeatureValue {
    /// Numeric reading of the value.
    ///
    /// Text is accepted when it parses as a finite number; `None` otherwise.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(v) => Some(*v),
            FeatureValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Key used to look the value up in a one-hot vocabulary.
    ///
    /// Numeric text shares the key of the number it spells, so `"1.0"`,
    /// `"1"` and `1.0` all map to `"1"`.
    pub fn category_key(&self) -> String {
        match self {
            FeatureValue::Number(v) => format_number(*v),
            FeatureValue::Text(s) => {
                let s = s.trim();
                match s.parse::<f64>() {
                    Ok(v) if v.is_finite() => format_number(v),
                    _ => s.to_string(),
                }
            }
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<i64> for FeatureValue {
    fn from(value: i64) -> Self {
        FeatureValue::Number(value as f64)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Text(value)
    }
}

/// Format a number the way categorical keys are stored: integral values
/// lose their fractional part so `1.0` and `1` share the key `"1"`.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Mapping of feature name to raw value for one customer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerRecord {
    fields: HashMap<String, FeatureValue>,
}

impl CustomerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FeatureValue> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureValue)> {
        self.fields.iter()
    }
}

impl FromIterator<(String, FeatureValue)> for CustomerRecord {
    fn from_iter<I: IntoIterator<Item = (String, FeatureValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
