//! Feature schema: declared inputs, their types and training-time statistics
//!
//! The schema document is produced offline from the training data and read
//! once at startup. Its on-disk layout groups features by kind:
//!
//! ```json
//! {
//!   "numerical":   {"age": {"min": 18, "max": 92, "mean": 38.9, "median": 37}},
//!   "categorical": {"geography": {"unique_values": ["France", "Germany", "Spain"],
//!                                 "value_counts": {"France": 5014, "Germany": 2509, "Spain": 2477}}}
//! }
//! ```
//!
//! `values` and `frequencies` are read as aliases of the categorical keys.

use crate::record::FeatureValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("schema file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read schema {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse schema: {0}")]
    Parse(String),

    #[error("invalid schema: {0}")]
    Invalid(String),

    #[error("schema has no entry for required feature '{0}'")]
    MissingFeature(String),

    #[error("feature '{feature}' is {found} in the schema but the model expects {expected}")]
    KindMismatch {
        feature: String,
        expected: FeatureKind,
        found: FeatureKind,
    },
}

/// Coarse type of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Numeric,
    Categorical,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Numeric => f.write_str("numeric"),
            FeatureKind::Categorical => f.write_str("categorical"),
        }
    }
}

/// Domain description of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureSpec {
    Numeric {
        min: f64,
        max: f64,
        mean: f64,
        median: f64,
    },
    Categorical {
        allowed_values: Vec<String>,
        frequencies: BTreeMap<String, u64>,
    },
}

impl FeatureSpec {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureSpec::Numeric { .. } => FeatureKind::Numeric,
            FeatureSpec::Categorical { .. } => FeatureKind::Categorical,
        }
    }

    /// Whether a categorical value is part of the declared vocabulary.
    /// Always false for numeric specs.
    pub fn allows(&self, category: &str) -> bool {
        match self {
            FeatureSpec::Categorical { allowed_values, .. } => {
                allowed_values.iter().any(|v| v == category)
            }
            FeatureSpec::Numeric { .. } => false,
        }
    }
}

/// Immutable mapping of feature name to its spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaDocument", into = "SchemaDocument")]
pub struct FeatureSchema {
    features: BTreeMap<String, FeatureSpec>,
}

impl FeatureSchema {
    /// Build a schema from explicit specs
    pub fn new(features: BTreeMap<String, FeatureSpec>) -> Result<Self, SchemaError> {
        for (name, spec) in &features {
            validate_spec(name, spec)?;
        }
        Ok(Self { features })
    }

    pub(crate) fn from_specs_unchecked(features: BTreeMap<String, FeatureSpec>) -> Self {
        Self { features }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(json).map_err(|e| SchemaError::Parse(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SchemaError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.get(name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureSpec)> {
        self.features.iter()
    }

    pub fn numeric_features(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter(|(_, spec)| spec.kind() == FeatureKind::Numeric)
            .map(|(name, _)| name.as_str())
    }

    pub fn categorical_features(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter(|(_, spec)| spec.kind() == FeatureKind::Categorical)
            .map(|(name, _)| name.as_str())
    }

    /// Check that every required column has exactly one spec of the right kind
    pub fn ensure_covers<'a, I>(&self, columns: I) -> Result<(), SchemaError>
    where
        I: IntoIterator<Item = (&'a str, FeatureKind)>,
    {
        for (name, expected) in columns {
            let spec = self
                .features
                .get(name)
                .ok_or_else(|| SchemaError::MissingFeature(name.to_string()))?;
            if spec.kind() != expected {
                return Err(SchemaError::KindMismatch {
                    feature: name.to_string(),
                    expected,
                    found: spec.kind(),
                });
            }
        }
        Ok(())
    }
}

fn validate_spec(name: &str, spec: &FeatureSpec) -> Result<(), SchemaError> {
    match spec {
        FeatureSpec::Numeric {
            min,
            max,
            mean,
            median,
        } => {
            if ![min, max, mean, median].iter().all(|v| v.is_finite()) {
                return Err(SchemaError::Invalid(format!(
                    "numeric feature '{name}' has non-finite statistics"
                )));
            }
            if min > max {
                return Err(SchemaError::Invalid(format!(
                    "numeric feature '{name}' has min {min} above max {max}"
                )));
            }
        }
        FeatureSpec::Categorical { allowed_values, .. } => {
            if allowed_values.is_empty() {
                return Err(SchemaError::Invalid(format!(
                    "categorical feature '{name}' declares no values"
                )));
            }
            let unique: BTreeSet<&String> = allowed_values.iter().collect();
            if unique.len() != allowed_values.len() {
                return Err(SchemaError::Invalid(format!(
                    "categorical feature '{name}' declares duplicate values"
                )));
            }
        }
    }
    Ok(())
}

/// On-disk layout of the schema document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    numerical: BTreeMap<String, NumericStats>,
    #[serde(default)]
    categorical: BTreeMap<String, CategoricalStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NumericStats {
    min: f64,
    max: f64,
    mean: f64,
    median: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CategoricalStats {
    #[serde(rename = "unique_values", alias = "values")]
    values: Vec<Value>,
    #[serde(default, rename = "value_counts", alias = "frequencies")]
    frequencies: BTreeMap<String, u64>,
}

impl TryFrom<SchemaDocument> for FeatureSchema {
    type Error = SchemaError;

    fn try_from(doc: SchemaDocument) -> Result<Self, Self::Error> {
        let mut features = BTreeMap::new();

        for (name, stats) in doc.numerical {
            features.insert(
                name,
                FeatureSpec::Numeric {
                    min: stats.min,
                    max: stats.max,
                    mean: stats.mean,
                    median: stats.median,
                },
            );
        }

        for (name, stats) in doc.categorical {
            if features.contains_key(&name) {
                return Err(SchemaError::Invalid(format!(
                    "feature '{name}' is declared as both numerical and categorical"
                )));
            }
            let allowed_values = stats
                .values
                .iter()
                .map(|value| category_from_json(&name, value))
                .collect::<Result<Vec<_>, _>>()?;
            features.insert(
                name,
                FeatureSpec::Categorical {
                    allowed_values,
                    frequencies: stats.frequencies,
                },
            );
        }

        FeatureSchema::new(features)
    }
}

impl From<FeatureSchema> for SchemaDocument {
    fn from(schema: FeatureSchema) -> Self {
        let mut doc = SchemaDocument::default();
        for (name, spec) in schema.features {
            match spec {
                FeatureSpec::Numeric {
                    min,
                    max,
                    mean,
                    median,
                } => {
                    doc.numerical.insert(
                        name,
                        NumericStats {
                            min,
                            max,
                            mean,
                            median,
                        },
                    );
                }
                FeatureSpec::Categorical {
                    allowed_values,
                    frequencies,
                } => {
                    doc.categorical.insert(
                        name,
                        CategoricalStats {
                            values: allowed_values.into_iter().map(Value::String).collect(),
                            frequencies,
                        },
                    );
                }
            }
        }
        doc
    }
}

fn category_from_json(feature: &str, value: &Value) -> Result<String, SchemaError> {
    let parsed = match value {
        Value::String(s) => FeatureValue::Text(s.clone()),
        Value::Number(n) => n.as_f64().map(FeatureValue::Number).ok_or_else(|| {
            SchemaError::Invalid(format!("feature '{feature}' has an unrepresentable value"))
        })?,
        other => {
            return Err(SchemaError::Invalid(format!(
                "feature '{feature}' has a non-scalar category value: {other}"
            )))
        }
    };
    Ok(parsed.category_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "numerical": {
            "age": {"min": 18, "max": 92, "mean": 38.92, "median": 37},
            "balance": {"min": 0, "max": 250898.09, "mean": 76485.89, "median": 97198.54}
        },
        "categorical": {
            "geography": {"unique_values": ["France", "Germany", "Spain"],
                          "value_counts": {"France": 5014, "Germany": 2509, "Spain": 2477}},
            "hasCrCard": {"unique_values": [0, 1], "value_counts": {"0": 2945, "1": 7055}}
        }
    }"#;

    #[test]
    fn test_parse_document() {
        let schema = FeatureSchema::from_json_str(DOC).unwrap();
        assert_eq!(schema.len(), 4);
        assert_eq!(schema.get("age").unwrap().kind(), FeatureKind::Numeric);

        let numeric: Vec<&str> = schema.numeric_features().collect();
        assert_eq!(numeric, vec!["age", "balance"]);

        match schema.get("hasCrCard").unwrap() {
            FeatureSpec::Categorical { allowed_values, .. } => {
                assert_eq!(allowed_values, &vec!["0".to_string(), "1".to_string()]);
            }
            other => panic!("unexpected spec {other:?}"),
        }
        assert!(schema.get("geography").unwrap().allows("Germany"));
        assert!(!schema.get("geography").unwrap().allows("Atlantis"));
    }

    #[test]
    fn test_document_roundtrip() {
        let schema = FeatureSchema::from_json_str(DOC).unwrap();
        let text = serde_json::to_string(&schema).unwrap();
        let again = FeatureSchema::from_json_str(&text).unwrap();
        assert_eq!(schema, again);

        let written: Value = serde_json::from_str(&text).unwrap();
        let geography = &written["categorical"]["geography"];
        assert_eq!(geography["unique_values"][1], "Germany");
        assert_eq!(geography["value_counts"]["Spain"], 2477);
        assert!(geography.get("values").is_none());
    }

    #[test]
    fn test_parse_data_schema_export() {
        // Layout of an exported data_schema.json
        let doc = r#"{
            "numerical": {
                "creditScore": {"min": 350.0, "max": 850.0, "mean": 650.5288, "median": 652.0}
            },
            "categorical": {
                "gender": {"unique_values": ["Male", "Female"],
                           "value_counts": {"Male": 5457, "Female": 4543}},
                "isActiveMember": {"unique_values": [1, 0],
                                   "value_counts": {"1": 5151, "0": 4849}}
            }
        }"#;
        let schema = FeatureSchema::from_json_str(doc).unwrap();
        assert_eq!(schema.len(), 3);
        assert!(schema.get("gender").unwrap().allows("Female"));
        assert!(schema.get("isActiveMember").unwrap().allows("1"));
        match schema.get("gender").unwrap() {
            FeatureSpec::Categorical { frequencies, .. } => {
                assert_eq!(frequencies.get("Male"), Some(&5457));
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_parse_legacy_category_keys() {
        let doc = r#"{"categorical": {"geography": {"values": ["France"], "frequencies": {"France": 3}}}}"#;
        let schema = FeatureSchema::from_json_str(doc).unwrap();
        assert!(schema.get("geography").unwrap().allows("France"));
    }

    #[test]
    fn test_rejects_feature_in_both_sections() {
        let doc = r#"{
            "numerical": {"age": {"min": 1, "max": 2, "mean": 1.5, "median": 1.5}},
            "categorical": {"age": {"unique_values": ["young"]}}
        }"#;
        assert!(matches!(
            FeatureSchema::from_json_str(doc),
            Err(SchemaError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_inverted_range() {
        let doc = r#"{"numerical": {"age": {"min": 90, "max": 18, "mean": 40, "median": 40}}}"#;
        assert!(FeatureSchema::from_json_str(doc).is_err());
    }

    #[test]
    fn test_ensure_covers() {
        let schema = FeatureSchema::from_json_str(DOC).unwrap();

        assert!(schema
            .ensure_covers([("age", FeatureKind::Numeric), ("geography", FeatureKind::Categorical)])
            .is_ok());

        assert!(matches!(
            schema.ensure_covers([("tenure", FeatureKind::Numeric)]),
            Err(SchemaError::MissingFeature(name)) if name == "tenure"
        ));

        assert!(matches!(
            schema.ensure_covers([("age", FeatureKind::Categorical)]),
            Err(SchemaError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = FeatureSchema::from_json_file("/nonexistent/data_schema.json").unwrap_err();
        assert!(matches!(err, SchemaError::NotFound { .. }));
    }
}
