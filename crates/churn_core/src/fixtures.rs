//! Reference model and schema for tests and benchmarks
//!
//! The reference artifact is a hand-parameterised logistic model over the
//! default layout. Its scaling statistics follow the public bank churn
//! dataset, and its weights push older, inactive, German customers with
//! few products towards churn.

use crate::artifact::ModelArtifact;
use crate::estimator::{Classifier, EstimatorKind, LinearModel};
use crate::preprocessing::{OneHotEncoder, Preprocessor, StandardScaler};
use crate::record::CustomerRecord;
use crate::schema::{FeatureSchema, FeatureSpec};
use chrono::DateTime;
use std::collections::BTreeMap;

pub const REFERENCE_TAG: &str = "churn-reference-logistic";

/// `(column, mean, population variance, weight)`
const NUMERIC: [(&str, f64, f64, f64); 6] = [
    ("creditScore", 650.0, 9341.2, -0.1),
    ("age", 38.9, 110.25, 0.9),
    ("tenure", 5.0, 8.4, -0.1),
    ("balance", 76485.0, 3.8934e9, 0.3),
    ("numofProducts", 1.53, 0.339, -0.4),
    ("estimatedSalary", 100090.0, 3.3074e9, 0.05),
];

/// `(column, vocabulary, weights)`; vocabularies are sorted
const CATEGORICAL: [(&str, &[&str], &[f64]); 5] = [
    ("hasCrCard", &["0", "1"], &[0.0, -0.05]),
    ("isActiveMember", &["0", "1"], &[0.5, -0.5]),
    ("gender", &["Female", "Male"], &[0.25, -0.25]),
    ("geography", &["France", "Germany", "Spain"], &[-0.3, 0.8, -0.2]),
    ("isZeroBalance", &["0", "1"], &[0.0, 0.1]),
];

const INTERCEPT: f64 = -1.2;

/// `(column, min, max, mean, median)`
const NUMERIC_STATS: [(&str, f64, f64, f64, f64); 6] = [
    ("creditScore", 350.0, 850.0, 650.53, 652.0),
    ("age", 18.0, 92.0, 38.92, 37.0),
    ("tenure", 0.0, 10.0, 5.01, 5.0),
    ("balance", 0.0, 250898.09, 76485.89, 97198.54),
    ("numofProducts", 1.0, 4.0, 1.53, 1.0),
    ("estimatedSalary", 11.58, 199992.48, 100090.24, 100193.91),
];

/// `(column, [(value, count)])`
const CATEGORY_COUNTS: [(&str, &[(&str, u64)]); 5] = [
    ("hasCrCard", &[("0", 2945), ("1", 7055)]),
    ("isActiveMember", &[("0", 4849), ("1", 5151)]),
    ("gender", &[("Female", 4543), ("Male", 5457)]),
    ("geography", &[("France", 5014), ("Germany", 2509), ("Spain", 2477)]),
    ("isZeroBalance", &[("0", 6383), ("1", 3617)]),
];

/// The reference artifact; identical on every call
pub fn reference_artifact() -> ModelArtifact {
    let numeric = NUMERIC
        .iter()
        .map(|(column, mean, var, _)| StandardScaler {
            column: column.to_string(),
            mean: *mean,
            var: *var,
        })
        .collect();
    let categorical = CATEGORICAL
        .iter()
        .map(|(column, vocabulary, _)| OneHotEncoder::fit(*column, vocabulary.iter().copied()))
        .collect();

    let weights = NUMERIC
        .iter()
        .map(|(_, _, _, w)| *w)
        .chain(CATEGORICAL.iter().flat_map(|(_, _, w)| w.iter().copied()))
        .collect();

    let classifier = Classifier::Linear(LinearModel {
        kind: EstimatorKind::Logistic,
        weights,
        intercept: INTERCEPT,
    });

    ModelArtifact::new(
        REFERENCE_TAG,
        Preprocessor {
            numeric,
            categorical,
        },
        classifier,
    )
    .with_created_at(DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default())
}

/// Schema covering every column of the reference artifact
pub fn sample_schema() -> FeatureSchema {
    let mut features = BTreeMap::new();
    for (name, min, max, mean, median) in NUMERIC_STATS {
        features.insert(
            name.to_string(),
            FeatureSpec::Numeric {
                min,
                max,
                mean,
                median,
            },
        );
    }
    for (name, counts) in CATEGORY_COUNTS {
        features.insert(
            name.to_string(),
            FeatureSpec::Categorical {
                allowed_values: counts.iter().map(|(v, _)| v.to_string()).collect(),
                frequencies: counts.iter().map(|(v, c)| (v.to_string(), *c)).collect(),
            },
        );
    }
    FeatureSchema::from_specs_unchecked(features)
}

/// Same schema as [`sample_schema`], in its on-disk document form
pub fn sample_schema_json() -> String {
    serde_json::to_string_pretty(&sample_schema()).unwrap_or_default()
}

/// Older, inactive German customer with a single product
pub fn high_risk_record() -> CustomerRecord {
    CustomerRecord::new()
        .with("creditScore", 740.0)
        .with("age", 54.0)
        .with("tenure", 1.0)
        .with("balance", 126418.0)
        .with("numofProducts", 1.0)
        .with("hasCrCard", 1.0)
        .with("isActiveMember", 0.0)
        .with("estimatedSalary", 134420.0)
        .with("isZeroBalance", 0.0)
        .with("gender", "Male")
        .with("geography", "Germany")
}

/// Active French customer with two products
pub fn low_risk_record() -> CustomerRecord {
    CustomerRecord::new()
        .with("creditScore", 750.0)
        .with("age", 45.0)
        .with("tenure", 8.0)
        .with("balance", 100000.0)
        .with("numofProducts", 2.0)
        .with("hasCrCard", 1.0)
        .with("isActiveMember", 1.0)
        .with("estimatedSalary", 120000.0)
        .with("isZeroBalance", 0.0)
        .with("gender", "Female")
        .with("geography", "France")
}
