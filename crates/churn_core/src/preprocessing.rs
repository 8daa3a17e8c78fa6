//! Preprocessing pipeline shared by training and serving
//!
//! Numeric columns are standardized with the mean/variance learned at fit
//! time; categorical columns are one-hot encoded against the vocabulary
//! learned at fit time. A category never seen during fitting encodes to an
//! all-zero block instead of failing. Columns are always looked up by name,
//! so the order in which a client sends fields does not matter, and fields
//! outside the layout are dropped.
//!
//! Output layout (fixed by the fitted pipeline):
//! `[num__<col> for numeric columns] ++ [cat__<col>_<value> for each categorical column and value]`

use crate::errors::ValidationError;
use crate::matrix::FeatureMatrix;
use crate::record::{CustomerRecord, FeatureValue};
use crate::schema::FeatureKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Numeric input columns of the churn model
pub const NUMERIC_COLUMNS: [&str; 6] = [
    "creditScore",
    "age",
    "tenure",
    "balance",
    "numofProducts",
    "estimatedSalary",
];

/// Categorical input columns of the churn model
pub const CATEGORICAL_COLUMNS: [&str; 5] = [
    "hasCrCard",
    "isActiveMember",
    "gender",
    "geography",
    "isZeroBalance",
];

/// A named input column and how it is treated
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputColumn {
    pub name: String,
    pub kind: FeatureKind,
}

/// Which raw fields feed the pipeline and how
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self {
            numeric: NUMERIC_COLUMNS.iter().map(|s| s.to_string()).collect(),
            categorical: CATEGORICAL_COLUMNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FeatureLayout {
    pub fn columns(&self) -> Vec<InputColumn> {
        let numeric = self.numeric.iter().map(|name| InputColumn {
            name: name.clone(),
            kind: FeatureKind::Numeric,
        });
        let categorical = self.categorical.iter().map(|name| InputColumn {
            name: name.clone(),
            kind: FeatureKind::Categorical,
        });
        numeric.chain(categorical).collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.numeric.is_empty() && self.categorical.is_empty() {
            return Err("layout has no columns".to_string());
        }
        let mut seen = HashSet::new();
        for name in self.numeric.iter().chain(self.categorical.iter()) {
            if !seen.insert(name.as_str()) {
                return Err(format!("column '{name}' appears more than once"));
            }
        }
        Ok(())
    }
}

/// Standardization parameters for one numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub column: String,
    pub mean: f64,
    /// Population variance (ddof = 0)
    pub var: f64,
}

impl StandardScaler {
    pub fn fit(column: impl Into<String>, values: &[f64]) -> Self {
        let n = values.len().max(1) as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Self {
            column: column.into(),
            mean,
            var,
        }
    }

    /// Divisor applied after centering; constant columns use 1.0
    pub fn scale(&self) -> f64 {
        if self.var > 0.0 {
            self.var.sqrt()
        } else {
            1.0
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale()
    }
}

/// One-hot vocabulary for one categorical column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub column: String,
    /// Sorted, duplicate-free
    pub categories: Vec<String>,
}

impl OneHotEncoder {
    pub fn fit<I, S>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let categories: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        Self {
            column: column.into(),
            categories: categories.into_iter().collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.categories.len()
    }

    /// Position of a category in the vocabulary, `None` if unseen
    pub fn position(&self, category: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(category))
            .ok()
    }

    /// Write the indicator block for `category` into `out`
    pub fn encode_into(&self, category: &str, out: &mut [f64]) {
        out.iter_mut().for_each(|v| *v = 0.0);
        if let Some(pos) = self.position(category) {
            out[pos] = 1.0;
        }
    }
}

/// Fitted column transformer: scalers then encoders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub numeric: Vec<StandardScaler>,
    pub categorical: Vec<OneHotEncoder>,
}

impl Preprocessor {
    /// Learn scaling parameters and vocabularies from training records
    pub fn fit(layout: &FeatureLayout, records: &[CustomerRecord]) -> Result<Self, ValidationError> {
        if records.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }

        let mut numeric = Vec::with_capacity(layout.numeric.len());
        for column in &layout.numeric {
            let values = records
                .iter()
                .enumerate()
                .map(|(index, record)| numeric_value(record, index, column))
                .collect::<Result<Vec<f64>, _>>()?;
            numeric.push(StandardScaler::fit(column.clone(), &values));
        }

        let mut categorical = Vec::with_capacity(layout.categorical.len());
        for column in &layout.categorical {
            let values = records
                .iter()
                .enumerate()
                .map(|(index, record)| category_value(record, index, column))
                .collect::<Result<Vec<String>, _>>()?;
            categorical.push(OneHotEncoder::fit(column.clone(), values));
        }

        Ok(Self {
            numeric,
            categorical,
        })
    }

    /// Transform a batch into the fixed output layout, one row per record
    pub fn transform(&self, records: &[CustomerRecord]) -> Result<FeatureMatrix, ValidationError> {
        let mut matrix = FeatureMatrix::zeros(records.len(), self.n_outputs());

        for (index, record) in records.iter().enumerate() {
            let row = matrix.row_mut(index);
            let mut offset = 0;

            for scaler in &self.numeric {
                let value = numeric_value(record, index, &scaler.column)?;
                row[offset] = scaler.transform(value);
                offset += 1;
            }

            for encoder in &self.categorical {
                let category = category_value(record, index, &encoder.column)?;
                let width = encoder.width();
                encoder.encode_into(&category, &mut row[offset..offset + width]);
                offset += width;
            }
        }

        Ok(matrix)
    }

    pub fn n_outputs(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(OneHotEncoder::width).sum::<usize>()
    }

    pub fn input_columns(&self) -> Vec<InputColumn> {
        let numeric = self.numeric.iter().map(|s| InputColumn {
            name: s.column.clone(),
            kind: FeatureKind::Numeric,
        });
        let categorical = self.categorical.iter().map(|e| InputColumn {
            name: e.column.clone(),
            kind: FeatureKind::Categorical,
        });
        numeric.chain(categorical).collect()
    }

    pub fn output_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.n_outputs());
        for scaler in &self.numeric {
            names.push(format!("num__{}", scaler.column));
        }
        for encoder in &self.categorical {
            for category in &encoder.categories {
                names.push(format!("cat__{}_{}", encoder.column, category));
            }
        }
        names
    }

    /// Sanity checks for parameters read back from disk
    pub fn validate(&self) -> Result<(), String> {
        if self.n_outputs() == 0 {
            return Err("preprocessor produces no output columns".to_string());
        }

        let mut seen = HashSet::new();
        for column in self.input_columns() {
            if !seen.insert(column.name.clone()) {
                return Err(format!("column '{}' is transformed twice", column.name));
            }
        }

        for scaler in &self.numeric {
            if !scaler.mean.is_finite() || !scaler.var.is_finite() || scaler.var < 0.0 {
                return Err(format!(
                    "scaler for '{}' has invalid parameters (mean={}, var={})",
                    scaler.column, scaler.mean, scaler.var
                ));
            }
        }

        for encoder in &self.categorical {
            if encoder.categories.is_empty() {
                return Err(format!("encoder for '{}' has an empty vocabulary", encoder.column));
            }
            if encoder.categories.windows(2).any(|w| w[0] >= w[1]) {
                return Err(format!(
                    "encoder for '{}' has an unsorted or duplicated vocabulary",
                    encoder.column
                ));
            }
        }

        Ok(())
    }
}

fn numeric_value(record: &CustomerRecord, index: usize, column: &str) -> Result<f64, ValidationError> {
    let value = record
        .get(column)
        .ok_or_else(|| ValidationError::MissingFeature {
            index,
            feature: column.to_string(),
        })?;

    match value {
        FeatureValue::Number(v) if v.is_finite() => Ok(*v),
        FeatureValue::Number(_) => Err(ValidationError::NonFinite {
            index,
            feature: column.to_string(),
        }),
        FeatureValue::Text(_) => value.as_number().ok_or_else(|| ValidationError::WrongType {
            index,
            feature: column.to_string(),
            expected: "number",
            found: "non-numeric text",
        }),
    }
}

fn category_value(
    record: &CustomerRecord,
    index: usize,
    column: &str,
) -> Result<String, ValidationError> {
    record
        .get(column)
        .map(FeatureValue::category_key)
        .ok_or_else(|| ValidationError::MissingFeature {
            index,
            feature: column.to_string(),
        })
}
