//! CSV dataset loading
//!
//! Reads a headered, comma-separated file through the `csv` crate, so quoted
//! cells may hold commas. Cells that parse as numbers become numeric values,
//! everything else stays text; the target column must hold 0/1. Lines
//! starting with `#` are skipped.

use churn_core::record::format_number;
use churn_core::schema::{FeatureSchema, FeatureSpec};
use churn_core::{CustomerRecord, FeatureLayout, FeatureValue};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::deterministic::{value_words, xxhash64_i64};
use crate::errors::TrainerError;

/// Default name of the churn label column
pub const DEFAULT_TARGET_COLUMN: &str = "exited";

/// Labeled training records
#[derive(Clone, Debug)]
pub struct Dataset {
    /// Header order, target excluded
    pub columns: Vec<String>,
    pub records: Vec<CustomerRecord>,
    pub targets: Vec<u8>,
}

impl Dataset {
    /// Load dataset from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P, target_column: &str) -> Result<Self, TrainerError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| TrainerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, target_column)
    }

    pub fn from_csv_str(content: &str, target_column: &str) -> Result<Self, TrainerError> {
        Self::from_reader(content.as_bytes(), target_column)
    }

    pub fn from_reader<R: Read>(reader: R, target_column: &str) -> Result<Self, TrainerError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let header: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if header.iter().all(String::is_empty) {
            return Err(TrainerError::Dataset("dataset is empty".to_string()));
        }

        let target_idx = header
            .iter()
            .position(|h| h == target_column)
            .ok_or_else(|| {
                TrainerError::Dataset(format!("target column '{target_column}' not in header"))
            })?;

        let columns: Vec<String> = header
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != target_idx)
            .map(|(_, name)| name.clone())
            .collect();

        let mut records = Vec::new();
        let mut targets = Vec::new();

        for row in rdr.records() {
            let row = row?;
            let line = line_of(&row);
            if row.len() != header.len() {
                return Err(TrainerError::Csv {
                    line,
                    reason: format!("expected {} columns, got {}", header.len(), row.len()),
                });
            }

            let mut record = CustomerRecord::new();
            for (i, (name, cell)) in header.iter().zip(row.iter()).enumerate() {
                if i == target_idx {
                    continue;
                }
                if cell.is_empty() {
                    return Err(TrainerError::Csv {
                        line,
                        reason: format!("empty value for '{name}'"),
                    });
                }
                record.insert(name.clone(), parse_cell(cell));
            }

            let target = &row[target_idx];
            targets.push(parse_target(target).ok_or_else(|| TrainerError::Csv {
                line,
                reason: format!("target '{target}' is not 0 or 1"),
            })?);
            records.push(record);
        }

        if records.is_empty() {
            return Err(TrainerError::Dataset("dataset has a header but no rows".to_string()));
        }

        Ok(Self {
            columns,
            records,
            targets,
        })
    }

    /// Deterministically shuffle the rows using seed
    pub fn shuffle(&mut self, seed: i64) {
        let mut keyed: Vec<(i64, usize)> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let mut words: Vec<i64> = self
                    .columns
                    .iter()
                    .map(|c| record.get(c).map(value_words).unwrap_or(0))
                    .collect();
                words.push(i64::from(self.targets[i]));
                (xxhash64_i64(&words, seed), i)
            })
            .collect();

        // Identical rows keep their relative order
        keyed.sort();

        let records = keyed.iter().map(|(_, i)| self.records[*i].clone()).collect();
        let targets = keyed.iter().map(|(_, i)| self.targets[*i]).collect();
        self.records = records;
        self.targets = targets;
    }

    /// Split into `(train, held_out)`; the last `test_fraction` of rows is held out
    pub fn split(&self, test_fraction: f64) -> Result<(Dataset, Dataset), TrainerError> {
        if !(0.0..1.0).contains(&test_fraction) {
            return Err(TrainerError::InvalidParams(format!(
                "test_fraction {test_fraction} must be in [0, 1)"
            )));
        }

        let n_test = (self.len() as f64 * test_fraction).round() as usize;
        let n_train = self.len() - n_test;
        if n_train == 0 {
            return Err(TrainerError::Dataset(
                "split leaves no training rows".to_string(),
            ));
        }

        Ok((self.slice(0, n_train), self.slice(n_train, self.len())))
    }

    fn slice(&self, start: usize, end: usize) -> Dataset {
        Dataset {
            columns: self.columns.clone(),
            records: self.records[start..end].to_vec(),
            targets: self.targets[start..end].to_vec(),
        }
    }

    /// Get number of rows
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fraction of rows labeled as churned
    pub fn positive_rate(&self) -> f64 {
        if self.targets.is_empty() {
            return 0.0;
        }
        self.targets.iter().filter(|&&t| t == 1).count() as f64 / self.targets.len() as f64
    }

    /// Feature schema document describing the layout columns of this data
    pub fn feature_schema(&self, layout: &FeatureLayout) -> Result<FeatureSchema, TrainerError> {
        if self.is_empty() {
            return Err(TrainerError::Dataset("no rows to describe".to_string()));
        }
        let mut features = BTreeMap::new();

        for column in &layout.numeric {
            let mut values = self
                .records
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    r.get(column)
                        .and_then(FeatureValue::as_number)
                        .ok_or_else(|| {
                            TrainerError::Dataset(format!(
                                "row {i}: column '{column}' is missing or not numeric"
                            ))
                        })
                })
                .collect::<Result<Vec<f64>, _>>()?;
            values.sort_by(f64::total_cmp);

            let n = values.len();
            let mean = values.iter().sum::<f64>() / n as f64;
            let median = if n % 2 == 1 {
                values[n / 2]
            } else {
                (values[n / 2 - 1] + values[n / 2]) / 2.0
            };
            features.insert(
                column.clone(),
                FeatureSpec::Numeric {
                    min: values[0],
                    max: values[n - 1],
                    mean,
                    median,
                },
            );
        }

        for column in &layout.categorical {
            let mut frequencies: BTreeMap<String, u64> = BTreeMap::new();
            for (i, record) in self.records.iter().enumerate() {
                let value = record.get(column).ok_or_else(|| {
                    TrainerError::Dataset(format!("row {i}: column '{column}' is missing"))
                })?;
                *frequencies.entry(value.category_key()).or_default() += 1;
            }
            features.insert(
                column.clone(),
                FeatureSpec::Categorical {
                    allowed_values: frequencies.keys().cloned().collect(),
                    frequencies,
                },
            );
        }

        Ok(FeatureSchema::new(features)?)
    }
}

fn line_of(row: &StringRecord) -> usize {
    row.position().map_or(0, |pos| pos.line() as usize)
}

fn parse_cell(cell: &str) -> FeatureValue {
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => FeatureValue::Number(v),
        _ => FeatureValue::Text(cell.to_string()),
    }
}

fn parse_target(cell: &str) -> Option<u8> {
    match cell.parse::<f64>().ok().map(format_number).as_deref() {
        Some("0") => Some(0),
        Some("1") => Some(1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_core::FeatureKind;

    const CSV: &str = "\
creditScore,geography,age,exited
600,France,40,0
700,Spain,50,1
650,Germany,45,1

# trailing comment
550,France,30,0
";

    #[test]
    fn test_load_csv() {
        let ds = Dataset::from_csv_str(CSV, "exited").unwrap();

        assert_eq!(ds.len(), 4);
        assert_eq!(ds.columns, vec!["creditScore", "geography", "age"]);
        assert_eq!(ds.targets, vec![0, 1, 1, 0]);
        assert_eq!(ds.records[1].get("geography"), Some(&FeatureValue::from("Spain")));
        assert_eq!(ds.records[1].get("age"), Some(&FeatureValue::Number(50.0)));
        assert!(ds.records[0].get("exited").is_none());
        assert_eq!(ds.positive_rate(), 0.5);
    }

    #[test]
    fn test_quoted_cells() {
        let csv = "\
surname,geography,balance,exited
\"Smith, Jr\",France,\"1,000\",0
\"O'Neil\",\"Spain\",250.5,1
";
        let ds = Dataset::from_csv_str(csv, "exited").unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records[0].get("surname"), Some(&FeatureValue::from("Smith, Jr")));
        assert_eq!(ds.records[0].get("geography"), Some(&FeatureValue::from("France")));
        // Thousands separators are not numbers
        assert_eq!(ds.records[0].get("balance"), Some(&FeatureValue::from("1,000")));
        assert_eq!(ds.records[1].get("geography"), Some(&FeatureValue::from("Spain")));
        assert_eq!(ds.records[1].get("balance"), Some(&FeatureValue::Number(250.5)));
        assert_eq!(ds.targets, vec![0, 1]);
    }

    #[test]
    fn test_load_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("churn.csv");
        std::fs::write(&path, CSV).unwrap();

        let ds = Dataset::from_csv(&path, "exited").unwrap();
        assert_eq!(ds.len(), 4);

        assert!(matches!(
            Dataset::from_csv(dir.path().join("missing.csv"), "exited"),
            Err(TrainerError::Io { .. })
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            Dataset::from_csv_str("", "exited"),
            Err(TrainerError::Dataset(_))
        ));
        assert!(matches!(
            Dataset::from_csv_str("a,exited\n", "exited"),
            Err(TrainerError::Dataset(_))
        ));
    }

    #[test]
    fn test_missing_target_column() {
        assert!(matches!(
            Dataset::from_csv_str(CSV, "churned"),
            Err(TrainerError::Dataset(_))
        ));
    }

    #[test]
    fn test_bad_rows() {
        let ragged = "a,exited\n1,0\n2\n";
        assert!(matches!(
            Dataset::from_csv_str(ragged, "exited"),
            Err(TrainerError::Csv { line: 3, .. })
        ));

        let bad_target = "a,exited\n1,yes\n";
        assert!(matches!(
            Dataset::from_csv_str(bad_target, "exited"),
            Err(TrainerError::Csv { line: 2, .. })
        ));
    }

    #[test]
    fn test_shuffle_determinism() {
        let mut ds1 = Dataset::from_csv_str(CSV, "exited").unwrap();
        let mut ds2 = ds1.clone();

        ds1.shuffle(42);
        ds2.shuffle(42);

        assert_eq!(ds1.records, ds2.records);
        assert_eq!(ds1.targets, ds2.targets);
        assert_eq!(ds1.len(), 4);
    }

    #[test]
    fn test_split() {
        let ds = Dataset::from_csv_str(CSV, "exited").unwrap();
        let (train, test) = ds.split(0.25).unwrap();
        assert_eq!(train.len(), 3);
        assert_eq!(test.len(), 1);
        assert_eq!(test.targets, vec![0]);

        let (all, none) = ds.split(0.0).unwrap();
        assert_eq!(all.len(), 4);
        assert!(none.is_empty());

        assert!(ds.split(1.0).is_err());
    }

    #[test]
    fn test_feature_schema() {
        let ds = Dataset::from_csv_str(CSV, "exited").unwrap();
        let layout = FeatureLayout {
            numeric: vec!["age".into()],
            categorical: vec!["geography".into()],
        };
        let schema = ds.feature_schema(&layout).unwrap();

        match schema.get("age").unwrap() {
            FeatureSpec::Numeric {
                min,
                max,
                mean,
                median,
            } => {
                assert_eq!((*min, *max), (30.0, 50.0));
                assert_eq!(*mean, 41.25);
                assert_eq!(*median, 42.5);
            }
            other => panic!("unexpected spec {other:?}"),
        }
        let geo = schema.get("geography").unwrap();
        assert_eq!(geo.kind(), FeatureKind::Categorical);
        assert!(geo.allows("Germany"));
    }
}
