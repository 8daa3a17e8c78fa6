//! Shared churn prediction pipeline
//!
//! Everything the trainer writes and the service reads lives here, so both
//! sides transform records with the same code and agree on the artifact
//! format.
//!
//! Modules:
//! - `schema`: Feature schema document and binding checks
//! - `record`: Raw customer records and feature values
//! - `preprocessing`: Standard scaling and one-hot encoding
//! - `matrix`: Dense transformed feature matrix
//! - `estimator`: Classifier families and fitted classifiers
//! - `gbdt`: Boosted regression trees
//! - `artifact`: The versioned model artifact
//! - `loader`: Artifact file load/save with version and hash checks
//! - `serde_canon`: Canonical JSON and Blake3 hashing
//! - `fixtures`: Reference artifact and schema for tests and benches

pub mod artifact;
pub mod errors;
pub mod estimator;
pub mod fixtures;
pub mod gbdt;
pub mod loader;
pub mod matrix;
pub mod preprocessing;
pub mod record;
pub mod schema;
pub mod serde_canon;

pub use artifact::{ArtifactInfo, ModelArtifact};
pub use errors::{ArtifactLoadError, ChurnError, InferenceError, Result, ValidationError};
pub use estimator::{sigmoid, Classifier, EstimatorKind, LinearModel, Prediction};
pub use loader::{load, save, ArtifactWriteError, LoadedArtifact};
pub use matrix::FeatureMatrix;
pub use preprocessing::{FeatureLayout, InputColumn, OneHotEncoder, Preprocessor, StandardScaler};
pub use record::{CustomerRecord, FeatureValue};
pub use schema::{FeatureKind, FeatureSchema, FeatureSpec, SchemaError};
