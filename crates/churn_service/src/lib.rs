//! Churn inference service
//!
//! Loads one model artifact and its feature schema at startup and serves
//! predictions over HTTP:
//! - lifecycle state machine gating readiness
//! - per-record validation of JSON batches
//! - batch scoring with status-mapped errors
//! - liveness, readiness and Prometheus metrics endpoints

pub mod config;
pub mod inference;
pub mod metrics;
pub mod server;
pub mod state;
pub mod validation;

pub use config::{ConfigError, ServiceConfig};
pub use inference::{InferenceService, LabelResponse, ModelRef, PredictError, PredictResponse};
pub use server::{build_router, start_server, AppState, SharedState};
pub use state::{LifecycleError, LoadedModel, ModelHandle, ServiceState};
pub use validation::{validate_batch, validate_record, RawRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
