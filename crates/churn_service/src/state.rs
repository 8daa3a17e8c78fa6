//! Model lifecycle
//!
//! `Unloaded → Loading → Ready` or `Loading → Failed`. There is no way back
//! to `Loading`; replacing a model means restarting the process.

use churn_core::{ArtifactLoadError, FeatureSchema, LoadedArtifact};
use parking_lot::RwLock;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Unloaded => "unloaded",
            ServiceState::Loading => "loading",
            ServiceState::Ready => "ready",
            ServiceState::Failed(_) => "failed",
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            ServiceState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: &ServiceState) -> bool {
        matches!(
            (self, next),
            (ServiceState::Unloaded, ServiceState::Loading)
                | (ServiceState::Loading, ServiceState::Ready)
                | (ServiceState::Loading, ServiceState::Failed(_))
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error(transparent)]
    Load(#[from] ArtifactLoadError),
}

/// An artifact together with the schema it was bound to at startup
#[derive(Debug)]
pub struct LoadedModel {
    pub artifact: LoadedArtifact,
    pub schema: FeatureSchema,
}

impl LoadedModel {
    /// Load the artifact and schema and check that the schema describes
    /// every column the artifact consumes.
    pub fn load(artifact_path: &Path, schema_path: &Path) -> Result<Self, ArtifactLoadError> {
        let artifact = churn_core::load(artifact_path)?;
        let schema = FeatureSchema::from_json_file(schema_path)?;
        Self::bind(artifact, schema)
    }

    pub fn bind(artifact: LoadedArtifact, schema: FeatureSchema) -> Result<Self, ArtifactLoadError> {
        schema.ensure_covers(
            artifact
                .artifact
                .input_columns
                .iter()
                .map(|column| (column.name.as_str(), column.kind)),
        )?;
        Ok(Self { artifact, schema })
    }

    pub fn tag(&self) -> &str {
        &self.artifact.artifact.tag
    }

    pub fn model_hash(&self) -> &str {
        &self.artifact.model_hash
    }
}

#[derive(Debug)]
struct Inner {
    state: ServiceState,
    // Only ever set by the Loading → Ready transition
    model: Option<Arc<LoadedModel>>,
}

/// Shared lifecycle state plus the write-once loaded model
#[derive(Debug)]
pub struct ModelHandle {
    inner: RwLock<Inner>,
}

impl Default for ModelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelHandle {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: ServiceState::Unloaded,
                model: None,
            }),
        }
    }

    pub fn state(&self) -> ServiceState {
        self.inner.read().state.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().state == ServiceState::Ready
    }

    /// The loaded model, available only once Ready
    pub fn model(&self) -> Option<Arc<LoadedModel>> {
        let inner = self.inner.read();
        match inner.state {
            ServiceState::Ready => inner.model.clone(),
            _ => None,
        }
    }

    fn transition(inner: &mut Inner, next: ServiceState) -> Result<(), LifecycleError> {
        if !inner.state.can_transition_to(&next) {
            return Err(LifecycleError::InvalidTransition {
                from: inner.state.as_str(),
                to: next.as_str(),
            });
        }
        inner.state = next;
        Ok(())
    }

    pub fn begin_loading(&self) -> Result<(), LifecycleError> {
        Self::transition(&mut self.inner.write(), ServiceState::Loading)
    }

    pub fn mark_ready(&self, model: LoadedModel) -> Result<Arc<LoadedModel>, LifecycleError> {
        let mut inner = self.inner.write();
        Self::transition(&mut inner, ServiceState::Ready)?;
        let model = Arc::new(model);
        inner.model = Some(model.clone());
        Ok(model)
    }

    pub fn mark_failed(&self, reason: impl Into<String>) -> Result<(), LifecycleError> {
        Self::transition(&mut self.inner.write(), ServiceState::Failed(reason.into()))
    }

    /// Drive the full startup sequence.
    ///
    /// On a load failure the handle ends in `Failed` and the error is
    /// returned; the caller decides whether to exit or keep serving
    /// liveness only.
    #[instrument(skip_all, fields(artifact = %artifact_path.display(), schema = %schema_path.display()))]
    pub fn load(
        &self,
        artifact_path: &Path,
        schema_path: &Path,
    ) -> Result<Arc<LoadedModel>, LifecycleError> {
        self.begin_loading()?;

        match LoadedModel::load(artifact_path, schema_path) {
            Ok(model) => {
                info!(
                    tag = %model.tag(),
                    hash = %model.model_hash(),
                    estimator = %model.artifact.artifact.estimator,
                    features = model.artifact.artifact.n_features(),
                    "model ready"
                );
                self.mark_ready(model)
            }
            Err(err) => {
                error!(error = %err, "failed to load model");
                self.mark_failed(err.to_string())?;
                Err(err.into())
            }
        }
    }
}
