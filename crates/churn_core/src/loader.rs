//! Reading and writing artifact files
//!
//! Loading checks, in order: the file exists and fits the size limit, the
//! envelope parses, the format and pipeline versions match this build, the
//! recorded hash matches the model body, the body decodes, and the decoded
//! artifact is structurally consistent. The first failing check wins.

use crate::artifact::{
    ArtifactEnvelope, ArtifactInfo, ModelArtifact, ARTIFACT_FORMAT_VERSION, MAX_ARTIFACT_BYTES,
    PIPELINE_VERSION,
};
use crate::errors::ArtifactLoadError;
use crate::serde_canon::{hash_value_hex, to_canonical_json, CanonicalError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Failures while writing an artifact
#[derive(Error, Debug)]
pub enum ArtifactWriteError {
    #[error("artifact serialization failed: {0}")]
    Serialization(#[from] CanonicalError),

    #[error("refusing to write an invalid artifact: {0}")]
    Invalid(String),

    #[error("failed to write artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An artifact that passed every load check
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub artifact: ModelArtifact,
    pub model_hash: String,
    pub path: PathBuf,
}

impl LoadedArtifact {
    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            path: Some(self.path.clone()),
            ..ArtifactInfo::new(&self.artifact, self.model_hash.clone())
        }
    }
}

/// Load an artifact with the default size limit
pub fn load(path: impl AsRef<Path>) -> Result<LoadedArtifact, ArtifactLoadError> {
    load_with_limit(path, MAX_ARTIFACT_BYTES)
}

#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_with_limit(
    path: impl AsRef<Path>,
    max_bytes: u64,
) -> Result<LoadedArtifact, ArtifactLoadError> {
    let path = path.as_ref();

    let metadata = fs::metadata(path).map_err(|e| io_error(path, e))?;
    if metadata.len() > max_bytes {
        return Err(ArtifactLoadError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            limit: max_bytes,
        });
    }

    let contents = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let envelope: ArtifactEnvelope =
        serde_json::from_str(&contents).map_err(|e| ArtifactLoadError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    check_versions(&envelope)?;

    let computed = hash_value_hex(&envelope.model).map_err(|e| ArtifactLoadError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if computed != envelope.model_hash {
        return Err(ArtifactLoadError::HashMismatch {
            recorded: envelope.model_hash,
            computed,
        });
    }

    let artifact: ModelArtifact =
        serde_json::from_value(envelope.model).map_err(|e| ArtifactLoadError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("model body does not decode: {e}"),
        })?;
    artifact.validate().map_err(ArtifactLoadError::Invalid)?;

    info!(
        tag = %artifact.tag,
        estimator = %artifact.estimator,
        n_features = artifact.n_features(),
        bytes = metadata.len(),
        hash = %computed,
        "model artifact loaded"
    );

    Ok(LoadedArtifact {
        artifact,
        model_hash: computed,
        path: path.to_path_buf(),
    })
}

fn check_versions(envelope: &ArtifactEnvelope) -> Result<(), ArtifactLoadError> {
    if envelope.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(ArtifactLoadError::IncompatibleVersion(format!(
            "format version {} (this build reads {})",
            envelope.format_version, ARTIFACT_FORMAT_VERSION
        )));
    }
    if envelope.pipeline_version != PIPELINE_VERSION {
        return Err(ArtifactLoadError::IncompatibleVersion(format!(
            "pipeline '{}' (this build runs '{}')",
            envelope.pipeline_version, PIPELINE_VERSION
        )));
    }
    Ok(())
}

fn io_error(path: &Path, source: io::Error) -> ArtifactLoadError {
    if source.kind() == io::ErrorKind::NotFound {
        ArtifactLoadError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        ArtifactLoadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Wrap an artifact in its envelope and render canonical JSON.
///
/// Returns the model hash alongside the document.
pub fn to_envelope_json(artifact: &ModelArtifact) -> Result<(String, String), ArtifactWriteError> {
    artifact.validate().map_err(ArtifactWriteError::Invalid)?;

    let model = serde_json::to_value(artifact)
        .map_err(|e| CanonicalError::SerializationError(e.to_string()))?;
    let model_hash = hash_value_hex(&model)?;
    let envelope = ArtifactEnvelope {
        format_version: ARTIFACT_FORMAT_VERSION,
        pipeline_version: PIPELINE_VERSION.to_string(),
        model_hash: model_hash.clone(),
        model,
    };
    Ok((model_hash, to_canonical_json(&envelope)?))
}

/// Write an artifact atomically: a sibling temp file is renamed over `path`.
#[instrument(skip_all, fields(tag = %artifact.tag, path = %path.as_ref().display()))]
pub fn save(artifact: &ModelArtifact, path: impl AsRef<Path>) -> Result<String, ArtifactWriteError> {
    let path = path.as_ref();
    let (model_hash, json) = to_envelope_json(artifact)?;

    let write_err = |source: io::Error| ArtifactWriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(".tmp-{}", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, json.as_bytes()).map_err(write_err)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_err(e));
    }

    debug!(bytes = json.len(), "artifact written");
    info!(hash = %model_hash, "model artifact saved");
    Ok(model_hash)
}
