//! HTTP boundary
//!
//! `/health` is liveness only. `/ready`, `/predict`, `/schema` and `/model`
//! depend on a loaded model and answer 503 until one is serving.

use crate::inference::{InferenceService, LabelResponse, PredictError};
use crate::metrics;
use crate::state::ModelHandle;
use crate::validation::RawRecord;
use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use churn_core::{ArtifactInfo, ChurnError, FeatureSchema};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub struct AppState {
    pub inference: InferenceService,
    pub metrics: Option<PrometheusHandle>,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
    started_at: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        inference: InferenceService,
        metrics: Option<PrometheusHandle>,
        request_timeout: Duration,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            inference,
            metrics,
            request_timeout,
            max_body_bytes,
            started_at: Instant::now(),
        }
    }

    fn handle(&self) -> &ModelHandle {
        self.inference.handle()
    }

    fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub state: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Prediction body; exactly one of the two keys must be present
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Answered with `{label, probability}` objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<Vec<RawRecord>>,
    /// Answered with scalar labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<Vec<RawRecord>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseForm {
    Detailed,
    Labels,
}

impl PredictRequest {
    fn into_records(self) -> Result<(Vec<RawRecord>, ResponseForm), ApiError> {
        match (self.batch, self.instances) {
            (Some(batch), None) => Ok((batch, ResponseForm::Detailed)),
            (None, Some(instances)) => Ok((instances, ResponseForm::Labels)),
            (Some(_), Some(_)) => Err(ApiError::rejected(
                StatusCode::BAD_REQUEST,
                "send either `batch` or `instances`, not both",
            )),
            (None, None) => Err(ApiError::rejected(
                StatusCode::BAD_REQUEST,
                "missing `batch` or `instances`",
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, kind: &'static str, message: S) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    fn service_unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message)
    }

    fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// Prediction body refused before it reaches the inference service;
    /// still counted as a failed prediction request
    fn rejected<S: Into<String>>(status: StatusCode, message: S) -> Self {
        metrics::record_rejected("validation_error");
        Self::new(status, "validation_error", message)
    }

    /// Unparseable body or a batch that is not a list of objects
    fn from_rejection(rejection: JsonRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            StatusCode::UNSUPPORTED_MEDIA_TYPE => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::rejected(status, rejection.body_text())
    }
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        let status = match &err {
            PredictError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PredictError::Churn(ChurnError::Validation(e)) if e.is_record_level() => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PredictError::Churn(ChurnError::Validation(_)) => StatusCode::BAD_REQUEST,
            PredictError::Churn(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            error: self.message,
            kind: self.kind.to_string(),
        });
        (self.status, payload).into_response()
    }
}

pub async fn start_server<F>(state: AppState, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(Arc::new(state));
    let listener = bind_listener(addr).await?;
    let local = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!("churn service listening on {}", local);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    let timeout = state.request_timeout;
    let body_limit = state.max_body_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/predict", post(handle_predict))
        .route("/schema", get(handle_schema))
        .route("/model", get(handle_model))
        .route("/metrics", get(handle_metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let lifecycle = state.handle().state();
    Json(HealthResponse {
        status: "ok".to_string(),
        state: lifecycle.as_str().to_string(),
        version: crate::VERSION.to_string(),
        uptime_secs: state.uptime_seconds(),
    })
}

async fn handle_ready(State(state): State<SharedState>) -> (StatusCode, Json<ReadyResponse>) {
    let lifecycle = state.handle().state();
    let ready = state.handle().is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready,
            state: lifecycle.as_str().to_string(),
            reason: lifecycle.failure_reason().map(str::to_string),
        }),
    )
}

async fn handle_predict(
    State(state): State<SharedState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(ApiError::from_rejection)?;
    let (records, form) = request.into_records()?;
    let service = state.inference.clone();

    // Scoring is CPU-bound; keep it off the async workers
    let result = tokio::task::spawn_blocking(move || service.predict(&records))
        .await
        .map_err(|err| {
            error!("prediction task failed: {}", err);
            ApiError::internal("prediction task failed")
        })?;

    let response = result.map_err(ApiError::from)?;
    Ok(match form {
        ResponseForm::Detailed => Json(response).into_response(),
        ResponseForm::Labels => Json(LabelResponse::from(response)).into_response(),
    })
}

async fn handle_schema(State(state): State<SharedState>) -> Result<Json<FeatureSchema>, ApiError> {
    let model = state.handle().model().ok_or_else(|| {
        ApiError::service_unavailable(format!("model is not ready (state: {})", state.handle().state()))
    })?;
    Ok(Json(model.schema.clone()))
}

async fn handle_model(State(state): State<SharedState>) -> Result<Json<ArtifactInfo>, ApiError> {
    let model = state.handle().model().ok_or_else(|| {
        ApiError::service_unavailable(format!("model is not ready (state: {})", state.handle().state()))
    })?;
    Ok(Json(model.artifact.info()))
}

async fn handle_metrics(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let Some(handle) = &state.metrics else {
        return Err(ApiError::not_found("metrics exporter is disabled"));
    };

    let mut response = Response::new(Body::from(handle.render()));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    Ok(response)
}
