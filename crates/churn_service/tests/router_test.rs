//! HTTP-level behaviour of the churn service router

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use churn_core::fixtures::{reference_artifact, sample_schema_json, REFERENCE_TAG};
use churn_service::{build_router, AppState, InferenceService, ModelHandle};
use http_body_util::BodyExt;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct Fixture {
    _dir: TempDir,
    handle: Arc<ModelHandle>,
}

fn fixture(with_artifact: bool) -> Fixture {
    let dir = TempDir::new().unwrap();
    let artifact = dir.path().join("model.json");
    let schema = dir.path().join("schema.json");
    if with_artifact {
        churn_core::save(&reference_artifact(), &artifact).unwrap();
    }
    std::fs::write(&schema, sample_schema_json()).unwrap();

    let handle = Arc::new(ModelHandle::new());
    let _ = handle.load(&artifact, &schema);
    Fixture { _dir: dir, handle }
}

fn router(fixture: &Fixture, max_batch_size: usize, max_body_bytes: usize) -> Router {
    let metrics = PrometheusBuilder::new().build_recorder().handle();
    router_with_metrics(fixture, max_batch_size, max_body_bytes, metrics)
}

fn router_with_metrics(
    fixture: &Fixture,
    max_batch_size: usize,
    max_body_bytes: usize,
    metrics: PrometheusHandle,
) -> Router {
    let state = AppState::new(
        InferenceService::new(fixture.handle.clone(), max_batch_size),
        Some(metrics),
        Duration::from_secs(5),
        max_body_bytes,
    );
    build_router(Arc::new(state))
}

fn ready_router() -> (Fixture, Router) {
    let fixture = fixture(true);
    let app = router(&fixture, 8, 64 * 1024);
    (fixture, app)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn customer() -> Value {
    json!({
        "creditScore": 740, "age": 54, "tenure": 1, "balance": 126418,
        "numofProducts": 1, "hasCrCard": 1, "isActiveMember": 0,
        "estimatedSalary": 134420, "isZeroBalance": 1,
        "gender": "Male", "geography": "Germany"
    })
}

fn loyal_customer() -> Value {
    json!({
        "creditScore": 750, "age": 45, "tenure": 8, "balance": 100000,
        "numofProducts": 2, "hasCrCard": 1, "isActiveMember": 1,
        "estimatedSalary": 120000, "isZeroBalance": 0,
        "gender": "Female", "geography": "France"
    })
}

#[tokio::test]
async fn health_is_ok_even_without_a_model() {
    let fixture = fixture(false);
    let app = router(&fixture, 8, 64 * 1024);

    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["state"], "failed");
}

#[tokio::test]
async fn missing_artifact_reports_not_ready() {
    let fixture = fixture(false);
    let app = router(&fixture, 8, 64 * 1024);

    let (status, body) = send(app.clone(), get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
    assert!(body["reason"].as_str().unwrap().contains("not found"));

    let request = post_json("/predict", json!({"batch": [customer()]}).to_string());
    let (status, body) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "service_unavailable");

    let (status, _) = send(app, get("/model")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn ready_once_loaded() {
    let (_fixture, app) = ready_router();
    let (status, body) = send(app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["state"], "ready");
}

#[tokio::test]
async fn single_customer_gets_exactly_one_prediction() {
    let (_fixture, app) = ready_router();
    let request = post_json("/predict", json!({"batch": [customer()]}).to_string());

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);

    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 1);
    let label = predictions[0]["label"].as_u64().unwrap();
    assert!(label == 0 || label == 1);
    let p = predictions[0]["probability"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&p));
    assert_eq!(body["model"]["tag"], REFERENCE_TAG);
}

#[tokio::test]
async fn batch_predictions_keep_input_order() {
    let (_fixture, app) = ready_router();
    let batch = json!({"batch": [customer(), loyal_customer(), customer()]});

    let (status, body) = send(app, post_json("/predict", batch.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    let labels: Vec<u64> = body["predictions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["label"].as_u64().unwrap())
        .collect();
    assert_eq!(labels, vec![1, 0, 1]);
}

#[tokio::test]
async fn instances_body_gets_scalar_labels() {
    let (_fixture, app) = ready_router();
    let body = json!({"instances": [customer(), loyal_customer()]});

    let (status, body) = send(app, post_json("/predict", body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"], json!([1, 0]));
    let probabilities = body["probabilities"].as_array().unwrap();
    assert_eq!(probabilities.len(), 2);
    assert!(probabilities[0].as_f64().unwrap() > 0.5);
    assert!(probabilities[1].as_f64().unwrap() < 0.5);
    assert_eq!(body["model"]["tag"], REFERENCE_TAG);
}

#[tokio::test]
async fn instances_body_keeps_validation_rules() {
    let (_fixture, app) = ready_router();
    let mut broken = customer();
    broken.as_object_mut().unwrap().remove("tenure");

    let body = json!({"instances": [broken]});
    let (status, body) = send(app, post_json("/predict", body.to_string())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("tenure"));
}

#[tokio::test]
async fn key_order_in_body_does_not_change_prediction() {
    let (_fixture, app) = ready_router();
    let forward = r#"{"batch": [{"creditScore": 740, "age": 54, "tenure": 1, "balance": 126418,
        "numofProducts": 1, "hasCrCard": 1, "isActiveMember": 0, "estimatedSalary": 134420,
        "isZeroBalance": 1, "gender": "Male", "geography": "Germany"}]}"#;
    let backward = r#"{"batch": [{"geography": "Germany", "gender": "Male", "isZeroBalance": 1,
        "estimatedSalary": 134420, "isActiveMember": 0, "hasCrCard": 1, "numofProducts": 1,
        "balance": 126418, "tenure": 1, "age": 54, "creditScore": 740}]}"#;

    let (status, a) = send(app.clone(), post_json("/predict", forward.into())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, b) = send(app, post_json("/predict", backward.into())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(a["predictions"], b["predictions"]);
}

#[tokio::test]
async fn invalid_record_fails_whole_batch() {
    let (_fixture, app) = ready_router();
    let mut broken = loyal_customer();
    broken["age"] = json!("old");
    let batch = json!({"batch": [customer(), broken]});

    let (status, body) = send(app, post_json("/predict", batch.to_string())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation_error");
    assert!(body["error"].as_str().unwrap().contains("record 1"));
    assert!(body.get("predictions").is_none());
}

#[tokio::test]
async fn unseen_category_is_not_an_error() {
    let (_fixture, app) = ready_router();
    let mut visitor = loyal_customer();
    visitor["geography"] = json!("Portugal");
    visitor["surname"] = json!("Ignored");

    let batch = json!({"batch": [visitor]});
    let (status, body) = send(app, post_json("/predict", batch.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_batches_are_bad_requests() {
    let (_fixture, app) = ready_router();

    let (status, body) = send(app.clone(), post_json("/predict", "{not json".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");

    let (status, _) = send(app.clone(), post_json("/predict", json!({"batch": [1, 2]}).to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(app.clone(), post_json("/predict", json!({"records": []}).to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");

    let both = json!({"batch": [customer()], "instances": [customer()]});
    let (status, body) = send(app.clone(), post_json("/predict", both.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not both"));

    let (status, body) = send(app.clone(), post_json("/predict", json!({"batch": []}).to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");

    let oversized: Vec<Value> = (0..9).map(|_| customer()).collect();
    let (status, _) = send(app, post_json("/predict", json!({"batch": oversized}).to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let fixture = fixture(true);
    let app = router(&fixture, 1024, 512);
    let batch: Vec<Value> = (0..20).map(|_| customer()).collect();

    let (status, _) = send(app, post_json("/predict", json!({"batch": batch}).to_string())).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn schema_and_model_describe_the_loaded_artifact() {
    let (_fixture, app) = ready_router();

    let (status, schema) = send(app.clone(), get("/schema")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        schema["categorical"]["geography"]["unique_values"],
        json!(["France", "Germany", "Spain"])
    );
    assert!(schema["numerical"]["age"]["mean"].is_number());

    let (status, model) = send(app, get("/model")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(model["tag"], REFERENCE_TAG);
    assert_eq!(model["n_features"], 17);
    assert_eq!(model["supports_proba"], true);
    assert_eq!(model["feature_names"].as_array().unwrap().len(), 17);
    assert_eq!(model["feature_names"][12], "cat__geography_France");
    assert!(model["path"].as_str().unwrap().ends_with("model.json"));
    assert_eq!(
        model["model_hash"].as_str().unwrap(),
        reference_artifact().hash().unwrap()
    );
}

#[tokio::test]
async fn metrics_endpoint_serves_text() {
    let (_fixture, app) = ready_router();
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; version=0.0.4"
    );
}

#[test]
fn rejected_bodies_are_counted() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let fixture = fixture(true);
    let app = router_with_metrics(&fixture, 8, 64 * 1024, recorder.handle());

    // Handlers run on this thread, so the local recorder sees their metrics
    let _guard = metrics::set_default_local_recorder(&recorder);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let rendered = runtime.block_on(async move {
        let (status, _) = send(app.clone(), post_json("/predict", "{not json".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(app.clone(), post_json("/predict", json!({"rows": []}).to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let response = app.oneshot(get("/metrics")).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    });

    assert!(
        rendered.contains("churn_predict_requests_total 2"),
        "{rendered}"
    );
    assert!(
        rendered.contains(r#"churn_predict_errors_total{kind="validation_error"} 2"#),
        "{rendered}"
    );
}
