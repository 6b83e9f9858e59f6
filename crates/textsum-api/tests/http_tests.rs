use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use std::path::Path;
use tempfile::TempDir;
use textsum_api::{create_app, handlers::INDEX_MESSAGE, AppState};
use textsum_config::ConfigurationManager;
use tower::ServiceExt;

const PARAMS: &str = r#"
TrainingArguments:
  num_train_epochs: 1
  learning_rate: 0.001
  warmup_steps: 1
  per_device_train_batch_size: 1
  logging_steps: 1
  evaluation_strategy: steps
  eval_steps: 2
  save_steps: 1000000
  gradient_accumulation_steps: 1
"#;

fn config_yaml(root: &Path, source: &Path) -> String {
    let r = root.display();
    let s = source.display();
    let ckpt = root.join("tiny-t5");
    textsum_ml::testing::write_tiny_checkpoint(&ckpt).unwrap();
    let ckpt = ckpt.display();
    format!(
        r#"
artifacts_root: {r}/artifacts
data_ingestion:
  root_dir: {r}/artifacts/data_ingestion
  source_URL: {s}
  local_data_file: {r}/artifacts/data_ingestion/data.zip
  unzip_dir: {r}/artifacts/data_ingestion
data_validation:
  root_dir: {r}/artifacts/data_validation
  ALL_REQUIRED_FILES: [train.csv, validation.csv, test.csv]
data_transformation:
  root_dir: {r}/artifacts/data_transformation
  data_path: {r}/artifacts/data_ingestion/samsum
  tokenizer_name: {ckpt}
model_trainer:
  root_dir: {r}/artifacts/model_trainer
  data_path: {r}/artifacts/data_transformation/samsum_dataset
  model_ckpt: {ckpt}
model_evaluation:
  root_dir: {r}/artifacts/model_evaluation
  data_path: {r}/artifacts/data_transformation/samsum_dataset
  model_path: {r}/artifacts/model_trainer/summarizer
  tokenizer_path: {r}/artifacts/model_trainer/summarizer
  metric_file_name: metrics.csv
  eval_samples: 2
  eval_batch_size: 1
backend:
  cache_dir: {r}/checkpoints
  hub_endpoint: http://127.0.0.1:9
"#
    )
}

fn app_with_source(temp: &TempDir, source: &Path) -> Router {
    let manager = ConfigurationManager::from_yaml_strs(&config_yaml(temp.path(), source), PARAMS).unwrap();
    create_app(AppState::new(manager).unwrap())
}

fn app(temp: &TempDir) -> Router {
    app_with_source(temp, &temp.path().join("no-such-source.zip"))
}

fn write_source(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    let rows = "id,dialogue,summary\n\
        1,\"Amanda: I baked cookies. Do you want some?\nJerry: Sure!\",Amanda baked cookies for Jerry.\n\
        2,\"Tim: Lunch at noon?\nKim: Yes, see you at noon.\",Tim and Kim meet for lunch at noon.\n";
    for split in ["train", "validation", "test"] {
        std::fs::write(dir.join(format!("{split}.csv")), rows).unwrap();
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_text(uri: &str, text: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "text/plain")
        .body(Body::from(text.to_string()))
        .unwrap()
}

#[tokio::test]
async fn index_describes_the_api() {
    let temp = TempDir::new().unwrap();
    let (status, body) = send(app(&temp), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, INDEX_MESSAGE);
}

#[tokio::test]
async fn health_reports_version() {
    let temp = TempDir::new().unwrap();
    let (status, body) = send(app(&temp), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], textsum_core::TEXTSUM_VERSION);
}

#[tokio::test]
async fn predict_returns_a_summary_without_a_trained_model() {
    let temp = TempDir::new().unwrap();
    let (status, body) = send(
        app(&temp),
        post_text("/predict", "Hi Amy, are we still on for lunch?"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(!body.trim().is_empty());
}

#[tokio::test]
async fn predict_rejects_blank_text() {
    let temp = TempDir::new().unwrap();
    let (status, body) = send(app(&temp), post_text("/predict", "  ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Text cannot be empty");
}

#[tokio::test]
async fn train_with_missing_source_is_a_server_error() {
    let temp = TempDir::new().unwrap();
    let (status, body) = send(app(&temp), get("/train")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("data_ingestion"), "{body}");
}

#[tokio::test]
async fn train_runs_the_whole_pipeline() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("raw");
    write_source(&source);
    let (status, body) = send(app_with_source(&temp, &source), get("/train")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body.contains("completed successfully"), "{body}");
    assert!(temp.path().join("artifacts/model_trainer/summarizer").is_dir());
    assert!(temp.path().join("artifacts/model_evaluation/metrics.csv").is_file());
}

#[tokio::test]
async fn requests_are_counted_in_metrics() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);
    let (status, _) = send(app.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("textsum_http_requests_total"));
    assert!(body.contains("route=\"/health\""));
}
