use std::path::Path;
use tempfile::TempDir;
use textsum_config::ConfigurationManager;
use textsum_core::{StageStatus, TextsumError};
use textsum_stages::{ids, run_pipeline, PipelineSelection, PredictionService};

const PARAMS: &str = r#"
TrainingArguments:
  num_train_epochs: 1
  learning_rate: 0.001
  warmup_steps: 1
  per_device_train_batch_size: 1
  weight_decay: 0.01
  logging_steps: 1
  evaluation_strategy: steps
  eval_steps: 2
  save_steps: 1000000
  gradient_accumulation_steps: 2
"#;

fn tiny_checkpoint(root: &Path) -> String {
    let dir = root.join("tiny-t5");
    textsum_ml::testing::write_tiny_checkpoint(&dir).unwrap();
    dir.display().to_string()
}

fn config_yaml(root: &Path, source: &Path, required: &str) -> String {
    let r = root.display();
    let s = source.display();
    let ckpt = tiny_checkpoint(root);
    format!(
        r#"
artifacts_root: {r}/artifacts
data_ingestion:
  root_dir: {r}/artifacts/data_ingestion
  source_URL: {s}
  local_data_file: {r}/artifacts/data_ingestion/data.zip
  unzip_dir: {r}/artifacts/data_ingestion
  dataset_name: samsum
data_validation:
  root_dir: {r}/artifacts/data_validation
  data_dir: {r}/artifacts/data_ingestion/samsum
  ALL_REQUIRED_FILES: [{required}]
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

fn write_source(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    let rows = "id,dialogue,summary\n\
        1,\"Amanda: I baked cookies. Do you want some?\nJerry: Sure!\",Amanda baked cookies for Jerry.\n\
        2,\"Olivia: Who are you voting for?\nOliver: Liberals as always.\",Oliver votes for liberals.\n\
        3,\"Tim: Lunch at noon?\nKim: Yes, see you at noon.\",Tim and Kim meet for lunch at noon.\n";
    for split in ["train", "validation", "test"] {
        std::fs::write(dir.join(format!("{split}.csv")), rows).unwrap();
    }
}

#[test]
fn full_pipeline_trains_evaluates_and_serves() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("raw");
    write_source(&source);
    let yaml = config_yaml(temp.path(), &source, "train.csv, validation.csv, test.csv");
    let manager = ConfigurationManager::from_yaml_strs(&yaml, PARAMS).unwrap();

    let report = run_pipeline(&manager, &PipelineSelection::All).unwrap();
    assert!(report.succeeded(), "{}", report.render());
    assert_eq!(report.stages.len(), 5);
    assert!(report.aborted_at.is_none());

    let artifacts = temp.path().join("artifacts");
    assert_eq!(
        std::fs::read_to_string(artifacts.join("data_validation/status.txt")).unwrap(),
        "Validation status: True"
    );
    assert!(artifacts.join("data_transformation/samsum_dataset/dataset_dict.json").is_file());
    assert!(artifacts.join("model_trainer/summarizer/trained_model.json").is_file());
    let metrics = std::fs::read_to_string(artifacts.join("model_evaluation/metrics.csv")).unwrap();
    assert!(metrics.starts_with("rouge1,rouge2,rougeL,rougeLsum"));
    assert!(artifacts.join("artifacts.json").is_file());

    // second run: ingestion and training have nothing to do
    let rerun = run_pipeline(&manager, &PipelineSelection::All).unwrap();
    let status_of = |id: &str| rerun.stages.iter().find(|s| s.id == id).unwrap().result.status;
    assert_eq!(status_of(ids::DATA_INGESTION), StageStatus::Skipped);
    assert_eq!(status_of(ids::MODEL_TRAINER), StageStatus::Skipped);

    let service = PredictionService::new(
        manager.prediction_config(),
        textsum_stages::reference_backend(&manager).unwrap(),
    );
    let summary = service.predict("Hi Amy, are we still on for lunch?").unwrap();
    assert!(!summary.is_empty());
}

#[test]
fn failed_validation_never_runs_transformation() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("raw");
    write_source(&source);
    let yaml = config_yaml(temp.path(), &source, "train.csv, missing.csv");
    let manager = ConfigurationManager::from_yaml_strs(&yaml, PARAMS).unwrap();

    let report = run_pipeline(&manager, &PipelineSelection::All).unwrap();
    assert!(!report.succeeded());
    assert_eq!(report.aborted_at.as_deref(), Some(ids::DATA_VALIDATION));
    assert_eq!(report.stages.len(), 2);

    let artifacts = temp.path().join("artifacts");
    assert_eq!(
        std::fs::read_to_string(artifacts.join("data_validation/status.txt")).unwrap(),
        "Validation status: False"
    );
    assert!(!artifacts.join("data_transformation/samsum_dataset").exists());
    assert!(!artifacts.join("model_trainer/summarizer").exists());
}

#[test]
fn single_stage_selection_runs_only_that_stage() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("raw");
    write_source(&source);
    let yaml = config_yaml(temp.path(), &source, "train.csv");
    let manager = ConfigurationManager::from_yaml_strs(&yaml, PARAMS).unwrap();

    let report = run_pipeline(&manager, &PipelineSelection::Ingestion).unwrap();
    assert_eq!(report.stages.len(), 1);
    assert!(temp.path().join("artifacts/data_ingestion/samsum/train.csv").is_file());

    let selection: PipelineSelection = "data_validation".parse().unwrap();
    let report = run_pipeline(&manager, &selection).unwrap();
    assert!(report.succeeded());
    assert_eq!(report.pipeline_id, "data_validation");
}

#[test]
fn transformation_alone_refuses_unvalidated_data() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("raw");
    write_source(&source);
    let yaml = config_yaml(temp.path(), &source, "train.csv");
    let manager = ConfigurationManager::from_yaml_strs(&yaml, PARAMS).unwrap();

    let selection = PipelineSelection::Stage(ids::DATA_TRANSFORMATION.to_string());
    let err = run_pipeline(&manager, &selection).unwrap_err();
    assert!(matches!(err, TextsumError::ValidationFailure(_)), "{err}");
    assert!(err.to_string().starts_with("VALIDATION/data_transformation"), "{err}");
    assert!(!temp.path().join("artifacts/data_transformation/samsum_dataset").exists());
}
