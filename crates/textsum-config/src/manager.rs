//! Configuration manager: loads `config/config.yaml` and `params.yaml` once
//! and hands out owned per-stage configs.

use crate::common::{create_directories, parse_yaml, read_yaml};
use crate::entity::{
    BackendConfig, DataIngestionConfig, DataTransformationConfig, DataValidationConfig,
    ModelEvaluationConfig, ModelTrainerConfig, PredictionConfig,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use textsum_core::{TextsumError, TextsumResult};
use textsum_ml::TrainingArguments;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";
pub const DEFAULT_PARAMS_PATH: &str = "params.yaml";
pub const CONFIG_PATH_ENV: &str = "TEXTSUM_CONFIG";
pub const PARAMS_PATH_ENV: &str = "TEXTSUM_PARAMS";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
    artifacts_root: PathBuf,
    data_ingestion: DataIngestionConfig,
    data_validation: DataValidationConfig,
    data_transformation: DataTransformationConfig,
    model_trainer: ModelTrainerConfig,
    model_evaluation: ModelEvaluationConfig,
    #[serde(default)]
    prediction: Option<PredictionConfig>,
    #[serde(default)]
    backend: BackendConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParamsDocument {
    #[serde(rename = "TrainingArguments")]
    training_arguments: TrainingArguments,
}

#[derive(Debug, Clone)]
pub struct ConfigurationManager {
    config: ConfigDocument,
    params: ParamsDocument,
}

impl ConfigurationManager {
    pub fn new(config_path: impl AsRef<Path>, params_path: impl AsRef<Path>) -> TextsumResult<Self> {
        let config = read_yaml(config_path.as_ref())?;
        let params = read_yaml(params_path.as_ref())?;
        Self::from_values(config, params)
    }

    /// Loads the documents named by `TEXTSUM_CONFIG` / `TEXTSUM_PARAMS`,
    /// defaulting to `config/config.yaml` and `params.yaml`.
    pub fn from_env() -> TextsumResult<Self> {
        let config = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let params = std::env::var(PARAMS_PATH_ENV).unwrap_or_else(|_| DEFAULT_PARAMS_PATH.to_string());
        Self::new(config, params)
    }

    pub fn from_yaml_strs(config: &str, params: &str) -> TextsumResult<Self> {
        let config = parse_yaml(config).map_err(|e| TextsumError::ConfigParse(format!("config: {e}")))?;
        let params = parse_yaml(params).map_err(|e| TextsumError::ConfigParse(format!("params: {e}")))?;
        Self::from_values(config, params)
    }

    fn from_values(config: serde_yaml::Value, params: serde_yaml::Value) -> TextsumResult<Self> {
        let config: ConfigDocument = serde_yaml::from_value(config)
            .map_err(|e| TextsumError::ConfigParse(format!("config: {e}")))?;
        let params: ParamsDocument = serde_yaml::from_value(params)
            .map_err(|e| TextsumError::ConfigParse(format!("params: {e}")))?;

        create_directories(&[&config.artifacts_root])?;
        debug!(training_args = ?params.training_arguments, "hyperparameters loaded");
        Ok(Self { config, params })
    }

    pub fn artifacts_root(&self) -> &Path {
        &self.config.artifacts_root
    }

    pub fn data_ingestion_config(&self) -> TextsumResult<DataIngestionConfig> {
        let cfg = self.config.data_ingestion.clone();
        create_directories(&[&cfg.root_dir])?;
        Ok(cfg)
    }

    pub fn data_validation_config(&self) -> TextsumResult<DataValidationConfig> {
        let cfg = self.config.data_validation.clone();
        create_directories(&[&cfg.root_dir])?;
        Ok(cfg)
    }

    pub fn data_transformation_config(&self) -> TextsumResult<DataTransformationConfig> {
        let mut cfg = self.config.data_transformation.clone();
        cfg.status_file = self.config.data_validation.status_file_path();
        create_directories(&[&cfg.root_dir])?;
        Ok(cfg)
    }

    pub fn model_trainer_config(&self) -> TextsumResult<ModelTrainerConfig> {
        let mut cfg = self.config.model_trainer.clone();
        cfg.training_args = self.params.training_arguments.clone();
        create_directories(&[&cfg.root_dir])?;
        Ok(cfg)
    }

    pub fn model_evaluation_config(&self) -> TextsumResult<ModelEvaluationConfig> {
        let cfg = self.config.model_evaluation.clone();
        create_directories(&[&cfg.root_dir])?;
        Ok(cfg)
    }

    pub fn prediction_config(&self) -> PredictionConfig {
        self.config
            .prediction
            .clone()
            .unwrap_or_else(|| PredictionConfig::from_trainer(&self.config.model_trainer))
    }

    pub fn backend_config(&self) -> TextsumResult<BackendConfig> {
        let cfg = self.config.backend.clone();
        create_directories(&[&cfg.cache_dir])?;
        info!(cache_dir = %cfg.cache_dir.display(), endpoint = %cfg.hub_endpoint, "checkpoint backend");
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PARAMS: &str = "TrainingArguments:\n  num_train_epochs: 1\n  warmup_steps: 500\n  gradient_accumulation_steps: 16\n";

    fn config_yaml(root: &Path) -> String {
        let r = root.display();
        format!(
            r#"
artifacts_root: {r}/artifacts
data_ingestion:
  root_dir: {r}/artifacts/data_ingestion
  source_URL: {r}/data.zip
  local_data_file: {r}/artifacts/data_ingestion/data.zip
  unzip_dir: {r}/artifacts/data_ingestion
data_validation:
  root_dir: {r}/artifacts/data_validation
  STATUS_FILE: {r}/artifacts/data_validation/status.txt
  ALL_REQUIRED_FILES: [train.csv, validation.csv, test.csv]
data_transformation:
  root_dir: {r}/artifacts/data_transformation
  data_path: {r}/artifacts/data_ingestion/samsum
  tokenizer_name: google-t5/t5-small
model_trainer:
  root_dir: {r}/artifacts/model_trainer
  data_path: {r}/artifacts/data_transformation/samsum_dataset
  model_ckpt: google-t5/t5-small
model_evaluation:
  root_dir: {r}/artifacts/model_evaluation
  data_path: {r}/artifacts/data_transformation/samsum_dataset
  model_path: {r}/artifacts/model_trainer/summarizer
  tokenizer_path: {r}/artifacts/model_trainer/summarizer
  metric_file_name: metrics.csv
backend:
  cache_dir: {r}/cache
"#
        )
    }

    #[test]
    fn test_getters_create_stage_roots() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigurationManager::from_yaml_strs(&config_yaml(temp.path()), PARAMS).unwrap();
        assert!(manager.artifacts_root().is_dir());

        let validation = manager.data_validation_config().unwrap();
        assert!(validation.root_dir.is_dir());
        assert_eq!(validation.required_files.len(), 3);

        let transformation = manager.data_transformation_config().unwrap();
        assert_eq!(transformation.status_file, validation.status_file_path());
        assert!(transformation.output_dir().ends_with("samsum_dataset"));

        let trainer = manager.model_trainer_config().unwrap();
        assert_eq!(trainer.training_args.num_train_epochs, 1);
        assert_eq!(trainer.training_args.gradient_accumulation_steps, 16);

        let prediction = manager.prediction_config();
        assert_eq!(prediction.model_path, trainer.model_dir());
        assert_eq!(prediction.model_ckpt, "google-t5/t5-small");

        assert!(manager.backend_config().unwrap().cache_dir.is_dir());
    }

    #[test]
    fn test_missing_section_is_config_error() {
        let err = ConfigurationManager::from_yaml_strs("artifacts_root: artifacts\n", PARAMS).unwrap_err();
        assert!(matches!(err, TextsumError::ConfigParse(_)));
    }

    #[test]
    fn test_empty_params_is_config_error() {
        let temp = TempDir::new().unwrap();
        let err = ConfigurationManager::from_yaml_strs(&config_yaml(temp.path()), "").unwrap_err();
        assert!(err.to_string().contains("yaml file is empty"));
    }
}
