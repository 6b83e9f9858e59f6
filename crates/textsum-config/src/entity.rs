//! Per-stage configuration entities.
//!
//! Each struct mirrors one section of `config/config.yaml`. Unknown keys are
//! rejected; keys spelled the way older config files spell them
//! (`source_URL`, `ALL_REQUIRED_FILES`, `STATUS_FILE`) are accepted as aliases.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use textsum_ml::TrainingArguments;

pub const DEFAULT_DATASET_NAME: &str = "samsum";
pub const STATUS_FILE_NAME: &str = "status.txt";
pub const MODEL_DIR_NAME: &str = "summarizer";

fn default_dataset_name() -> String {
    DEFAULT_DATASET_NAME.to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataIngestionConfig {
    pub root_dir: PathBuf,
    /// `http(s)://` URL, `file://` URL or local path of a zip archive or directory.
    #[serde(alias = "source_URL")]
    pub source_url: String,
    pub local_data_file: PathBuf,
    pub unzip_dir: PathBuf,
    #[serde(default = "default_dataset_name")]
    pub dataset_name: String,
}

impl DataIngestionConfig {
    /// Where the extracted dataset lands.
    pub fn dataset_dir(&self) -> PathBuf {
        self.unzip_dir.join(&self.dataset_name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataValidationConfig {
    pub root_dir: PathBuf,
    /// Ingestion output to check when no `data_ingestion` artifact is registered.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default, alias = "STATUS_FILE")]
    pub status_file: Option<PathBuf>,
    #[serde(alias = "ALL_REQUIRED_FILES")]
    pub required_files: BTreeSet<String>,
}

impl DataValidationConfig {
    pub fn status_file_path(&self) -> PathBuf {
        self.status_file
            .clone()
            .unwrap_or_else(|| self.root_dir.join(STATUS_FILE_NAME))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataTransformationConfig {
    pub root_dir: PathBuf,
    pub data_path: PathBuf,
    pub tokenizer_name: String,
    #[serde(default = "default_dataset_name")]
    pub dataset_name: String,
    /// Filled from the validation section.
    #[serde(skip)]
    pub status_file: PathBuf,
}

impl DataTransformationConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.root_dir.join(format!("{}_dataset", self.dataset_name))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelTrainerConfig {
    pub root_dir: PathBuf,
    pub data_path: PathBuf,
    #[serde(alias = "model_checkpoint_id")]
    pub model_ckpt: String,
    /// Filled from `params.yaml`.
    #[serde(skip)]
    pub training_args: TrainingArguments,
}

impl ModelTrainerConfig {
    pub fn model_dir(&self) -> PathBuf {
        self.root_dir.join(MODEL_DIR_NAME)
    }
}

fn default_eval_samples() -> usize {
    10
}

fn default_eval_batch_size() -> usize {
    2
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelEvaluationConfig {
    pub root_dir: PathBuf,
    pub data_path: PathBuf,
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub metric_file_name: PathBuf,
    #[serde(default = "default_eval_samples")]
    pub eval_samples: usize,
    #[serde(default = "default_eval_batch_size")]
    pub eval_batch_size: usize,
}

impl ModelEvaluationConfig {
    pub fn metric_file_path(&self) -> PathBuf {
        self.root_dir.join(&self.metric_file_name)
    }
}

/// Where the prediction service looks for a model. Defaults to the trainer's
/// output directory and base checkpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictionConfig {
    pub model_path: PathBuf,
    #[serde(alias = "model_checkpoint_id")]
    pub model_ckpt: String,
}

impl PredictionConfig {
    pub fn from_trainer(trainer: &ModelTrainerConfig) -> Self {
        Self {
            model_path: trainer.model_dir(),
            model_ckpt: trainer.model_ckpt.clone(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("artifacts/checkpoints")
}

fn default_hub_endpoint() -> String {
    "https://huggingface.co".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

/// Checkpoint resolution settings for the model backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_hub_endpoint")]
    pub hub_endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl BackendConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            hub_endpoint: default_hub_endpoint(),
            download_timeout_secs: default_timeout_secs(),
        }
    }
}
