//! textsum configuration: YAML documents in, immutable per-stage configs out.

pub mod common;
pub mod entity;
pub mod manager;

pub use common::{create_directories, get_size, read_yaml};
pub use entity::{
    BackendConfig, DataIngestionConfig, DataTransformationConfig, DataValidationConfig,
    ModelEvaluationConfig, ModelTrainerConfig, PredictionConfig,
};
pub use manager::ConfigurationManager;
