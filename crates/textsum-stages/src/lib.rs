//! textsum Stages: the five pipeline stages, the prediction service and the
//! builders that wire them from configuration.
//!
//! # Pipeline Flow
//!
//! ```text
//! source → Ingestion → Validation → Transformation → Trainer → Evaluation
//!              ↓            ↓              ↓             ↓           ↓
//!          dataset dir  status.txt   encoded dataset  model dir  metrics.csv
//! ```
//!
//! Each stage registers its output in the artifact store; the next stage
//! reads it from there, falling back to the path in its own config.

mod evaluation;
mod ingestion;
mod model_trainer;
mod prediction;
mod transformation;
mod validation;

pub use evaluation::ModelEvaluationStage;
pub use ingestion::{safe_entry_path, DataIngestionStage};
pub use model_trainer::ModelTrainerStage;
pub use prediction::PredictionService;
pub use transformation::{
    convert_examples_to_features, DataTransformationStage, ENCODE_BATCH_SIZE, MAX_SOURCE_LENGTH,
    MAX_TARGET_LENGTH,
};
pub use validation::{read_status, status_line, DataValidationStage};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use textsum_config::ConfigurationManager;
use textsum_core::{
    ExecutionContext, FsArtifactStore, PipelineReport, PipelineRunner, Stage, StageError,
    TextsumError, TextsumResult,
};
use textsum_ml::{HubCheckpointProvider, MlError, SummarizerBackend, T5Backend};

/// Stage ids, also the artifact keys.
pub mod ids {
    pub const DATA_INGESTION: &str = "data_ingestion";
    pub const DATA_VALIDATION: &str = "data_validation";
    pub const DATA_TRANSFORMATION: &str = "data_transformation";
    pub const MODEL_TRAINER: &str = "model_trainer";
    pub const MODEL_EVALUATION: &str = "model_evaluation";

    pub const ALL: [&str; 5] = [
        DATA_INGESTION,
        DATA_VALIDATION,
        DATA_TRANSFORMATION,
        MODEL_TRAINER,
        MODEL_EVALUATION,
    ];
}

pub(crate) fn backend_error(e: MlError) -> StageError {
    match e {
        MlError::Io(io) => StageError::Io(io),
        other => StageError::Backend(other.to_string()),
    }
}

pub(crate) fn into_stage_error(e: TextsumError) -> StageError {
    match e {
        TextsumError::Io(io) => StageError::Io(io),
        other => StageError::ExecutionFailed(other.to_string()),
    }
}

/// The T5 backend, resolving checkpoints per the `backend` config section.
pub fn reference_backend(manager: &ConfigurationManager) -> TextsumResult<Arc<dyn SummarizerBackend>> {
    let cfg = manager.backend_config()?;
    let provider = HubCheckpointProvider::new(cfg.cache_dir.clone(), cfg.hub_endpoint.clone())
        .with_timeout(cfg.download_timeout());
    Ok(Arc::new(T5Backend::new(Arc::new(provider))))
}

/// Artifact store rooted at the configured `artifacts_root`.
pub fn open_artifact_store(manager: &ConfigurationManager) -> TextsumResult<Arc<FsArtifactStore>> {
    Ok(Arc::new(FsArtifactStore::open(manager.artifacts_root())?))
}

/// Builds one stage by id.
pub fn stage_by_id(
    id: &str,
    manager: &ConfigurationManager,
    backend: &Arc<dyn SummarizerBackend>,
) -> TextsumResult<Box<dyn Stage>> {
    let stage: Box<dyn Stage> = match id {
        ids::DATA_INGESTION => Box::new(DataIngestionStage::new(manager.data_ingestion_config()?)),
        ids::DATA_VALIDATION => Box::new(DataValidationStage::new(manager.data_validation_config()?)),
        ids::DATA_TRANSFORMATION => Box::new(DataTransformationStage::new(
            manager.data_transformation_config()?,
            Arc::clone(backend),
        )),
        ids::MODEL_TRAINER => Box::new(ModelTrainerStage::new(
            manager.model_trainer_config()?,
            Arc::clone(backend),
        )),
        ids::MODEL_EVALUATION => Box::new(ModelEvaluationStage::new(
            manager.model_evaluation_config()?,
            Arc::clone(backend),
        )),
        other => {
            return Err(TextsumError::InvalidInput(format!(
                "unknown stage '{}' (expected one of: {})",
                other,
                ids::ALL.join(", ")
            )))
        }
    };
    Ok(stage)
}

/// All five stages, ingestion through evaluation.
pub fn training_pipeline(
    manager: &ConfigurationManager,
    backend: Arc<dyn SummarizerBackend>,
) -> TextsumResult<PipelineRunner> {
    let stages = ids::ALL
        .iter()
        .map(|id| stage_by_id(id, manager, &backend))
        .collect::<TextsumResult<Vec<_>>>()?;
    Ok(PipelineRunner::new(stages))
}

/// Ingestion only.
pub fn ingestion_pipeline(manager: &ConfigurationManager) -> TextsumResult<PipelineRunner> {
    let stage = DataIngestionStage::new(manager.data_ingestion_config()?);
    Ok(PipelineRunner::new(vec![Box::new(stage)]))
}

/// Which stages a pipeline invocation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineSelection {
    All,
    Ingestion,
    Stage(String),
}

impl PipelineSelection {
    pub fn build(
        &self,
        manager: &ConfigurationManager,
        backend: Arc<dyn SummarizerBackend>,
    ) -> TextsumResult<PipelineRunner> {
        match self {
            Self::All => training_pipeline(manager, backend),
            Self::Ingestion => ingestion_pipeline(manager),
            Self::Stage(id) => Ok(PipelineRunner::new(vec![stage_by_id(id, manager, &backend)?])),
        }
    }
}

impl FromStr for PipelineSelection {
    type Err = TextsumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "all" => Ok(Self::All),
            "ingestion" => Ok(Self::Ingestion),
            id if ids::ALL.contains(&id) => Ok(Self::Stage(id.to_string())),
            other => Err(TextsumError::InvalidInput(format!(
                "unknown pipeline '{}' (expected all, ingestion or one of: {})",
                other,
                ids::ALL.join(", ")
            ))),
        }
    }
}

impl fmt::Display for PipelineSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Ingestion => f.write_str("ingestion"),
            Self::Stage(id) => f.write_str(id),
        }
    }
}

/// Runs `selection` with the reference backend and a fresh run context.
pub fn run_pipeline(manager: &ConfigurationManager, selection: &PipelineSelection) -> TextsumResult<PipelineReport> {
    let backend = reference_backend(manager)?;
    let store = open_artifact_store(manager)?;
    let runner = selection.build(manager, backend)?;
    let ctx = ExecutionContext::new(store);
    tracing::info!(run_id = %ctx.run_id, pipeline = runner.pipeline_id(), "pipeline run starting");
    runner.run_all(&ctx)
}
