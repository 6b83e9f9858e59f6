//! Stage Trait: single contract for every pipeline stage
use crate::context::ExecutionContext;
use crate::data_model::StageResult;
use thiserror::Error;

/// Contract of one artifact-producing pipeline stage.
///
/// A stage owns its configuration slice, reads upstream artifacts through
/// [`ExecutionContext::artifacts`] and writes exactly one downstream
/// artifact (or a status file, for validation).
pub trait Stage: Send + Sync {
    /// Stable id, also the artifact directory name (ex: "data_ingestion")
    fn id(&self) -> &'static str;

    /// Human-readable name used at stage boundaries in the logs
    fn name(&self) -> &'static str;

    /// Executes the stage
    fn run(&self, ctx: &ExecutionContext) -> Result<StageResult, StageError>;
}

#[derive(Debug, Error)]
pub enum StageError {
    /// An upstream artifact (directory or file) is absent.
    #[error("ARTIFACT/MISSING: {0}")]
    MissingArtifact(String),

    #[error("PARSE/VALIDATION: {0}")]
    ValidationFailed(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("BACKEND: {0}")]
    Backend(String),

    #[error("STAGE/EXEC: {0}")]
    ExecutionFailed(String),
}
