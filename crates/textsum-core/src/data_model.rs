//! Data Model: StageResult, ArtifactRef, TrainedModelHandle, PipelineReport
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    /// Output already existed; nothing was recomputed.
    Skipped,
    Failure,
}

impl StageStatus {
    pub fn is_ok(self) -> bool {
        !matches!(self, Self::Failure)
    }
}

/// A filesystem-located output of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Producing stage id
    pub stage: String,
    /// Location of the artifact, relative to the working directory or absolute
    pub path: PathBuf,
    /// blake3 over relative file names and contents
    pub fingerprint: String,
    pub produced_at: DateTime<Utc>,
}

/// Outcome of one stage invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub status: StageStatus,
    pub message: String,
    pub artifact: Option<ArtifactRef>,
}

impl StageResult {
    pub fn success(message: impl Into<String>, artifact: Option<ArtifactRef>) -> Self {
        Self {
            status: StageStatus::Success,
            message: message.into(),
            artifact,
        }
    }

    pub fn skipped(message: impl Into<String>, artifact: Option<ArtifactRef>) -> Self {
        Self {
            status: StageStatus::Skipped,
            message: message.into(),
            artifact,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failure,
            message: message.into(),
            artifact: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// A fine-tuned model on disk and the checkpoint it started from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainedModelHandle {
    pub path: PathBuf,
    pub base_checkpoint: String,
    pub created_at: DateTime<Utc>,
}

impl TrainedModelHandle {
    /// File written next to the model files describing the handle.
    pub const FILE_NAME: &'static str = "trained_model.json";

    pub fn new(path: PathBuf, base_checkpoint: impl Into<String>) -> Self {
        Self {
            path,
            base_checkpoint: base_checkpoint.into(),
            created_at: Utc::now(),
        }
    }

    pub fn write(&self) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(self.path.join(Self::FILE_NAME), json)
    }

    /// Reads the handle stored in `model_dir`, if any.
    pub fn read(model_dir: &Path) -> std::io::Result<Option<Self>> {
        let path = model_dir.join(Self::FILE_NAME);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: String,
    pub name: String,
    pub result: StageResult,
    pub latency_ms: u64,
}

/// Everything a pipeline run produced, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub pipeline_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageRecord>,
    /// Stage whose failure stopped the run
    pub aborted_at: Option<String>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.aborted_at.is_none()
    }

    /// Plain-text rendering, one line per stage.
    pub fn render(&self) -> String {
        let mut out = format!("pipeline {} (run {})\n", self.pipeline_id, self.run_id);
        for record in &self.stages {
            out.push_str(&format!(
                "- {}: {:?} in {} ms: {}\n",
                record.name, record.result.status, record.latency_ms, record.result.message
            ));
        }
        match &self.aborted_at {
            Some(stage) => out.push_str(&format!("aborted at {}\n", stage)),
            None => out.push_str("completed successfully\n"),
        }
        out
    }
}
