//! Data validation: are all required split files present?

use crate::ids;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use textsum_config::DataValidationConfig;
use textsum_core::{ExecutionContext, Stage, StageError, StageResult};
use tracing::{error, info, warn};

const STATUS_PREFIX: &str = "Validation status: ";

/// `Validation status: True` / `Validation status: False`
pub fn status_line(ok: bool) -> String {
    format!("{STATUS_PREFIX}{}", if ok { "True" } else { "False" })
}

/// Whether the status file at `path` records a passed validation.
/// A missing file reads as not passed.
pub fn read_status(path: &Path) -> io::Result<bool> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.trim() == status_line(true)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

pub struct DataValidationStage {
    config: DataValidationConfig,
}

impl DataValidationStage {
    pub fn new(config: DataValidationConfig) -> Self {
        Self { config }
    }

    /// Checks `required_files ⊆ files in data_dir` and writes the status line.
    pub fn validate_all_files_exist(&self, data_dir: &Path) -> Result<bool, StageError> {
        let entries = match std::fs::read_dir(data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                error!(path = %data_dir.display(), "ingestion output is missing");
                return Err(StageError::MissingArtifact(format!(
                    "data directory not found: {}",
                    data_dir.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let mut existing = BTreeSet::new();
        for entry in entries {
            existing.insert(entry?.file_name().to_string_lossy().into_owned());
        }
        let valid = self.config.required_files.is_subset(&existing);

        let status_path = self.config.status_file_path();
        if let Some(parent) = status_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&status_path, status_line(valid))?;
        info!(valid, status_file = %status_path.display(), "validation status written");
        Ok(valid)
    }

    /// The registered ingestion artifact, else the configured `data_dir`.
    fn data_dir(&self, ctx: &ExecutionContext) -> Result<PathBuf, StageError> {
        match (ctx.artifacts.get(ids::DATA_INGESTION), &self.config.data_dir) {
            (Some(artifact), configured) => {
                if let Some(configured) = configured.as_ref().filter(|c| **c != artifact.path) {
                    warn!(
                        registered = %artifact.path.display(),
                        configured = %configured.display(),
                        "using registered ingestion artifact instead of configured data_dir"
                    );
                }
                Ok(artifact.path)
            }
            (None, Some(configured)) => Ok(configured.clone()),
            (None, None) => Err(StageError::MissingArtifact(
                "no ingestion artifact registered and no data_dir configured".to_string(),
            )),
        }
    }
}

impl Stage for DataValidationStage {
    fn id(&self) -> &'static str {
        ids::DATA_VALIDATION
    }

    fn name(&self) -> &'static str {
        "Data Validation Stage"
    }

    fn run(&self, ctx: &ExecutionContext) -> Result<StageResult, StageError> {
        let data_dir = self.data_dir(ctx)?;
        if self.validate_all_files_exist(&data_dir)? {
            let artifact = ctx.artifacts.put(self.id(), &self.config.status_file_path())?;
            return Ok(StageResult::success(status_line(true), Some(artifact)));
        }

        let present: BTreeSet<String> = std::fs::read_dir(&data_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        let missing: Vec<&str> = self
            .config
            .required_files
            .difference(&present)
            .map(String::as_str)
            .collect();
        Ok(StageResult::failure(format!(
            "{}; missing: {}",
            status_line(false),
            missing.join(", ")
        )))
    }
}
