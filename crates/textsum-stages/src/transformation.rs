//! Data transformation: tokenize the CSV splits into a saved dataset.

use crate::validation::read_status;
use crate::{backend_error, ids};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use textsum_config::DataTransformationConfig;
use textsum_core::{ExecutionContext, Stage, StageError, StageResult};
use textsum_ml::dataset::load_csv_splits;
use textsum_ml::{DatasetDict, DialogueRecord, EncodedExample, MlResult, SummarizerBackend, Tokenizer, SPLITS};
use tracing::{error, info, warn};

/// Source (dialogue) truncation length in tokens.
pub const MAX_SOURCE_LENGTH: usize = 1024;
/// Target (summary) truncation length in tokens.
pub const MAX_TARGET_LENGTH: usize = 128;
/// Rows encoded per batch.
pub const ENCODE_BATCH_SIZE: usize = 1000;

/// Encodes dialogues and summaries of `rows`, `ENCODE_BATCH_SIZE` rows at a time.
pub fn convert_examples_to_features(
    tokenizer: &dyn Tokenizer,
    rows: Vec<DialogueRecord>,
) -> MlResult<Vec<EncodedExample>> {
    let mut out = Vec::with_capacity(rows.len());
    for batch in rows.chunks(ENCODE_BATCH_SIZE) {
        let dialogues: Vec<&str> = batch.iter().map(|r| r.dialogue.as_str()).collect();
        let summaries: Vec<&str> = batch.iter().map(|r| r.summary.as_str()).collect();
        let inputs = tokenizer.encode_batch(&dialogues, MAX_SOURCE_LENGTH)?;
        let targets = tokenizer.encode_batch(&summaries, MAX_TARGET_LENGTH)?;

        for ((row, input), target) in batch.iter().zip(inputs).zip(targets) {
            out.push(EncodedExample {
                id: row.id.clone(),
                dialogue: row.dialogue.clone(),
                summary: row.summary.clone(),
                input_ids: input.input_ids,
                attention_mask: input.attention_mask,
                labels: target.input_ids,
            });
        }
    }
    Ok(out)
}

pub struct DataTransformationStage {
    config: DataTransformationConfig,
    backend: Arc<dyn SummarizerBackend>,
}

impl DataTransformationStage {
    pub fn new(config: DataTransformationConfig, backend: Arc<dyn SummarizerBackend>) -> Self {
        Self { config, backend }
    }

    /// Loads the splits under `data_path`, encodes them and saves the
    /// dataset. Returns the output directory.
    pub fn convert(&self, data_path: &Path) -> Result<PathBuf, StageError> {
        if !read_status(&self.config.status_file)? {
            error!(status_file = %self.config.status_file.display(), "refusing to transform unvalidated data");
            return Err(StageError::ValidationFailed(format!(
                "validation status in {} is not True",
                self.config.status_file.display()
            )));
        }

        let tokenizer = self
            .backend
            .load_tokenizer(&self.config.tokenizer_name)
            .map_err(backend_error)?;
        let raw = load_csv_splits(data_path, &SPLITS).map_err(backend_error)?;

        let mut splits = BTreeMap::new();
        for (name, rows) in raw {
            let encoded = convert_examples_to_features(tokenizer.as_ref(), rows).map_err(backend_error)?;
            info!(split = %name, rows = encoded.len(), "split encoded");
            splits.insert(name, encoded);
        }

        let dataset = DatasetDict { splits };
        let save_path = self.config.output_dir();
        dataset.save_to_disk(&save_path).map_err(backend_error)?;
        info!("Data transformation completed. Dataset saved to {}", save_path.display());
        Ok(save_path)
    }
}

impl Stage for DataTransformationStage {
    fn id(&self) -> &'static str {
        ids::DATA_TRANSFORMATION
    }

    fn name(&self) -> &'static str {
        "Data Transformation Stage"
    }

    fn run(&self, ctx: &ExecutionContext) -> Result<StageResult, StageError> {
        // a registered ingestion artifact wins over the configured data_path
        let data_path = match ctx.artifacts.get(ids::DATA_INGESTION) {
            Some(artifact) => {
                if artifact.path != self.config.data_path {
                    warn!(
                        registered = %artifact.path.display(),
                        configured = %self.config.data_path.display(),
                        "using registered ingestion artifact instead of configured data_path"
                    );
                }
                artifact.path
            }
            None => self.config.data_path.clone(),
        };
        let save_path = self.convert(&data_path)?;
        let artifact = ctx.artifacts.put(self.id(), &save_path)?;
        Ok(StageResult::success(
            format!("dataset saved to {}", save_path.display()),
            Some(artifact),
        ))
    }
}
