//! Model evaluation: ROUGE of generated summaries on the held-out split.

use crate::{backend_error, ids};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use textsum_config::ModelEvaluationConfig;
use textsum_core::{ExecutionContext, Stage, StageError, StageResult, TrainedModelHandle};
use textsum_ml::{
    rouge_scores, DatasetDict, Device, GenerationParams, RougeScores, SummarizerBackend,
};
use tracing::{debug, info};

pub struct ModelEvaluationStage {
    config: ModelEvaluationConfig,
    backend: Arc<dyn SummarizerBackend>,
}

impl ModelEvaluationStage {
    pub fn new(config: ModelEvaluationConfig, backend: Arc<dyn SummarizerBackend>) -> Self {
        Self { config, backend }
    }

    /// Generates summaries for the first `eval_samples` test rows and scores them.
    pub fn evaluate(&self, model_path: &Path, tokenizer_path: &Path, data_path: &Path) -> Result<RougeScores, StageError> {
        if !self.backend.is_complete(model_path) {
            return Err(StageError::MissingArtifact(format!(
                "no trained model at {}",
                model_path.display()
            )));
        }
        if let Some(handle) = TrainedModelHandle::read(model_path)? {
            info!(base_checkpoint = %handle.base_checkpoint, "evaluating trained model");
        }

        let device = Device::detect();
        let tokenizer = self
            .backend
            .load_tokenizer(&tokenizer_path.to_string_lossy())
            .map_err(backend_error)?;
        let mut model = self
            .backend
            .load_model(&model_path.to_string_lossy(), device)
            .map_err(backend_error)?;

        let dataset = DatasetDict::load_from_disk(data_path).map_err(backend_error)?;
        let test = dataset.split("test").map_err(backend_error)?;
        let samples = &test[..self.config.eval_samples.min(test.len())];

        let params = GenerationParams::SUMMARY;
        let mut predictions = Vec::with_capacity(samples.len());
        let mut references = Vec::with_capacity(samples.len());
        for (batch_idx, batch) in samples.chunks(self.config.eval_batch_size.max(1)).enumerate() {
            debug!(batch = batch_idx, size = batch.len(), "generating summaries");
            let inputs: Vec<Vec<u32>> = batch.iter().map(|e| e.input_ids.clone()).collect();
            let generated = model.generate_batch(&inputs, &params).map_err(backend_error)?;
            for (example, ids) in batch.iter().zip(generated) {
                predictions.push(tokenizer.decode(&ids).map_err(backend_error)?);
                references.push(example.summary.as_str());
            }
        }

        Ok(rouge_scores(predictions.as_slice(), references.as_slice()))
    }

    /// Writes `rouge1,rouge2,rougeL,rougeLsum` and one row of scores.
    pub fn write_metrics(&self, scores: &RougeScores) -> Result<PathBuf, StageError> {
        let path = self.config.metric_file_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let csv_err = |e: csv::Error| StageError::ExecutionFailed(format!("writing {}: {}", path.display(), e));
        let mut writer = csv::Writer::from_path(&path).map_err(csv_err)?;
        writer.write_record(RougeScores::NAMES).map_err(csv_err)?;
        let row: Vec<String> = RougeScores::NAMES
            .iter()
            .map(|name| scores.get(name).unwrap_or_default().to_string())
            .collect();
        writer.write_record(&row).map_err(csv_err)?;
        writer.flush()?;
        Ok(path)
    }
}

impl Stage for ModelEvaluationStage {
    fn id(&self) -> &'static str {
        ids::MODEL_EVALUATION
    }

    fn name(&self) -> &'static str {
        "Model Evaluation Stage"
    }

    fn run(&self, ctx: &ExecutionContext) -> Result<StageResult, StageError> {
        let (model_path, tokenizer_path) = match ctx.artifacts.get(ids::MODEL_TRAINER) {
            Some(artifact) => (artifact.path.clone(), artifact.path),
            None => (self.config.model_path.clone(), self.config.tokenizer_path.clone()),
        };
        let data_path = ctx
            .artifacts
            .get(ids::DATA_TRANSFORMATION)
            .map(|a| a.path)
            .unwrap_or_else(|| self.config.data_path.clone());

        let scores = self.evaluate(&model_path, &tokenizer_path, &data_path)?;
        info!(
            rouge1 = scores.rouge1,
            rouge2 = scores.rouge2,
            rouge_l = scores.rouge_l,
            rouge_lsum = scores.rouge_lsum,
            "Model evaluation completed"
        );
        let path = self.write_metrics(&scores)?;
        let artifact = ctx.artifacts.put(self.id(), &path)?;
        Ok(StageResult::success(
            format!("metrics written to {}", path.display()),
            Some(artifact),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, encoded_dataset, reference_backend, saved_base_model};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use textsum_ml::{Batch, MlResult, Seq2SeqModel, Tokenizer};

    /// Records the size of every `generate_batch` call.
    struct BatchRecorder {
        inner: Arc<dyn SummarizerBackend>,
        sizes: Arc<Mutex<Vec<usize>>>,
    }

    struct RecordingModel {
        inner: Box<dyn Seq2SeqModel>,
        sizes: Arc<Mutex<Vec<usize>>>,
    }

    impl Seq2SeqModel for RecordingModel {
        fn model_type(&self) -> &str {
            self.inner.model_type()
        }
        fn base_checkpoint(&self) -> &str {
            self.inner.base_checkpoint()
        }
        fn device(&self) -> Device {
            self.inner.device()
        }
        fn loss(&mut self, batch: &Batch) -> MlResult<candle_core::Tensor> {
            self.inner.loss(batch)
        }
        fn trainable_vars(&self) -> Vec<candle_core::Var> {
            self.inner.trainable_vars()
        }
        fn generate(&mut self, input_ids: &[u32], params: &GenerationParams) -> MlResult<Vec<u32>> {
            self.inner.generate(input_ids, params)
        }
        fn generate_batch(&mut self, inputs: &[Vec<u32>], params: &GenerationParams) -> MlResult<Vec<Vec<u32>>> {
            self.sizes.lock().unwrap().push(inputs.len());
            self.inner.generate_batch(inputs, params)
        }
        fn save_pretrained(&self, dir: &Path) -> MlResult<()> {
            self.inner.save_pretrained(dir)
        }
    }

    impl SummarizerBackend for BatchRecorder {
        fn model_files(&self) -> &'static [&'static str] {
            self.inner.model_files()
        }
        fn load_tokenizer(&self, name_or_path: &str) -> MlResult<Box<dyn Tokenizer>> {
            self.inner.load_tokenizer(name_or_path)
        }
        fn load_model(&self, name_or_path: &str, device: Device) -> MlResult<Box<dyn Seq2SeqModel>> {
            Ok(Box::new(RecordingModel {
                inner: self.inner.load_model(name_or_path, device)?,
                sizes: Arc::clone(&self.sizes),
            }))
        }
    }

    fn config(root: &Path) -> ModelEvaluationConfig {
        ModelEvaluationConfig {
            root_dir: root.join("model_evaluation"),
            data_path: root.join("samsum_dataset"),
            model_path: root.join("summarizer"),
            tokenizer_path: root.join("summarizer"),
            metric_file_name: PathBuf::from("metrics.csv"),
            eval_samples: 3,
            eval_batch_size: 2,
        }
    }

    #[test]
    fn test_metrics_csv_has_rouge_header_and_one_row() {
        let temp = TempDir::new().unwrap();
        encoded_dataset(&temp.path().join("samsum_dataset"), 5);
        saved_base_model(&temp.path().join("summarizer"));
        let (_store_dir, ctx) = context();

        let result = ModelEvaluationStage::new(config(temp.path()), reference_backend(temp.path()))
            .run(&ctx)
            .unwrap();
        assert!(result.is_ok());

        let csv = std::fs::read_to_string(temp.path().join("model_evaluation/metrics.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "rouge1,rouge2,rougeL,rougeLsum");
        let values: Vec<f64> = lines[1].split(',').map(|v| v.parse().unwrap()).collect();
        assert_eq!(values.len(), 4);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_generation_runs_in_eval_batch_size_chunks() {
        let temp = TempDir::new().unwrap();
        encoded_dataset(&temp.path().join("samsum_dataset"), 5);
        saved_base_model(&temp.path().join("summarizer"));
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let backend = Arc::new(BatchRecorder {
            inner: reference_backend(temp.path()),
            sizes: Arc::clone(&sizes),
        });

        let summarizer = temp.path().join("summarizer");
        ModelEvaluationStage::new(config(temp.path()), backend)
            .evaluate(&summarizer, &summarizer, &temp.path().join("samsum_dataset"))
            .unwrap();
        assert_eq!(*sizes.lock().unwrap(), vec![2, 1]);
    }

    #[test]
    fn test_missing_model_fails() {
        let temp = TempDir::new().unwrap();
        encoded_dataset(&temp.path().join("samsum_dataset"), 2);
        let (_store_dir, ctx) = context();
        let err = ModelEvaluationStage::new(config(temp.path()), reference_backend(temp.path()))
            .run(&ctx)
            .unwrap_err();
        assert!(matches!(err, StageError::MissingArtifact(_)));
    }
}
