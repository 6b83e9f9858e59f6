//! Model training: fine-tune the pretrained checkpoint on the encoded dataset.

use crate::{backend_error, ids};
use std::path::PathBuf;
use std::sync::Arc;
use textsum_config::ModelTrainerConfig;
use textsum_core::{ExecutionContext, Stage, StageError, StageResult, TrainedModelHandle};
use textsum_ml::{
    DatasetDict, Device, Seq2SeqCollator, Seq2SeqModel, Seq2SeqTrainer, SummarizerBackend, Tokenizer,
};
use tracing::{info, warn};

pub struct ModelTrainerStage {
    config: ModelTrainerConfig,
    backend: Arc<dyn SummarizerBackend>,
}

impl ModelTrainerStage {
    pub fn new(config: ModelTrainerConfig, backend: Arc<dyn SummarizerBackend>) -> Self {
        Self { config, backend }
    }

    /// Whether the model directory already holds a complete saved model.
    pub fn is_model_trained(&self) -> bool {
        self.backend.is_complete(&self.config.model_dir())
    }

    /// Tokenizer and model to start from: a leftover local model directory
    /// when it loads, otherwise the configured checkpoint.
    fn load_pretrained(&self, device: Device) -> Result<(Box<dyn Tokenizer>, Box<dyn Seq2SeqModel>), StageError> {
        let local = self.config.model_dir();
        if local.is_dir() {
            info!("Loading model from local directory: {}", local.display());
            let source = local.to_string_lossy();
            match self
                .backend
                .load_tokenizer(&source)
                .and_then(|t| Ok((t, self.backend.load_model(&source, device)?)))
            {
                Ok(loaded) => return Ok(loaded),
                Err(e) => warn!(error = %e, "local model directory unusable, falling back to checkpoint"),
            }
        }

        info!("Downloading model from {}", self.config.model_ckpt);
        let tokenizer = self
            .backend
            .load_tokenizer(&self.config.model_ckpt)
            .map_err(backend_error)?;
        let model = self
            .backend
            .load_model(&self.config.model_ckpt, device)
            .map_err(backend_error)?;
        Ok((tokenizer, model))
    }

    /// Trains and saves model, tokenizer and handle. Returns the model directory.
    pub fn train(&self, data_path: &std::path::Path) -> Result<PathBuf, StageError> {
        let device = Device::detect();
        info!("Starting model training on device: {}", device);
        std::fs::create_dir_all(&self.config.root_dir)?;

        let (tokenizer, mut model) = self.load_pretrained(device)?;

        info!("Loading dataset from {}", data_path.display());
        let dataset = DatasetDict::load_from_disk(data_path).map_err(backend_error)?;
        let train = dataset.split("train").map_err(backend_error)?;
        let eval = dataset.split("validation").ok();

        info!("Starting model training...");
        {
            let mut trainer = Seq2SeqTrainer::new(
                model.as_mut(),
                tokenizer.as_ref(),
                self.config.training_args.clone(),
                &self.config.root_dir,
                Seq2SeqCollator::new(tokenizer.pad_token_id()),
                train,
                eval,
            );
            let output = trainer.train().map_err(backend_error)?;
            info!(
                global_step = output.global_step,
                training_loss = output.training_loss,
                "trainer finished"
            );
        }

        let output_dir = self.config.model_dir();
        info!("Saving model and tokenizer to {}", output_dir.display());
        model.save_pretrained(&output_dir).map_err(backend_error)?;
        tokenizer.save_pretrained(&output_dir).map_err(backend_error)?;
        TrainedModelHandle::new(output_dir.clone(), model.base_checkpoint()).write()?;
        info!("Model training and saving completed successfully");
        Ok(output_dir)
    }
}

impl Stage for ModelTrainerStage {
    fn id(&self) -> &'static str {
        ids::MODEL_TRAINER
    }

    fn name(&self) -> &'static str {
        "Model Trainer Stage"
    }

    fn run(&self, ctx: &ExecutionContext) -> Result<StageResult, StageError> {
        let model_dir = self.config.model_dir();
        if self.is_model_trained() {
            info!("Model already exists at {}. Skipping training.", model_dir.display());
            let artifact = ctx.artifacts.put(self.id(), &model_dir)?;
            return Ok(StageResult::skipped(
                format!("model already trained at {}", model_dir.display()),
                Some(artifact),
            ));
        }

        let data_path = ctx
            .artifacts
            .get(ids::DATA_TRANSFORMATION)
            .map(|a| a.path)
            .unwrap_or_else(|| self.config.data_path.clone());
        let saved = self.train(&data_path)?;
        let artifact = ctx.artifacts.put(self.id(), &saved)?;
        Ok(StageResult::success(
            format!("model saved to {}", saved.display()),
            Some(artifact),
        ))
    }
}
