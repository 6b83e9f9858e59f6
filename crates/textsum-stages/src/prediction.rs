//! Prediction service: text in, summary out, independent of the pipeline.

use crate::transformation::MAX_SOURCE_LENGTH;
use std::sync::Arc;
use textsum_config::PredictionConfig;
use textsum_core::{TextsumError, TextsumResult};
use textsum_ml::{Device, GenerationParams, MlError, SummarizerBackend};
use tracing::{debug, info, warn};

fn model_error(e: MlError) -> TextsumError {
    TextsumError::Model(e.to_string())
}

/// Loads the model on every call; there is no cache between calls.
#[derive(Clone)]
pub struct PredictionService {
    config: PredictionConfig,
    backend: Arc<dyn SummarizerBackend>,
}

impl PredictionService {
    pub fn new(config: PredictionConfig, backend: Arc<dyn SummarizerBackend>) -> Self {
        Self { config, backend }
    }

    /// The trained model when it is complete on disk, else the base checkpoint.
    fn model_source(&self) -> String {
        if self.backend.is_complete(&self.config.model_path) {
            self.config.model_path.to_string_lossy().into_owned()
        } else {
            warn!(
                model_path = %self.config.model_path.display(),
                fallback = %self.config.model_ckpt,
                "no trained model found, using the pretrained checkpoint"
            );
            self.config.model_ckpt.clone()
        }
    }

    pub fn predict(&self, text: &str) -> TextsumResult<String> {
        if text.trim().is_empty() {
            return Err(TextsumError::InvalidInput("Text cannot be empty".to_string()));
        }

        let source = self.model_source();
        let device = Device::detect();
        info!(model = %source, %device, "loading summarizer");
        let tokenizer = self.backend.load_tokenizer(&source).map_err(model_error)?;
        let mut model = self.backend.load_model(&source, device).map_err(model_error)?;

        debug!(dialogue = %text, "summarizing");
        let input = tokenizer.encode(text, MAX_SOURCE_LENGTH).map_err(model_error)?;
        let generated = model
            .generate(&input.input_ids, &GenerationParams::SUMMARY)
            .map_err(model_error)?;
        let summary = tokenizer.decode(&generated).map_err(model_error)?;
        debug!(summary = %summary, "summary generated");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{reference_backend, saved_base_model, tiny_checkpoint};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn service(model_path: PathBuf, backend_root: &std::path::Path) -> PredictionService {
        PredictionService::new(
            PredictionConfig {
                model_path,
                model_ckpt: tiny_checkpoint(backend_root),
            },
            reference_backend(backend_root),
        )
    }

    #[test]
    fn test_blank_input_is_rejected() {
        let temp = TempDir::new().unwrap();
        let svc = service(temp.path().join("absent"), temp.path());
        assert!(matches!(svc.predict(""), Err(TextsumError::InvalidInput(_))));
        assert!(matches!(svc.predict("   \n"), Err(TextsumError::InvalidInput(_))));
    }

    #[test]
    fn test_falls_back_to_base_checkpoint() {
        let temp = TempDir::new().unwrap();
        let svc = service(temp.path().join("absent"), temp.path());
        let summary = svc.predict("Hi Amy, are we still on for lunch?").unwrap();
        assert!(!summary.is_empty());
    }

    #[test]
    fn test_uses_trained_model_directory() {
        let temp = TempDir::new().unwrap();
        let model_dir = temp.path().join("summarizer");
        saved_base_model(&model_dir);
        let svc = service(model_dir, temp.path());
        let summary = svc
            .predict("Amanda: I baked cookies. Do you want some?\nJerry: Sure!")
            .unwrap();
        assert!(!summary.is_empty());
    }

    #[test]
    fn test_foreign_model_directory_is_a_model_error() {
        let temp = TempDir::new().unwrap();
        let model_dir = temp.path().join("summarizer");
        saved_base_model(&model_dir);
        std::fs::write(
            model_dir.join("config.json"),
            r#"{"model_type": "pegasus", "d_model": 16}"#,
        )
        .unwrap();
        let svc = service(model_dir, temp.path());
        let err = svc.predict("hello there").unwrap_err();
        assert!(matches!(err, TextsumError::Model(ref m) if m.contains("pegasus")), "{err}");
    }
}
