//! Backend contracts: the sequence-to-sequence model and the backend that loads it.

use crate::collator::Batch;
use crate::device::Device;
use crate::error::MlResult;
use crate::tokenizer::Tokenizer;
use candle_core::{Tensor, Var};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Decoding constraints for summary generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub num_beams: usize,
    pub length_penalty: f64,
    pub min_length: usize,
    pub max_length: usize,
    pub no_repeat_ngram_size: usize,
}

impl GenerationParams {
    /// Concise, non-repetitive summaries.
    pub const SUMMARY: Self = Self {
        num_beams: 8,
        length_penalty: 0.8,
        min_length: 30,
        max_length: 128,
        no_repeat_ngram_size: 3,
    };
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::SUMMARY
    }
}

pub trait Seq2SeqModel: Send + Sync {
    /// Architecture name written to `config.json`
    fn model_type(&self) -> &str;

    /// Checkpoint the weights were initialized from
    fn base_checkpoint(&self) -> &str;

    fn device(&self) -> Device;

    /// Token-mean cross-entropy of the batch labels under teacher forcing.
    /// The returned scalar is attached to the autograd graph of
    /// [`trainable_vars`](Self::trainable_vars).
    fn loss(&mut self, batch: &Batch) -> MlResult<Tensor>;

    fn trainable_vars(&self) -> Vec<Var>;

    /// Generates summary ids for `input_ids` under `params`, without the
    /// decoder start and end-of-sequence tokens.
    fn generate(&mut self, input_ids: &[u32], params: &GenerationParams) -> MlResult<Vec<u32>>;

    fn generate_batch(&mut self, inputs: &[Vec<u32>], params: &GenerationParams) -> MlResult<Vec<Vec<u32>>> {
        inputs.iter().map(|ids| self.generate(ids, params)).collect()
    }

    /// Writes the model files (config, weights, generation config) into `dir`.
    fn save_pretrained(&self, dir: &Path) -> MlResult<()>;
}

/// Source of tokenizers and models by checkpoint id or local path.
pub trait SummarizerBackend: Send + Sync {
    /// Files a saved model directory (model + tokenizer) must contain.
    fn model_files(&self) -> &'static [&'static str];

    fn load_tokenizer(&self, name_or_path: &str) -> MlResult<Box<dyn Tokenizer>>;

    fn load_model(&self, name_or_path: &str, device: Device) -> MlResult<Box<dyn Seq2SeqModel>>;

    /// Whether `dir` holds every file of [`model_files`](Self::model_files).
    fn is_complete(&self, dir: &Path) -> bool {
        dir.is_dir() && self.model_files().iter().all(|f| dir.join(f).exists())
    }
}
