//! T5-family encoder-decoder backend on candle.
//!
//! Weights live in a [`VarMap`] so the optimizer can update them in place
//! and `model.safetensors` is written straight from it. Training and
//! generation run one source row at a time because the candle T5 stack
//! takes no encoder attention mask.

use crate::checkpoint::CheckpointProvider;
use crate::collator::Batch;
use crate::device::Device;
use crate::error::{MlError, MlResult};
use crate::model::{GenerationParams, Seq2SeqModel, SummarizerBackend};
use crate::tokenizer::{HfTokenizer, Tokenizer};
use candle_core::{DType, Tensor, Var, D};
use candle_nn::{VarBuilder, VarMap};
use candle_transformers::models::t5;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const CONFIG_FILE: &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const GENERATION_CONFIG_FILE: &str = "generation_config.json";

/// `model_type` values this backend loads.
pub const SUPPORTED_MODEL_TYPES: [&str; 2] = ["t5", "mt5"];

static MODEL_FILES: [&str; 6] = [
    CONFIG_FILE,
    WEIGHTS_FILE,
    GENERATION_CONFIG_FILE,
    HfTokenizer::TOKENIZER_FILE,
    HfTokenizer::CONFIG_FILE,
    HfTokenizer::SPECIAL_TOKENS_FILE,
];

fn token_id(value: usize, field: &str) -> MlResult<u32> {
    u32::try_from(value).map_err(|_| MlError::Format(format!("{field} out of range: {value}")))
}

/// Reads `config.json`, refusing architectures other than T5.
fn read_config(dir: &Path) -> MlResult<(Value, t5::Config)> {
    let raw: Value = serde_json::from_slice(&std::fs::read(dir.join(CONFIG_FILE))?)?;
    let model_type = raw.get("model_type").and_then(Value::as_str).unwrap_or_default();
    if !SUPPORTED_MODEL_TYPES.contains(&model_type) {
        return Err(MlError::Unsupported(format!(
            "model_type '{model_type}' in {} (supported: {})",
            dir.display(),
            SUPPORTED_MODEL_TYPES.join(", ")
        )));
    }
    let config: t5::Config = serde_json::from_value(raw.clone())?;
    if !config.is_encoder_decoder {
        return Err(MlError::Unsupported("encoder-only T5 checkpoint".to_string()));
    }
    Ok((raw, config))
}

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<u32>,
    score: f64,
}

fn normalized(score: f64, length: usize, length_penalty: f64) -> f64 {
    score / (length.max(1) as f64).powf(length_penalty)
}

/// Tokens that would complete an `n`-gram already present in `generated`.
fn banned_by_ngrams(generated: &[u32], n: usize) -> HashSet<u32> {
    let mut banned = HashSet::new();
    if n == 0 || generated.len() + 1 < n {
        return banned;
    }
    let prefix = &generated[generated.len() + 1 - n..];
    for window in generated.windows(n) {
        if window[..n - 1] == *prefix {
            banned.insert(window[n - 1]);
        }
    }
    banned
}

pub struct T5Model {
    inner: t5::T5ForConditionalGeneration,
    varmap: VarMap,
    config: Value,
    model_type: String,
    base_checkpoint: String,
    pad_token_id: u32,
    eos_token_id: u32,
    decoder_start_token_id: u32,
    device: Device,
    tensor_device: candle_core::Device,
}

impl T5Model {
    /// Files a checkpoint must provide for the model to load.
    pub const REQUIRED_FILES: [&'static str; 2] = [CONFIG_FILE, WEIGHTS_FILE];

    fn build(
        varmap: VarMap,
        raw: Value,
        config: &t5::Config,
        base_checkpoint: &str,
        device: Device,
        tensor_device: candle_core::Device,
    ) -> MlResult<Self> {
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &tensor_device);
        let inner = t5::T5ForConditionalGeneration::load(vb, config)?;
        let model_type = raw
            .get("model_type")
            .and_then(Value::as_str)
            .unwrap_or("t5")
            .to_string();
        let mut raw = raw;
        raw["_name_or_path"] = json!(base_checkpoint);
        Ok(Self {
            inner,
            varmap,
            config: raw,
            model_type,
            base_checkpoint: base_checkpoint.to_string(),
            pad_token_id: token_id(config.pad_token_id, "pad_token_id")?,
            eos_token_id: token_id(config.eos_token_id, "eos_token_id")?,
            decoder_start_token_id: token_id(
                config.decoder_start_token_id.unwrap_or(config.pad_token_id),
                "decoder_start_token_id",
            )?,
            device,
            tensor_device,
        })
    }

    /// Loads `config.json` and `model.safetensors` from `dir`.
    ///
    /// `name` is recorded as the base checkpoint unless the config already
    /// names one in `_name_or_path`, which is the case for fine-tuned models
    /// saved by [`Seq2SeqModel::save_pretrained`].
    pub fn from_pretrained(dir: &Path, name: &str, device: Device) -> MlResult<Self> {
        let (raw, config) = read_config(dir)?;
        let tensor_device = device.to_candle()?;
        let tensors = candle_core::safetensors::load(dir.join(WEIGHTS_FILE), &tensor_device)?;

        let varmap = VarMap::new();
        let loaded: HashSet<String> = {
            let mut data = varmap
                .data()
                .lock()
                .map_err(|_| MlError::Checkpoint("variable map lock poisoned".to_string()))?;
            for (key, tensor) in tensors {
                data.insert(key, Var::from_tensor(&tensor.to_dtype(DType::F32)?)?);
            }
            data.keys().cloned().collect()
        };

        let base = raw
            .get("_name_or_path")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(name)
            .to_string();
        let model = Self::build(varmap, raw, &config, &base, device, tensor_device)?;

        let initialized: Vec<String> = model
            .varmap
            .data()
            .lock()
            .map_err(|_| MlError::Checkpoint("variable map lock poisoned".to_string()))?
            .keys()
            .filter(|k| !loaded.contains(*k))
            .cloned()
            .collect();
        if !initialized.is_empty() {
            warn!(
                count = initialized.len(),
                first = %initialized[0],
                "weights missing from checkpoint were newly initialized"
            );
        }
        info!(checkpoint = %model.base_checkpoint, path = %dir.display(), %device, "model loaded");
        Ok(model)
    }

    /// Randomly initialized model for `config` (a `config.json` document).
    pub fn from_config(config: Value, name: &str, device: Device) -> MlResult<Self> {
        let parsed: t5::Config = serde_json::from_value(config.clone())?;
        let tensor_device = device.to_candle()?;
        let model = Self::build(VarMap::new(), config, &parsed, name, device, tensor_device)?;

        // RMS norm scales start at one, not at the builder's zero default
        let data = model
            .varmap
            .data()
            .lock()
            .map_err(|_| MlError::Checkpoint("variable map lock poisoned".to_string()))?;
        for (key, var) in data.iter() {
            if key.ends_with("layer_norm.weight") {
                var.set(&var.as_tensor().ones_like()?)?;
            }
        }
        drop(data);
        Ok(model)
    }

    fn row_tensor(&self, ids: &[u32]) -> MlResult<Tensor> {
        Ok(Tensor::new(ids, &self.tensor_device)?.unsqueeze(0)?)
    }

    /// Summed cross-entropy of `labels` given `inputs`, decoding one
    /// teacher-forced step at a time through the decoder cache.
    fn row_loss(&mut self, inputs: &[u32], labels: &[u32]) -> MlResult<Tensor> {
        let source = self.row_tensor(inputs)?;
        self.inner.clear_kv_cache();
        let encoded = self.inner.encode(&source)?;

        let mut previous = self.decoder_start_token_id;
        let mut steps = Vec::with_capacity(labels.len());
        for &label in labels {
            let step = self.row_tensor(&[previous])?;
            steps.push(self.inner.decode(&step, &encoded)?);
            previous = label;
        }
        self.inner.clear_kv_cache();

        let logits = Tensor::cat(&steps, 0)?;
        let targets = Tensor::new(labels, &self.tensor_device)?;
        let mean = candle_nn::loss::cross_entropy(&logits, &targets)?;
        Ok(mean.affine(labels.len() as f64, 0.0)?)
    }

    /// Next-token log-probabilities for every live beam.
    fn beam_log_probs(&mut self, beams: &[Hypothesis], encoded: &Tensor) -> MlResult<Vec<Vec<f32>>> {
        let n = beams.len();
        let len = beams[0].tokens.len();
        let prefixes: Vec<u32> = beams.iter().flat_map(|b| b.tokens.iter().copied()).collect();
        let prefixes = Tensor::from_vec(prefixes, (n, len), &self.tensor_device)?;
        let memory = encoded.repeat((n, 1, 1))?;

        // full prefixes are re-decoded each step; reordered beams cannot reuse the cache
        self.inner.clear_kv_cache();
        let logits = self.inner.decode(&prefixes, &memory)?;
        self.inner.clear_kv_cache();
        Ok(candle_nn::ops::log_softmax(&logits, D::Minus1)?.to_vec2::<f32>()?)
    }
}

impl Seq2SeqModel for T5Model {
    fn model_type(&self) -> &str {
        &self.model_type
    }

    fn base_checkpoint(&self) -> &str {
        &self.base_checkpoint
    }

    fn device(&self) -> Device {
        self.device
    }

    fn loss(&mut self, batch: &Batch) -> MlResult<Tensor> {
        let mut rows = Vec::with_capacity(batch.len());
        let mut tokens = 0usize;
        for i in 0..batch.len() {
            let labels = batch.row_labels(i);
            if labels.is_empty() {
                continue;
            }
            tokens += labels.len();
            rows.push(self.row_loss(&batch.row_inputs(i), &labels)?);
        }
        if tokens == 0 {
            return Err(MlError::Format("batch has no label tokens".to_string()));
        }
        let total = Tensor::stack(&rows, 0)?.sum_all()?;
        Ok(total.affine(1.0 / tokens as f64, 0.0)?)
    }

    fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    fn generate(&mut self, input_ids: &[u32], params: &GenerationParams) -> MlResult<Vec<u32>> {
        if input_ids.is_empty() || params.max_length == 0 {
            return Ok(Vec::new());
        }
        let source = self.row_tensor(input_ids)?;
        self.inner.clear_kv_cache();
        let encoded = self.inner.encode(&source)?;

        let num_beams = params.num_beams.max(1);
        let mut beams = vec![Hypothesis {
            tokens: vec![self.decoder_start_token_id],
            score: 0.0,
        }];
        let mut finished: Vec<Hypothesis> = Vec::new();

        for _ in 0..params.max_length {
            let generated = beams[0].tokens.len() - 1;
            let log_probs = self.beam_log_probs(&beams, &encoded)?;

            let mut candidates: Vec<(usize, u32, f64)> = Vec::new();
            for (b, row) in log_probs.iter().enumerate() {
                let banned = banned_by_ngrams(&beams[b].tokens[1..], params.no_repeat_ngram_size);
                let mut scored: Vec<(u32, f32)> = row
                    .iter()
                    .enumerate()
                    .map(|(t, &lp)| (t as u32, lp))
                    .filter(|&(t, lp)| {
                        lp.is_finite()
                            && t != self.pad_token_id
                            && !(t == self.eos_token_id && generated < params.min_length)
                            && !banned.contains(&t)
                    })
                    .collect();
                scored.sort_by(|a, b| b.1.total_cmp(&a.1));
                scored.truncate(2 * num_beams);
                candidates.extend(scored.into_iter().map(|(t, lp)| (b, t, beams[b].score + f64::from(lp))));
            }
            candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

            let mut next = Vec::with_capacity(num_beams);
            for (rank, (b, token, score)) in candidates.into_iter().enumerate() {
                if token == self.eos_token_id {
                    if rank < num_beams {
                        finished.push(Hypothesis {
                            tokens: beams[b].tokens[1..].to_vec(),
                            score: normalized(score, generated + 1, params.length_penalty),
                        });
                    }
                    continue;
                }
                let mut tokens = beams[b].tokens.clone();
                tokens.push(token);
                next.push(Hypothesis { tokens, score });
                if next.len() == num_beams {
                    break;
                }
            }

            if next.is_empty() {
                break;
            }
            beams = next;

            if finished.len() >= num_beams {
                let worst = finished.iter().map(|h| h.score).fold(f64::INFINITY, f64::min);
                let best_live = normalized(beams[0].score, generated + 1, params.length_penalty);
                if best_live <= worst {
                    break;
                }
            }
        }

        if finished.is_empty() {
            finished = beams
                .into_iter()
                .map(|h| Hypothesis {
                    score: normalized(h.score, h.tokens.len() - 1, params.length_penalty),
                    tokens: h.tokens[1..].to_vec(),
                })
                .collect();
        }
        let best = finished
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|h| h.tokens)
            .unwrap_or_default();
        debug!(source_len = input_ids.len(), summary_len = best.len(), "generated");
        Ok(best)
    }

    fn save_pretrained(&self, dir: &Path) -> MlResult<()> {
        std::fs::create_dir_all(dir)?;
        self.varmap.save(dir.join(WEIGHTS_FILE))?;
        std::fs::write(dir.join(CONFIG_FILE), serde_json::to_vec_pretty(&self.config)?)?;

        let summary = GenerationParams::SUMMARY;
        let generation = json!({
            "decoder_start_token_id": self.decoder_start_token_id,
            "eos_token_id": self.eos_token_id,
            "pad_token_id": self.pad_token_id,
            "num_beams": summary.num_beams,
            "length_penalty": summary.length_penalty,
            "min_length": summary.min_length,
            "max_length": summary.max_length,
            "no_repeat_ngram_size": summary.no_repeat_ngram_size,
        });
        std::fs::write(
            dir.join(GENERATION_CONFIG_FILE),
            serde_json::to_vec_pretty(&generation)?,
        )?;
        Ok(())
    }
}

/// Loads T5 checkpoints and their `tokenizer.json` through a
/// [`CheckpointProvider`].
#[derive(Clone)]
pub struct T5Backend {
    provider: Arc<dyn CheckpointProvider>,
}

impl T5Backend {
    pub fn new(provider: Arc<dyn CheckpointProvider>) -> Self {
        Self { provider }
    }
}

impl SummarizerBackend for T5Backend {
    fn model_files(&self) -> &'static [&'static str] {
        &MODEL_FILES
    }

    fn load_tokenizer(&self, name_or_path: &str) -> MlResult<Box<dyn Tokenizer>> {
        let dir = self.provider.resolve(name_or_path, &HfTokenizer::REQUIRED_FILES)?;
        Ok(Box::new(HfTokenizer::from_pretrained(&dir)?))
    }

    fn load_model(&self, name_or_path: &str, device: Device) -> MlResult<Box<dyn Seq2SeqModel>> {
        let dir = self.provider.resolve(name_or_path, &T5Model::REQUIRED_FILES)?;
        Ok(Box::new(T5Model::from_pretrained(&dir, name_or_path, device)?))
    }
}
