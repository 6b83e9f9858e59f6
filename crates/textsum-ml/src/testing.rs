//! A tiny word-level tokenizer and randomly initialized T5 checkpoint for
//! tests that need a loadable model without network access.

use crate::device::Device;
use crate::error::MlResult;
use crate::model::Seq2SeqModel;
use crate::t5::T5Model;
use crate::tokenizer::{HfTokenizer, Tokenizer};
use serde_json::{json, Map, Value};
use std::path::Path;

/// Name recorded as the base checkpoint of the tiny model.
pub const TINY_CHECKPOINT: &str = "textsum/tiny-t5";

const WORDS: &[&str] = &[
    "amanda", "jerry", "tom", "anna", "amy", "i", "you", "we", "baked", "cookies", "do", "want", "some", "sure",
    "hi", "are", "still", "on", "for", "lunch", "meet", "at", "noon", "yes", "see", "there", "and", "the",
    "a", "is", "to", "will", "bring", "tomorrow", "greeting", ".", ",", "?", "!", ":",
];

/// Words of the tiny vocabulary after `<pad>` (0), `</s>` (1) and `<unk>` (2).
pub fn tiny_vocab() -> Vec<&'static str> {
    ["<pad>", "</s>", "<unk>"].iter().chain(WORDS).copied().collect()
}

fn added_token(id: usize, content: &str) -> Value {
    json!({
        "id": id,
        "content": content,
        "single_word": false,
        "lstrip": false,
        "rstrip": false,
        "normalized": false,
        "special": true,
    })
}

/// Writes a lowercasing, whitespace-split `tokenizer.json` into `dir`.
pub fn write_tiny_tokenizer(dir: &Path) -> MlResult<()> {
    let vocab: Map<String, Value> = tiny_vocab()
        .into_iter()
        .enumerate()
        .map(|(id, word)| (word.to_string(), json!(id)))
        .collect();
    let tokenizer = json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [added_token(0, "<pad>"), added_token(1, "</s>")],
        "normalizer": {"type": "Lowercase"},
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {"type": "WordLevel", "vocab": vocab, "unk_token": "<unk>"},
    });
    std::fs::create_dir_all(dir)?;
    std::fs::write(
        dir.join(HfTokenizer::TOKENIZER_FILE),
        serde_json::to_vec_pretty(&tokenizer)?,
    )?;
    Ok(())
}

/// `config.json` of a one-layer T5 with 16-wide hidden states.
pub fn tiny_config(vocab_size: usize) -> Value {
    json!({
        "model_type": "t5",
        "architectures": ["T5ForConditionalGeneration"],
        "vocab_size": vocab_size,
        "d_model": 16,
        "d_kv": 8,
        "d_ff": 32,
        "num_layers": 1,
        "num_heads": 2,
        "relative_attention_num_buckets": 8,
        "relative_attention_max_distance": 16,
        "dropout_rate": 0.0,
        "layer_norm_epsilon": 1e-6,
        "initializer_factor": 1.0,
        "feed_forward_proj": "relu",
        "tie_word_embeddings": true,
        "is_encoder_decoder": true,
        "pad_token_id": 0,
        "eos_token_id": 1,
        "decoder_start_token_id": 0,
    })
}

/// Writes a complete saved model (weights, configs, tokenizer files) into `dir`.
pub fn write_tiny_checkpoint(dir: &Path) -> MlResult<()> {
    write_tiny_tokenizer(dir)?;
    let tokenizer = HfTokenizer::from_pretrained(dir)?;
    tokenizer.save_pretrained(dir)?;
    let model = T5Model::from_config(tiny_config(tokenizer.vocab_size()), TINY_CHECKPOINT, Device::Cpu)?;
    model.save_pretrained(dir)
}
