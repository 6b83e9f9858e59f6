//! Tokenizer contract and its `tokenizers`-backed implementation.

use crate::error::{MlError, MlResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

/// Token ids and attention mask of one encoded text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Encoding {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u8>,
}

impl Encoding {
    fn from_ids(input_ids: Vec<u32>) -> Self {
        let attention_mask = vec![1; input_ids.len()];
        Self {
            input_ids,
            attention_mask,
        }
    }
}

pub trait Tokenizer: Send + Sync {
    /// Encodes `text`, truncating so the result (end-of-sequence included)
    /// holds at most `max_length` ids.
    fn encode(&self, text: &str, max_length: usize) -> MlResult<Encoding>;

    fn encode_batch(&self, texts: &[&str], max_length: usize) -> MlResult<Vec<Encoding>> {
        texts.iter().map(|t| self.encode(t, max_length)).collect()
    }

    /// Decodes ids back to text, skipping special tokens.
    fn decode(&self, ids: &[u32]) -> MlResult<String>;

    fn pad_token_id(&self) -> u32;

    fn eos_token_id(&self) -> u32;

    /// Writes the tokenizer files into `dir`.
    fn save_pretrained(&self, dir: &Path) -> MlResult<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpecialTokens {
    #[serde(default = "default_pad_token")]
    pad_token: String,
    #[serde(default = "default_eos_token")]
    eos_token: String,
}

fn default_pad_token() -> String {
    "<pad>".to_string()
}

fn default_eos_token() -> String {
    "</s>".to_string()
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            pad_token: default_pad_token(),
            eos_token: default_eos_token(),
        }
    }
}

/// A `tokenizer.json` loaded through the `tokenizers` crate.
///
/// Special tokens come from `special_tokens_map.json` when the directory has
/// one, else `<pad>` and `</s>`.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    special: SpecialTokens,
    pad_id: u32,
    eos_id: u32,
}

impl HfTokenizer {
    pub const TOKENIZER_FILE: &'static str = "tokenizer.json";
    pub const CONFIG_FILE: &'static str = "tokenizer_config.json";
    pub const SPECIAL_TOKENS_FILE: &'static str = "special_tokens_map.json";

    /// Files a checkpoint must provide for the tokenizer to load.
    pub const REQUIRED_FILES: [&'static str; 1] = [Self::TOKENIZER_FILE];

    /// Files written by [`Tokenizer::save_pretrained`].
    pub const FILES: [&'static str; 3] = [Self::TOKENIZER_FILE, Self::CONFIG_FILE, Self::SPECIAL_TOKENS_FILE];

    pub fn from_pretrained(dir: &Path) -> MlResult<Self> {
        let mut inner = tokenizers::Tokenizer::from_file(dir.join(Self::TOKENIZER_FILE))?;
        // truncation is applied per call, padding by the collator
        inner.with_truncation(None)?;
        inner.with_padding(None);

        let special_path = dir.join(Self::SPECIAL_TOKENS_FILE);
        let special = if special_path.exists() {
            read_special_tokens(&special_path)?
        } else {
            SpecialTokens::default()
        };
        Self::new(inner, special)
    }

    fn new(inner: tokenizers::Tokenizer, special: SpecialTokens) -> MlResult<Self> {
        let lookup = |token: &str| {
            inner
                .token_to_id(token)
                .ok_or_else(|| MlError::Format(format!("tokenizer has no '{token}' token")))
        };
        let pad_id = lookup(&special.pad_token)?;
        let eos_id = lookup(&special.eos_token)?;
        Ok(Self {
            inner,
            special,
            pad_id,
            eos_id,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    fn truncate(&self, mut ids: Vec<u32>, max_length: usize) -> Encoding {
        if max_length == 0 {
            return Encoding::default();
        }
        ids.retain(|&id| id != self.eos_id);
        ids.truncate(max_length - 1);
        ids.push(self.eos_id);
        Encoding::from_ids(ids)
    }
}

/// `special_tokens_map.json` values are either plain strings or
/// `{"content": ...}` objects.
fn read_special_tokens(path: &Path) -> MlResult<SpecialTokens> {
    let value: serde_json::Value = serde_json::from_slice(&std::fs::read(path)?)?;
    let token = |key: &str| {
        value.get(key).and_then(|v| {
            v.as_str()
                .or_else(|| v.get("content").and_then(|c| c.as_str()))
                .map(str::to_string)
        })
    };
    Ok(SpecialTokens {
        pad_token: token("pad_token").unwrap_or_else(default_pad_token),
        eos_token: token("eos_token").unwrap_or_else(default_eos_token),
    })
}

impl Tokenizer for HfTokenizer {
    fn encode(&self, text: &str, max_length: usize) -> MlResult<Encoding> {
        let encoding = self.inner.encode(text, false)?;
        Ok(self.truncate(encoding.get_ids().to_vec(), max_length))
    }

    fn encode_batch(&self, texts: &[&str], max_length: usize) -> MlResult<Vec<Encoding>> {
        let encodings = self.inner.encode_batch(texts.to_vec(), false)?;
        Ok(encodings
            .into_iter()
            .map(|e| self.truncate(e.get_ids().to_vec(), max_length))
            .collect())
    }

    fn decode(&self, ids: &[u32]) -> MlResult<String> {
        Ok(self.inner.decode(ids, true)?)
    }

    fn pad_token_id(&self) -> u32 {
        self.pad_id
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_id
    }

    fn save_pretrained(&self, dir: &Path) -> MlResult<()> {
        std::fs::create_dir_all(dir)?;
        self.inner.save(dir.join(Self::TOKENIZER_FILE), true)?;
        let config = json!({
            "model_max_length": 1024,
            "pad_token": self.special.pad_token,
            "eos_token": self.special.eos_token,
        });
        std::fs::write(dir.join(Self::CONFIG_FILE), serde_json::to_vec_pretty(&config)?)?;
        std::fs::write(
            dir.join(Self::SPECIAL_TOKENS_FILE),
            serde_json::to_vec_pretty(&self.special)?,
        )?;
        Ok(())
    }
}
