//! Label-aware batch collator for sequence-to-sequence training.

use crate::dataset::EncodedExample;

/// Label id ignored by the loss.
pub const LABEL_PAD_ID: i64 = -100;

/// Fixed-shape batch: every row padded to the longest row of its field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    pub input_ids: Vec<Vec<u32>>,
    pub attention_mask: Vec<Vec<u8>>,
    pub labels: Vec<Vec<i64>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Unpadded input ids of row `i`.
    pub fn row_inputs(&self, i: usize) -> Vec<u32> {
        self.input_ids[i]
            .iter()
            .zip(&self.attention_mask[i])
            .filter(|(_, &m)| m == 1)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Label ids of row `i` with padding removed.
    pub fn row_labels(&self, i: usize) -> Vec<u32> {
        self.labels[i]
            .iter()
            .filter(|&&l| l != LABEL_PAD_ID)
            .map(|&l| l as u32)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Seq2SeqCollator {
    pub pad_token_id: u32,
    pub label_pad_token_id: i64,
}

impl Seq2SeqCollator {
    pub fn new(pad_token_id: u32) -> Self {
        Self {
            pad_token_id,
            label_pad_token_id: LABEL_PAD_ID,
        }
    }

    pub fn collate(&self, examples: &[EncodedExample]) -> Batch {
        let input_len = examples.iter().map(|e| e.input_ids.len()).max().unwrap_or(0);
        let label_len = examples.iter().map(|e| e.labels.len()).max().unwrap_or(0);

        let mut batch = Batch::default();
        for example in examples {
            let mut ids = example.input_ids.clone();
            ids.resize(input_len, self.pad_token_id);

            let mut mask = example.attention_mask.clone();
            mask.resize(input_len, 0);

            let mut labels: Vec<i64> = example.labels.iter().map(|&l| i64::from(l)).collect();
            labels.resize(label_len, self.label_pad_token_id);

            batch.input_ids.push(ids);
            batch.attention_mask.push(mask);
            batch.labels.push(labels);
        }
        batch
    }
}
