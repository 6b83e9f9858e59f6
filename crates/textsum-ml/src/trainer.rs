//! Fine-tuning loop: batching, accumulation, learning-rate schedule,
//! periodic logging, evaluation and checkpointing. Parameter updates use
//! candle's AdamW.

use crate::collator::Seq2SeqCollator;
use crate::dataset::EncodedExample;
use crate::error::MlResult;
use crate::model::Seq2SeqModel;
use crate::tokenizer::Tokenizer;
use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStrategy {
    No,
    Steps,
    Epoch,
}

/// Training hyperparameters, read from the `TrainingArguments` mapping of
/// `params.yaml`. Keys this trainer does not know are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingArguments {
    pub num_train_epochs: u32,
    pub learning_rate: f64,
    pub warmup_steps: u64,
    pub per_device_train_batch_size: usize,
    pub per_device_eval_batch_size: usize,
    pub weight_decay: f64,
    pub logging_steps: u64,
    #[serde(alias = "eval_strategy")]
    pub evaluation_strategy: EvaluationStrategy,
    pub eval_steps: u64,
    pub save_steps: u64,
    pub gradient_accumulation_steps: usize,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for TrainingArguments {
    fn default() -> Self {
        Self {
            num_train_epochs: 3,
            learning_rate: 5e-5,
            warmup_steps: 0,
            per_device_train_batch_size: 8,
            per_device_eval_batch_size: 8,
            weight_decay: 0.0,
            logging_steps: 500,
            evaluation_strategy: EvaluationStrategy::No,
            eval_steps: 500,
            save_steps: 500,
            gradient_accumulation_steps: 1,
            extra: BTreeMap::new(),
        }
    }
}

impl TrainingArguments {
    /// Linear warmup to `learning_rate`, then linear decay to zero at `total_steps`.
    pub fn learning_rate_at(&self, step: u64, total_steps: u64) -> f64 {
        if step < self.warmup_steps {
            return self.learning_rate * step as f64 / self.warmup_steps.max(1) as f64;
        }
        let remaining = total_steps.saturating_sub(step) as f64;
        let decay_span = total_steps.saturating_sub(self.warmup_steps).max(1) as f64;
        self.learning_rate * (remaining / decay_span).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub step: u64,
    pub epoch: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOutput {
    pub global_step: u64,
    pub training_loss: f64,
    pub eval_loss: Option<f64>,
    pub log_history: Vec<LogEntry>,
}

pub struct Seq2SeqTrainer<'a> {
    model: &'a mut dyn Seq2SeqModel,
    tokenizer: &'a dyn Tokenizer,
    args: TrainingArguments,
    output_dir: PathBuf,
    collator: Seq2SeqCollator,
    train_dataset: &'a [EncodedExample],
    eval_dataset: Option<&'a [EncodedExample]>,
}

impl<'a> Seq2SeqTrainer<'a> {
    pub fn new(
        model: &'a mut dyn Seq2SeqModel,
        tokenizer: &'a dyn Tokenizer,
        args: TrainingArguments,
        output_dir: impl Into<PathBuf>,
        collator: Seq2SeqCollator,
        train_dataset: &'a [EncodedExample],
        eval_dataset: Option<&'a [EncodedExample]>,
    ) -> Self {
        Self {
            model,
            tokenizer,
            args,
            output_dir: output_dir.into(),
            collator,
            train_dataset,
            eval_dataset,
        }
    }

    fn steps_per_epoch(&self) -> u64 {
        let batch = self.args.per_device_train_batch_size.max(1);
        let accumulation = self.args.gradient_accumulation_steps.max(1);
        let micro_batches = self.train_dataset.len().div_ceil(batch);
        micro_batches.div_ceil(accumulation) as u64
    }

    /// Mean loss over the evaluation split, if one was given.
    pub fn evaluate(&mut self) -> MlResult<Option<f64>> {
        let Some(eval) = self.eval_dataset.filter(|e| !e.is_empty()) else {
            return Ok(None);
        };
        let mut total = 0.0;
        let mut batches = 0usize;
        for chunk in eval.chunks(self.args.per_device_eval_batch_size.max(1)) {
            let batch = self.collator.collate(chunk);
            total += f64::from(self.model.loss(&batch)?.to_scalar::<f32>()?);
            batches += 1;
        }
        Ok(Some(total / batches as f64))
    }

    fn save_checkpoint(&self, step: u64) -> MlResult<()> {
        let dir = self.output_dir.join(format!("checkpoint-{step}"));
        self.model.save_pretrained(&dir)?;
        self.tokenizer.save_pretrained(&dir)?;
        info!(path = %dir.display(), "saved checkpoint");
        Ok(())
    }

    pub fn train(&mut self) -> MlResult<TrainOutput> {
        if !self.args.extra.is_empty() {
            let ignored: Vec<&String> = self.args.extra.keys().collect();
            warn!(?ignored, "training arguments not used by this trainer");
        }

        let steps_per_epoch = self.steps_per_epoch();
        let total_steps = steps_per_epoch * u64::from(self.args.num_train_epochs);
        let accumulation = self.args.gradient_accumulation_steps.max(1);
        let batch_size = self.args.per_device_train_batch_size.max(1);
        info!(
            examples = self.train_dataset.len(),
            epochs = self.args.num_train_epochs,
            batch_size,
            accumulation,
            total_steps,
            "***** Running training *****"
        );

        let mut optimizer = AdamW::new(
            self.model.trainable_vars(),
            ParamsAdamW {
                lr: self.args.learning_rate,
                weight_decay: self.args.weight_decay,
                ..Default::default()
            },
        )?;
        let mut history = Vec::new();
        let mut accumulated: Vec<Tensor> = Vec::with_capacity(accumulation);
        let mut global_step = 0u64;
        let mut loss_sum = 0.0;
        let mut loss_count = 0usize;
        let mut window_loss = 0.0;
        let mut window_count = 0usize;
        let mut last_eval = None;
        let train = self.train_dataset;

        for epoch in 0..self.args.num_train_epochs {
            let chunks: Vec<&[EncodedExample]> = train.chunks(batch_size).collect();
            let micro_total = chunks.len();

            for (micro, chunk) in chunks.into_iter().enumerate() {
                let batch = self.collator.collate(chunk);
                let loss_tensor = self.model.loss(&batch)?;
                let loss = f64::from(loss_tensor.to_scalar::<f32>()?);
                accumulated.push(loss_tensor.affine(1.0 / accumulation as f64, 0.0)?);
                loss_sum += loss;
                loss_count += 1;
                window_loss += loss;
                window_count += 1;

                let boundary = (micro + 1) % accumulation == 0 || micro + 1 == micro_total;
                if !boundary {
                    continue;
                }

                let lr = self.args.learning_rate_at(global_step, total_steps);
                optimizer.set_learning_rate(lr);
                let objective = Tensor::stack(&accumulated, 0)?.sum_all()?;
                optimizer.backward_step(&objective)?;
                accumulated.clear();
                global_step += 1;
                let epoch_progress = f64::from(epoch) + (micro + 1) as f64 / micro_total.max(1) as f64;
                debug!(step = global_step, lr, loss, "optimizer step");

                if self.args.logging_steps > 0 && global_step % self.args.logging_steps == 0 {
                    let mean = window_loss / window_count.max(1) as f64;
                    info!(step = global_step, epoch = epoch_progress, loss = mean, learning_rate = lr, "training");
                    history.push(LogEntry {
                        step: global_step,
                        epoch: epoch_progress,
                        loss: Some(mean),
                        eval_loss: None,
                        learning_rate: Some(lr),
                    });
                    window_loss = 0.0;
                    window_count = 0;
                }

                if self.args.evaluation_strategy == EvaluationStrategy::Steps
                    && self.args.eval_steps > 0
                    && global_step % self.args.eval_steps == 0
                {
                    last_eval = self.record_eval(global_step, epoch_progress, &mut history)?;
                }

                if self.args.save_steps > 0 && global_step % self.args.save_steps == 0 {
                    self.save_checkpoint(global_step)?;
                }
            }

            if self.args.evaluation_strategy == EvaluationStrategy::Epoch {
                last_eval = self.record_eval(global_step, f64::from(epoch + 1), &mut history)?;
            }
        }

        let output = TrainOutput {
            global_step,
            training_loss: if loss_count == 0 { 0.0 } else { loss_sum / loss_count as f64 },
            eval_loss: last_eval,
            log_history: history,
        };

        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::write(
            self.output_dir.join("trainer_state.json"),
            serde_json::to_vec_pretty(&output)?,
        )?;
        info!(global_step, training_loss = output.training_loss, "training finished");
        Ok(output)
    }

    fn record_eval(&mut self, step: u64, epoch: f64, history: &mut Vec<LogEntry>) -> MlResult<Option<f64>> {
        let eval_loss = self.evaluate()?;
        if let Some(loss) = eval_loss {
            info!(step, eval_loss = loss, "evaluation");
            history.push(LogEntry {
                step,
                epoch,
                loss: None,
                eval_loss: Some(loss),
                learning_rate: None,
            });
        }
        Ok(eval_loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::t5::T5Model;
    use crate::testing::{write_tiny_checkpoint, TINY_CHECKPOINT};
    use crate::tokenizer::HfTokenizer;
    use tempfile::TempDir;

    fn examples(tok: &HfTokenizer, n: usize) -> Vec<EncodedExample> {
        (0..n)
            .map(|i| {
                let dialogue = format!("Tom: lunch at noon {i}?\nAnna: yes, see you there.");
                let summary = "Tom and Anna meet for lunch at noon.".to_string();
                let enc = tok.encode(&dialogue, 1024).unwrap();
                EncodedExample {
                    id: i.to_string(),
                    labels: tok.encode(&summary, 128).unwrap().input_ids,
                    dialogue,
                    summary,
                    input_ids: enc.input_ids,
                    attention_mask: enc.attention_mask,
                }
            })
            .collect()
    }

    #[test]
    fn test_schedule() {
        let args = TrainingArguments {
            learning_rate: 1.0,
            warmup_steps: 10,
            ..Default::default()
        };
        assert_eq!(args.learning_rate_at(0, 110), 0.0);
        assert_eq!(args.learning_rate_at(5, 110), 0.5);
        assert_eq!(args.learning_rate_at(10, 110), 1.0);
        assert_eq!(args.learning_rate_at(60, 110), 0.5);
        assert_eq!(args.learning_rate_at(110, 110), 0.0);
    }

    #[test]
    fn test_unknown_keys_are_kept() {
        let args: TrainingArguments = serde_json::from_value(serde_json::json!({
            "num_train_epochs": 1,
            "evaluation_strategy": "steps",
            "fp16": true,
        }))
        .unwrap();
        assert_eq!(args.num_train_epochs, 1);
        assert_eq!(args.evaluation_strategy, EvaluationStrategy::Steps);
        assert_eq!(args.extra.get("fp16"), Some(&serde_json::Value::Bool(true)));
        assert_eq!(args.per_device_train_batch_size, 8);
    }

    #[test]
    fn test_train_steps_accumulation_and_checkpoints() {
        let ckpt = TempDir::new().unwrap();
        write_tiny_checkpoint(ckpt.path()).unwrap();
        let tok = HfTokenizer::from_pretrained(ckpt.path()).unwrap();
        let mut model = T5Model::from_pretrained(ckpt.path(), TINY_CHECKPOINT, Device::Cpu).unwrap();

        let temp = TempDir::new().unwrap();
        let train = examples(&tok, 10);
        let eval = examples(&tok, 2);
        let args = TrainingArguments {
            num_train_epochs: 2,
            learning_rate: 1e-2,
            per_device_train_batch_size: 2,
            gradient_accumulation_steps: 2,
            logging_steps: 1,
            evaluation_strategy: EvaluationStrategy::Epoch,
            save_steps: 3,
            ..Default::default()
        };

        let output = Seq2SeqTrainer::new(
            &mut model,
            &tok,
            args,
            temp.path(),
            Seq2SeqCollator::new(tok.pad_token_id()),
            &train,
            Some(&eval),
        )
        .train()
        .unwrap();

        // 5 micro-batches per epoch, accumulated in pairs: 3 optimizer steps per epoch
        assert_eq!(output.global_step, 6);
        assert!(output.eval_loss.is_some());
        assert!(temp.path().join("checkpoint-3").join("model.safetensors").exists());
        assert!(temp.path().join("checkpoint-6").join("tokenizer.json").exists());
        assert!(temp.path().join("trainer_state.json").exists());
        assert_eq!(output.log_history.iter().filter(|e| e.eval_loss.is_some()).count(), 2);

        let losses: Vec<f64> = output.log_history.iter().filter_map(|e| e.loss).collect();
        assert_eq!(losses.len(), 6);
        assert!(losses[5] < losses[0], "{losses:?}");
    }
}
