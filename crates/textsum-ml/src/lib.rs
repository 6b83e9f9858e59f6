//! Model-side building blocks for textsum: tokenizer and model contracts,
//! dataset encoding, the fine-tuning loop, ROUGE scoring and checkpoint
//! resolution, plus the candle T5 backend.

pub mod checkpoint;
pub mod collator;
pub mod dataset;
pub mod device;
pub mod error;
pub mod model;
pub mod rouge;
pub mod t5;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod text;
pub mod tokenizer;
pub mod trainer;

pub use checkpoint::{CheckpointProvider, HubCheckpointProvider};
pub use collator::{Batch, Seq2SeqCollator, LABEL_PAD_ID};
pub use dataset::{DatasetDict, DialogueRecord, EncodedExample, SPLITS};
pub use device::Device;
pub use error::{MlError, MlResult};
pub use model::{GenerationParams, Seq2SeqModel, SummarizerBackend};
pub use rouge::{rouge_scores, RougeScores};
pub use t5::{T5Backend, T5Model};
pub use tokenizer::{Encoding, HfTokenizer, Tokenizer};
pub use trainer::{EvaluationStrategy, Seq2SeqTrainer, TrainOutput, TrainingArguments};
