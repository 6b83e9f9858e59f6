use thiserror::Error;

pub type MlResult<T> = std::result::Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("invalid format: {0}")]
    Format(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<tokenizers::Error> for MlError {
    fn from(e: tokenizers::Error) -> Self {
        Self::Tokenizer(e.to_string())
    }
}
