//! Unified Error Model
use crate::stage::StageError;
use thiserror::Error;

pub type TextsumResult<T> = std::result::Result<T, TextsumError>;

#[derive(Error, Debug)]
pub enum TextsumError {
    /// Empty, unreadable or malformed configuration document.
    #[error("CONFIG/{0}")]
    ConfigParse(String),

    /// A validation gate refused the data; downstream stages must not run.
    #[error("VALIDATION/{0}")]
    ValidationFailure(String),

    #[error("STAGE/{stage}: {source}")]
    StageExecution {
        stage: String,
        #[source]
        source: StageError,
    },

    /// Caller supplied unusable input (empty prediction text).
    #[error("INPUT/{0}")]
    InvalidInput(String),

    #[error("MODEL/{0}")]
    Model(String),

    #[error("IO/{0}")]
    Io(#[from] std::io::Error),

    #[error("SERIALIZE/{0}")]
    Serialize(#[from] serde_json::Error),
}

impl TextsumError {
    /// Wraps an error raised by `stage`. A refused validation gate stays a
    /// [`ValidationFailure`](Self::ValidationFailure).
    pub fn from_stage(stage: &str, source: StageError) -> Self {
        match source {
            StageError::ValidationFailed(msg) => Self::ValidationFailure(format!("{stage}: {msg}")),
            source => Self::StageExecution {
                stage: stage.to_string(),
                source,
            },
        }
    }

    /// Whether the failure was caused by the caller rather than by the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}
