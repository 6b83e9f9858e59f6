//! textsum Core: Stage Trait, Runner, Artifact Store and Data Model
//!
//! Generic stage-based core: every pipeline step implements one contract and
//! hands its output to the next through a stage-keyed artifact store.

pub mod artifacts;
pub mod context;
pub mod data_model;
pub mod error;
pub mod runner;
pub mod stage;

pub use artifacts::{ArtifactStore, FsArtifactStore};
pub use context::ExecutionContext;
pub use data_model::{
    ArtifactRef, PipelineReport, StageRecord, StageResult, StageStatus, TrainedModelHandle,
};
pub use error::{TextsumError, TextsumResult};
pub use runner::PipelineRunner;
pub use stage::{Stage, StageError};

/// Version of the textsum pipeline
pub const TEXTSUM_VERSION: &str = "1.0.0";
