//! Execution Context: state shared by every stage of one run
use crate::artifacts::ArtifactStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct ExecutionContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub artifacts: Arc<dyn ArtifactStore>,
}

impl ExecutionContext {
    pub fn new(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            artifacts,
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}
