//! Pipeline Runner: runs stages in order and stops at the first failure
use crate::context::ExecutionContext;
use crate::data_model::{PipelineReport, StageRecord};
use crate::error::TextsumError;
use crate::stage::Stage;
use chrono::Utc;
use std::time::Instant;
use tracing::{error, info, warn};

pub struct PipelineRunner {
    stages: Vec<Box<dyn Stage>>,
    pipeline_id: String,
}

impl PipelineRunner {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        let pipeline_id = stages
            .iter()
            .map(|s| s.id())
            .collect::<Vec<_>>()
            .join("→");

        Self { stages, pipeline_id }
    }

    /// Runs every stage in order.
    ///
    /// A stage error is returned through [`TextsumError::from_stage`]; a stage
    /// reporting failure ends the run with `aborted_at` set. In both cases no
    /// later stage is invoked.
    pub fn run_all(&self, ctx: &ExecutionContext) -> Result<PipelineReport, TextsumError> {
        let mut report = PipelineReport {
            run_id: ctx.run_id.clone(),
            pipeline_id: self.pipeline_id.clone(),
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::with_capacity(self.stages.len()),
            aborted_at: None,
        };

        for stage in &self.stages {
            info!(run_id = %ctx.run_id, ">>>>>> Stage {} started <<<<<<", stage.name());
            let start = Instant::now();

            let result = stage.run(ctx).map_err(|e| {
                error!(run_id = %ctx.run_id, stage = stage.id(), error = %e, "stage raised an error, aborting pipeline");
                TextsumError::from_stage(stage.id(), e)
            })?;

            let latency_ms = start.elapsed().as_millis() as u64;
            let ok = result.is_ok();
            report.stages.push(StageRecord {
                id: stage.id().to_string(),
                name: stage.name().to_string(),
                result,
                latency_ms,
            });

            if !ok {
                warn!(run_id = %ctx.run_id, stage = stage.id(), "stage reported failure, remaining stages skipped");
                report.aborted_at = Some(stage.id().to_string());
                break;
            }
            info!(run_id = %ctx.run_id, latency_ms, ">>>>>> Stage {} completed <<<<<<\n\nx==========x", stage.name());
        }

        report.finished_at = Some(Utc::now());
        Ok(report)
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
