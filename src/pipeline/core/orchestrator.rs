//! Pipeline Orchestrator
//!
//! Runs stage groups in order. Stages inside a group have no data dependency on each
//! other and run concurrently; each runs to completion. The first failure halts the
//! run: no retries, no cleanup, artifacts stay in the store.

use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::pipeline::error::{PipelineError, StoreError};
use crate::pipeline::models::{
    ArtifactKey, PipelineArtifact, PipelineExecution, PipelineStatus,
};
use crate::pipeline::store::IntermediateStore;
use crate::pipeline::traits::PipelineStage;
use crate::utils::human_format;

/// Stages that may execute concurrently
pub struct StageGroup {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl StageGroup {
    pub fn new(stages: Vec<Box<dyn PipelineStage>>) -> Self {
        Self { stages }
    }

    pub fn single(stage: Box<dyn PipelineStage>) -> Self {
        Self::new(vec![stage])
    }

    pub fn stage_ids(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.stage_id()).collect()
    }

    fn status(&self) -> Option<PipelineStatus> {
        self.stages.first().map(|s| s.pipeline_status())
    }
}

struct StageOutcome {
    stage_id: &'static str,
    stage_name: &'static str,
    duration: Duration,
    result: Result<Vec<PipelineArtifact>, PipelineError>,
}

async fn run_stage_timed(
    stage: &dyn PipelineStage,
    store: &dyn IntermediateStore,
) -> StageOutcome {
    let start = Instant::now();
    let result = stage.execute(store).await;
    StageOutcome {
        stage_id: stage.stage_id(),
        stage_name: stage.stage_name(),
        duration: start.elapsed(),
        result,
    }
}

fn stage_metrics(
    duration: Duration,
    artifacts: &[PipelineArtifact],
) -> HashMap<String, serde_json::Value> {
    let mut metrics = HashMap::new();
    metrics.insert(
        "duration_ms".to_string(),
        serde_json::json!(duration.as_millis() as u64),
    );
    metrics.insert(
        "artifacts_created".to_string(),
        serde_json::json!(artifacts.len()),
    );
    let records: usize = artifacts.iter().filter_map(|a| a.record_count).sum();
    metrics.insert("records".to_string(), serde_json::json!(records));
    for artifact in artifacts {
        metrics.extend(artifact.metadata.clone());
    }
    metrics
}

pub struct PipelineOrchestrator {
    execution: PipelineExecution,
    store: Arc<dyn IntermediateStore>,
    groups: Vec<StageGroup>,
}

impl PipelineOrchestrator {
    pub fn new(run_id: impl Into<String>, store: Arc<dyn IntermediateStore>) -> Self {
        Self {
            execution: PipelineExecution::new(run_id),
            store,
            groups: Vec::new(),
        }
    }

    /// Add a group of stages; groups execute in the order they are added
    pub fn add_group(&mut self, group: StageGroup) {
        self.groups.push(group);
    }

    pub fn add_stage(&mut self, stage: Box<dyn PipelineStage>) {
        self.add_group(StageGroup::single(stage));
    }

    pub fn execution(&self) -> &PipelineExecution {
        &self.execution
    }

    pub fn store(&self) -> &Arc<dyn IntermediateStore> {
        &self.store
    }

    pub fn stage_ids(&self) -> Vec<&'static str> {
        self.groups.iter().flat_map(|g| g.stage_ids()).collect()
    }

    /// Flag artifacts already present before a full run starts.
    ///
    /// They may be left over from an aborted run; they are reported, not removed.
    pub async fn warn_on_stale_artifacts(&self) -> Result<(), PipelineError> {
        let stale = self.store.keys().await?;
        if !stale.is_empty() {
            let names: Vec<&str> = stale.iter().map(|k| k.as_str()).collect();
            warn!(
                "Stale artifacts present at run start: store={} keys=[{}] (left by an earlier run; stages overwrite the keys they own)",
                self.store.location(),
                names.join(", ")
            );
        }
        Ok(())
    }

    /// Check that every declared input is either already stored or produced by an
    /// earlier group. Stages of one group never see each other's output.
    pub async fn check_dependencies(&self) -> Result<(), PipelineError> {
        let mut available: BTreeSet<ArtifactKey> =
            self.store.keys().await?.into_iter().collect();
        for group in &self.groups {
            for stage in &group.stages {
                if let Some(&key) = stage.inputs().iter().find(|k| !available.contains(*k)) {
                    return Err(PipelineError::PipelineState {
                        stage: stage.stage_id().to_string(),
                        key,
                        source: StoreError::ArtifactNotFound { key },
                    });
                }
            }
            available.extend(group.stages.iter().filter_map(|s| s.output()));
        }
        Ok(())
    }

    /// Execute every group in order
    pub async fn execute_pipeline(&mut self) -> Result<PipelineExecution, PipelineError> {
        let pipeline_start = Instant::now();
        info!(
            "Starting pipeline execution: run_id={} store={} stages=[{}]",
            self.execution.run_id,
            self.store.location(),
            self.stage_ids().join(", ")
        );

        self.warn_on_stale_artifacts().await?;
        if let Err(e) = self.check_dependencies().await {
            error!("Pipeline plan rejected before any stage ran: {}", e);
            self.execution.fail(e.to_string());
            return Err(e);
        }
        for index in 0..self.groups.len() {
            self.execute_group(index).await?;
        }

        self.execution.transition_to(PipelineStatus::Completed)?;
        info!(
            "Pipeline execution completed: run_id={} stages={} artifacts={} duration={}",
            self.execution.run_id,
            self.execution.stages.len(),
            self.execution.artifacts.len(),
            human_format::format_duration(pipeline_start.elapsed())
        );
        Ok(self.execution.clone())
    }

    /// Execute one stage in isolation, the way an external trigger invokes stages
    pub async fn run_stage(&mut self, stage_id: &str) -> Result<PipelineExecution, PipelineError> {
        let Some(index) = self
            .groups
            .iter()
            .position(|g| g.stages.iter().any(|s| s.stage_id() == stage_id))
        else {
            return Err(PipelineError::UnknownStage(stage_id.to_string()));
        };

        let group = &mut self.groups[index];
        group.stages.retain(|s| s.stage_id() == stage_id);

        info!(
            "Running single stage: run_id={} stage={} store={}",
            self.execution.run_id,
            stage_id,
            self.store.location()
        );
        self.execute_group(index).await?;
        self.execution.transition_to(PipelineStatus::Completed)?;
        Ok(self.execution.clone())
    }

    async fn execute_group(&mut self, index: usize) -> Result<(), PipelineError> {
        let group = &self.groups[index];
        let Some(status) = group.status() else {
            return Ok(());
        };

        if let Err(e) = self.execution.transition_to(status) {
            self.execution.fail(e.to_string());
            return Err(e);
        }
        for stage in &group.stages {
            info!(
                "Executing stage: {} ({})",
                stage.stage_name(),
                stage.stage_id()
            );
            self.execution.add_stage(stage.stage_id());
            self.execution.start_stage(stage.stage_id());
        }

        let store = self.store.as_ref();
        let outcomes = join_all(
            group
                .stages
                .iter()
                .map(|stage| run_stage_timed(stage.as_ref(), store)),
        )
        .await;

        let mut first_error = None;
        for outcome in outcomes {
            match outcome.result {
                Ok(artifacts) => {
                    info!(
                        "Stage {} completed successfully in {}",
                        outcome.stage_name,
                        human_format::format_duration(outcome.duration)
                    );
                    let metrics = stage_metrics(outcome.duration, &artifacts);
                    self.execution
                        .complete_stage_with_artifacts(outcome.stage_id, artifacts, metrics);
                }
                Err(e) => {
                    error!("Stage {} failed: {}", outcome.stage_name, e);
                    self.execution.fail_stage(outcome.stage_id, e.to_string());
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            self.execution.fail(e.to_string());
            let retained = self.store.keys().await.unwrap_or_default();
            if !retained.is_empty() {
                let names: Vec<&str> = retained.iter().map(|k| k.as_str()).collect();
                warn!(
                    "Run {} failed; artifacts kept for inspection: store={} keys=[{}]",
                    self.execution.run_id,
                    self.store.location(),
                    names.join(", ")
                );
            }
            return Err(e);
        }
        Ok(())
    }
}
