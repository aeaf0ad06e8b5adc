use super::artifacts::PipelineArtifact;
use crate::pipeline::error::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub id: Uuid,
    /// Identifier that scopes this run's artifacts in the store
    pub run_id: String,
    pub status: PipelineStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stages: HashMap<String, PipelineStageExecution>,
    pub artifacts: Vec<PipelineArtifact>,
    pub error_message: Option<String>,
}

/// Run-level state machine.
///
/// Running states only move forward; `Completed` and `Failed` are terminal. A new
/// invocation always starts again from `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PipelineStatus {
    Pending,
    /// Filter and preprocess stages, which may run in parallel
    FilteringPreprocessing,
    Joining,
    Aggregating,
    Sorting,
    Storing,
    Completed,
    Failed,
}

impl PipelineStatus {
    fn rank(self) -> u8 {
        match self {
            PipelineStatus::Pending => 0,
            PipelineStatus::FilteringPreprocessing => 1,
            PipelineStatus::Joining => 2,
            PipelineStatus::Aggregating => 3,
            PipelineStatus::Sorting => 4,
            PipelineStatus::Storing => 5,
            PipelineStatus::Completed | PipelineStatus::Failed => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStatus::Completed | PipelineStatus::Failed)
    }

    pub fn is_running(self) -> bool {
        !self.is_terminal() && self != PipelineStatus::Pending
    }

    pub fn can_transition_to(self, next: PipelineStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            PipelineStatus::Pending => false,
            PipelineStatus::Failed => true,
            PipelineStatus::Completed => self.is_running(),
            running => running.rank() > self.rank(),
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStageExecution {
    pub name: String,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_artifacts: Vec<String>, // Artifact IDs
    pub metrics: HashMap<String, serde_json::Value>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl PipelineExecution {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: run_id.into(),
            status: PipelineStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            stages: HashMap::new(),
            artifacts: Vec::new(),
            error_message: None,
        }
    }

    /// Move the run to `next`, rejecting transitions the state machine does not allow
    pub fn transition_to(&mut self, next: PipelineStatus) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn add_stage(&mut self, stage_name: &str) {
        let stage = PipelineStageExecution {
            name: stage_name.to_string(),
            status: StageStatus::Pending,
            started_at: None,
            completed_at: None,
            output_artifacts: Vec::new(),
            metrics: HashMap::new(),
            error_message: None,
        };
        self.stages.insert(stage_name.to_string(), stage);
    }

    pub fn start_stage(&mut self, stage_name: &str) {
        if let Some(stage) = self.stages.get_mut(stage_name) {
            stage.status = StageStatus::Running;
            stage.started_at = Some(Utc::now());
        }
    }

    /// Complete a stage, registering the artifacts it produced
    pub fn complete_stage_with_artifacts(
        &mut self,
        stage_name: &str,
        artifacts: Vec<PipelineArtifact>,
        metrics: HashMap<String, serde_json::Value>,
    ) {
        let artifact_ids = artifacts.iter().map(|a| a.id.clone()).collect();
        self.artifacts.extend(artifacts);

        if let Some(stage) = self.stages.get_mut(stage_name) {
            stage.status = StageStatus::Completed;
            stage.completed_at = Some(Utc::now());
            stage.output_artifacts = artifact_ids;
            stage.metrics = metrics;
        }
    }

    pub fn fail_stage(&mut self, stage_name: &str, error_message: String) {
        if let Some(stage) = self.stages.get_mut(stage_name) {
            stage.status = StageStatus::Failed;
            stage.completed_at = Some(Utc::now());
            stage.error_message = Some(error_message);
        }
    }

    /// Mark the run failed. Always allowed from a non-terminal state.
    pub fn fail(&mut self, error_message: String) {
        if !self.status.is_terminal() {
            self.status = PipelineStatus::Failed;
            self.completed_at = Some(Utc::now());
        }
        self.error_message = Some(error_message);
    }

    pub fn stage(&self, stage_name: &str) -> Option<&PipelineStageExecution> {
        self.stages.get(stage_name)
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_run_transitions() {
        let mut execution = PipelineExecution::new("run-1");
        for status in [
            PipelineStatus::FilteringPreprocessing,
            PipelineStatus::Joining,
            PipelineStatus::Aggregating,
            PipelineStatus::Sorting,
            PipelineStatus::Storing,
            PipelineStatus::Completed,
        ] {
            execution.transition_to(status).unwrap();
        }
        assert!(execution.completed_at.is_some());
    }

    #[test]
    fn test_running_states_only_move_forward() {
        let mut execution = PipelineExecution::new("run-1");
        execution.transition_to(PipelineStatus::Sorting).unwrap();
        assert!(execution.transition_to(PipelineStatus::Joining).is_err());
        assert!(execution.transition_to(PipelineStatus::Pending).is_err());
        assert_eq!(execution.status, PipelineStatus::Sorting);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut execution = PipelineExecution::new("run-1");
        assert!(execution.transition_to(PipelineStatus::Completed).is_err());

        execution.transition_to(PipelineStatus::Joining).unwrap();
        execution.fail("boom".to_string());
        assert_eq!(execution.status, PipelineStatus::Failed);
        assert!(execution.transition_to(PipelineStatus::Aggregating).is_err());
        assert!(execution.transition_to(PipelineStatus::Completed).is_err());
        assert_eq!(execution.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_stage_bookkeeping() {
        let mut execution = PipelineExecution::new("run-1");
        execution.add_stage("filter");
        execution.start_stage("filter");
        assert_eq!(execution.stage("filter").unwrap().status, StageStatus::Running);

        let artifact = PipelineArtifact::intermediate(super::super::ArtifactKey::Vids);
        let artifact_id = artifact.id.clone();
        execution.complete_stage_with_artifacts("filter", vec![artifact], HashMap::new());

        let stage = execution.stage("filter").unwrap();
        assert_eq!(stage.status, StageStatus::Completed);
        assert_eq!(stage.output_artifacts, vec![artifact_id]);
        assert_eq!(execution.artifacts.len(), 1);
    }
}
