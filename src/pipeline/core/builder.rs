//! Pipeline Builder
//!
//! Assembles an orchestrator and its intermediate store from configuration. Each
//! stage gets its own validated input struct; a stage never sees the whole
//! parameter bag.

use std::sync::Arc;

use sandboxed_scratch::ScratchSpace;

use crate::config::{Config, RunParameters, StorageConfig};
use crate::pipeline::core::orchestrator::{PipelineOrchestrator, StageGroup};
use crate::pipeline::error::PipelineError;
use crate::pipeline::stage_names;
use crate::pipeline::stages::{
    AggregateStage, FilterStage, JoinStage, PreprocessStage, SortStage, StoreStage,
};
use crate::pipeline::store::{IntermediateStore, ScratchArtifactStore};
use crate::pipeline::traits::PipelineStage;

/// A fresh run identifier: UTC timestamp plus a short random suffix
pub fn generate_run_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        chrono::Utc::now().format("%Y%m%dT%H%M%SZ"),
        &suffix[..8]
    )
}

/// Open the scratch-backed store for `run_id` as configured
pub fn open_store(
    storage: &StorageConfig,
    run_id: &str,
) -> Result<ScratchArtifactStore, PipelineError> {
    let mut builder = ScratchSpace::builder()
        .base_directory(&storage.pipeline_path)
        .secure_permissions(storage.secure_permissions);
    if storage.run_scoped {
        builder = builder.namespace(run_id);
    }

    let space = builder
        .build()
        .map_err(|e| PipelineError::config_error(format!("invalid store location: {e}")))?;
    Ok(ScratchArtifactStore::new(space))
}

/// Builder for constructing pipeline orchestrators
pub struct PipelineBuilder {
    storage: StorageConfig,
    params: RunParameters,
    run_id: Option<String>,
    store: Option<Arc<dyn IntermediateStore>>,
}

impl PipelineBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            storage: config.storage.clone(),
            params: config.run.clone(),
            run_id: None,
            store: None,
        }
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Use `store` instead of the configured scratch directory
    pub fn with_store(mut self, store: Arc<dyn IntermediateStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn create_stage(&self, stage_id: &str) -> Result<Box<dyn PipelineStage>, PipelineError> {
        let stage: Box<dyn PipelineStage> = match stage_id {
            stage_names::FILTER => Box::new(FilterStage::new(self.params.filter_input()?)),
            stage_names::PREPROCESS => {
                Box::new(PreprocessStage::new(self.params.preprocess_input()?))
            }
            stage_names::JOIN => Box::new(JoinStage),
            stage_names::AGGREGATE => Box::new(AggregateStage),
            stage_names::SORT => Box::new(SortStage),
            stage_names::STORE => Box::new(StoreStage::new(self.params.store_input()?)),
            other => return Err(PipelineError::UnknownStage(other.to_string())),
        };
        Ok(stage)
    }

    fn into_orchestrator(self, run_id: String) -> Result<PipelineOrchestrator, PipelineError> {
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(open_store(&self.storage, &run_id)?),
        };
        Ok(PipelineOrchestrator::new(run_id, store))
    }

    /// Full pipeline: `[filter, preprocess] -> join -> aggregate -> sort -> store`.
    ///
    /// Every run parameter is validated up front.
    pub fn build_for_run(self) -> Result<PipelineOrchestrator, PipelineError> {
        let leaves = StageGroup::new(vec![
            self.create_stage(stage_names::FILTER)?,
            self.create_stage(stage_names::PREPROCESS)?,
        ]);
        let linear = [
            stage_names::JOIN,
            stage_names::AGGREGATE,
            stage_names::SORT,
            stage_names::STORE,
        ]
        .into_iter()
        .map(|id| self.create_stage(id))
        .collect::<Result<Vec<_>, _>>()?;

        let run_id = self.run_id.clone().unwrap_or_else(generate_run_id);
        let mut orchestrator = self.into_orchestrator(run_id)?;
        orchestrator.add_group(leaves);
        for stage in linear {
            orchestrator.add_stage(stage);
        }
        Ok(orchestrator)
    }

    /// One stage only; just that stage's parameters are validated.
    ///
    /// With run-scoped storage the run id must be given, since it is what ties
    /// separate stage invocations to the same artifacts.
    pub fn build_for_stage(self, stage_id: &str) -> Result<PipelineOrchestrator, PipelineError> {
        let stage = self.create_stage(stage_id)?;
        let run_id = match (&self.run_id, self.storage.run_scoped && self.store.is_none()) {
            (Some(run_id), _) => run_id.clone(),
            (None, false) => generate_run_id(),
            (None, true) => {
                return Err(PipelineError::config_error(
                    "a run id is required to run a single stage when storage.run_scoped is enabled",
                ));
            }
        };

        let mut orchestrator = self.into_orchestrator(run_id)?;
        orchestrator.add_stage(stage);
        Ok(orchestrator)
    }
}
