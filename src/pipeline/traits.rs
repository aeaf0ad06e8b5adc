//! Pipeline Traits
//!
//! The abstraction every stage implements so the orchestrator can schedule it without
//! knowing what it does.

use crate::pipeline::error::PipelineError;
use crate::pipeline::models::{ArtifactKey, PipelineArtifact, PipelineStatus};
use crate::pipeline::store::IntermediateStore;
use crate::pipeline::table::Table;

/// A unit of the pipeline with a fixed set of input keys and at most one output key.
///
/// Stages take `&self` so that independent stages of a group can execute concurrently
/// against the same store.
#[async_trait::async_trait]
pub trait PipelineStage: Send + Sync {
    /// Execute this stage, reading inputs from and writing its output to `store`
    async fn execute(
        &self,
        store: &dyn IntermediateStore,
    ) -> Result<Vec<PipelineArtifact>, PipelineError>;

    /// Get the unique identifier for this stage
    fn stage_id(&self) -> &'static str;

    /// Get the human-readable name for this stage
    fn stage_name(&self) -> &'static str;

    /// Artifacts this stage requires from the store
    fn inputs(&self) -> &'static [ArtifactKey] {
        &[]
    }

    /// The one key this stage writes, if any
    fn output(&self) -> Option<ArtifactKey>;

    /// Run status while this stage executes
    fn pipeline_status(&self) -> PipelineStatus;

    /// Read a required predecessor artifact.
    ///
    /// An absent key becomes [`PipelineError::PipelineState`] naming this stage.
    async fn read_input(
        &self,
        store: &dyn IntermediateStore,
        key: ArtifactKey,
    ) -> Result<Table, PipelineError> {
        store
            .get(key)
            .await
            .map_err(|e| PipelineError::from_store_read(self.stage_id(), e))
    }
}
