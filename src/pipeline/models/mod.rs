pub mod artifacts;
pub mod pipeline_execution;

pub use artifacts::{ArtifactKey, ArtifactType, PipelineArtifact};
pub use pipeline_execution::{
    PipelineExecution, PipelineStageExecution, PipelineStatus, StageStatus,
};
