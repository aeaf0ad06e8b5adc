//! Staged ratio pipeline
//!
//! - **Core**: orchestration of stage groups and run bookkeeping
//! - **Models**: artifact keys/metadata and the run state machine
//! - **Stages**: filter, preprocess, join, aggregate, sort and store
//! - **Store**: the keyed intermediate artifact store the stages exchange data through
//! - **Table**: the tabular artifact type and its delimited-text codec
//!
//! Stages never talk to each other directly. Each reads the artifacts it depends on from
//! an [`IntermediateStore`], writes the one key it owns, and returns typed errors to the
//! orchestrator.

pub mod core;
pub mod error;
pub mod models;
pub mod stages;
pub mod store;
pub mod table;
pub mod traits;

// Re-export key types for easier access
pub use self::core::{PipelineBuilder, PipelineOrchestrator, StageGroup};
pub use error::{PipelineError, StoreError};
pub use models::{
    ArtifactKey, ArtifactType, PipelineArtifact, PipelineExecution, PipelineStageExecution,
    PipelineStatus, StageStatus,
};
pub use stages::{
    AggregateStage, CategoryAggregate, FilterStage, JoinStage, PreprocessStage, RatioQuality,
    SortStage, StoreStage,
};
pub use store::{IntermediateStore, MemoryArtifactStore, ScratchArtifactStore};
pub use table::{Table, TableError};
pub use traits::PipelineStage;

/// Pipeline stage names for consistent naming across the system
pub mod stage_names {
    pub const FILTER: &str = "filter";
    pub const PREPROCESS: &str = "preprocess";
    pub const JOIN: &str = "join";
    pub const AGGREGATE: &str = "aggregate";
    pub const SORT: &str = "sort";
    pub const STORE: &str = "store";

    /// All stages in execution order
    pub const ALL: [&str; 6] = [FILTER, PREPROCESS, JOIN, AGGREGATE, SORT, STORE];
}
