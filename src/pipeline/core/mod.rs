pub mod builder;
pub mod orchestrator;

pub use builder::{PipelineBuilder, generate_run_id, open_store};
pub use orchestrator::{PipelineOrchestrator, StageGroup};
