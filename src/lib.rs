//! Like/dislike ratio pipeline
//!
//! Computes the likes-to-dislikes ratio per video category for one trending date in
//! six stages: filter and preprocess (independent), then join, aggregate, sort and
//! store. Stages exchange tables through an intermediate store; the store stage
//! purges it once the result is written.

pub mod config;
pub mod observability;
pub mod pipeline;
pub mod utils;

pub use config::{Config, RunParameters};
pub use pipeline::{PipelineBuilder, PipelineError, PipelineExecution, PipelineOrchestrator};
