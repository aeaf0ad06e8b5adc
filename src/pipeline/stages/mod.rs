//! Pipeline stage implementations
//!
//! Each stage pairs a pure table transform with a [`PipelineStage`] wrapper that
//! handles store access, errors and logging.
//!
//! [`PipelineStage`]: crate::pipeline::traits::PipelineStage

pub mod aggregate;
pub mod filter;
pub mod join;
pub mod preprocess;
pub mod sort;
pub mod store;

pub use aggregate::{AggregateStage, CategoryAggregate, RatioQuality, aggregate_by_category};
pub use filter::{FilterStage, filter_by_date};
pub use join::{JoinStage, inner_join};
pub use preprocess::{PreprocessStage, flatten_taxonomy};
pub use sort::{SortStage, sort_by_ratio_desc};
pub use store::{StoreStage, resolve_destination};
