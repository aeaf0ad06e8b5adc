//! Preprocess stage
//!
//! Flattens the nested category taxonomy document into a `category,id` table. Any
//! malformed item aborts the whole stage; there is no partial recovery.

use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

use crate::config::PreprocessInput;
use crate::pipeline::error::PipelineError;
use crate::pipeline::models::{ArtifactKey, PipelineArtifact, PipelineStatus};
use crate::pipeline::stage_names;
use crate::pipeline::store::IntermediateStore;
use crate::pipeline::table::Table;
use crate::pipeline::traits::PipelineStage;
use crate::utils::human_format;

pub const CATEGORY_COLUMN: &str = "category";
pub const ID_COLUMN: &str = "id";

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("taxonomy document has no 'items' array")]
    MissingItems,

    #[error("item {index}: {reason}")]
    InvalidItem { index: usize, reason: String },
}

fn invalid(index: usize, reason: impl Into<String>) -> TaxonomyError {
    TaxonomyError::InvalidItem {
        index,
        reason: reason.into(),
    }
}

/// Integer category id; numeric strings and integral floats are accepted
fn parse_id(index: usize, value: Option<&Value>) -> Result<i64, TaxonomyError> {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| invalid(index, format!("id {n} is not an integer"))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| invalid(index, format!("id '{s}' is not an integer: {e}"))),
        Some(other) => Err(invalid(index, format!("id has unsupported type: {other}"))),
        None => Err(invalid(index, "missing 'id'")),
    }
}

/// Build the `category,id` table from a taxonomy document.
///
/// Administrative fields (`kind`, `etag`, ...) are dropped; item order is kept.
pub fn flatten_taxonomy(document: &Value) -> Result<Table, TaxonomyError> {
    let items = document
        .get("items")
        .and_then(Value::as_array)
        .ok_or(TaxonomyError::MissingItems)?;

    let mut categories = Table::new([CATEGORY_COLUMN, ID_COLUMN]);
    for (index, item) in items.iter().enumerate() {
        let id = parse_id(index, item.get("id"))?;
        let title = item
            .get("snippet")
            .and_then(|snippet| snippet.get("title"))
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(index, "missing 'snippet.title'"))?;

        categories
            .push_row(vec![title.to_string(), id.to_string()])
            .map_err(|e| invalid(index, e.to_string()))?;
    }
    Ok(categories)
}

async fn load_taxonomy(path: &Path) -> Result<Value, PipelineError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::source_read_with(path, "cannot read taxonomy", e))?;
    serde_json::from_slice(&raw)
        .map_err(|e| PipelineError::source_read_with(path, "taxonomy is not valid JSON", e))
}

pub struct PreprocessStage {
    input: PreprocessInput,
}

impl PreprocessStage {
    pub fn new(input: PreprocessInput) -> Self {
        Self { input }
    }
}

#[async_trait::async_trait]
impl PipelineStage for PreprocessStage {
    async fn execute(
        &self,
        store: &dyn IntermediateStore,
    ) -> Result<Vec<PipelineArtifact>, PipelineError> {
        let start = Instant::now();
        let path = self.input.path_cats.as_path();

        let document = load_taxonomy(path).await?;
        let categories = flatten_taxonomy(&document).map_err(|e| {
            PipelineError::source_read_with(path, "taxonomy has an unexpected shape", e)
        })?;

        let artifact = store.put(ArtifactKey::Cats, &categories).await?;

        info!(
            "Preprocess stage completed: source={} categories={} duration={}",
            path.display(),
            categories.len(),
            human_format::format_duration(start.elapsed())
        );
        Ok(vec![artifact])
    }

    fn stage_id(&self) -> &'static str {
        stage_names::PREPROCESS
    }

    fn stage_name(&self) -> &'static str {
        "Preprocess"
    }

    fn output(&self) -> Option<ArtifactKey> {
        Some(ArtifactKey::Cats)
    }

    fn pipeline_status(&self) -> PipelineStatus {
        PipelineStatus::FilteringPreprocessing
    }
}
