//! Sort stage
//!
//! Stable descending sort on `ratio_likes_dislikes`. `inf` rows come first, `NaN` rows
//! last; rows with equal ratios keep their input order.

use std::cmp::Ordering;
use std::time::Instant;
use tracing::info;

use super::aggregate::RATIO_COLUMN;
use crate::pipeline::error::PipelineError;
use crate::pipeline::models::{ArtifactKey, PipelineArtifact, PipelineStatus};
use crate::pipeline::stage_names;
use crate::pipeline::store::IntermediateStore;
use crate::pipeline::table::{Table, TableError};
use crate::pipeline::traits::PipelineStage;
use crate::utils::human_format;

/// Descending order with every `NaN` placed after all numbers
pub fn ratio_descending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

fn parse_ratio(value: &str) -> Result<f64, std::num::ParseFloatError> {
    value.trim().parse()
}

pub fn sort_by_ratio_desc(ratios: &Table) -> Result<Table, TableError> {
    let keys = ratios.parse_column(RATIO_COLUMN, parse_ratio)?;

    let mut order: Vec<usize> = (0..ratios.len()).collect();
    // sort_by is stable
    order.sort_by(|&a, &b| ratio_descending(keys[a], keys[b]));

    let mut sorted = ratios.empty_like();
    for index in order {
        sorted.push_row(ratios.rows()[index].clone())?;
    }
    Ok(sorted)
}

pub struct SortStage;

#[async_trait::async_trait]
impl PipelineStage for SortStage {
    async fn execute(
        &self,
        store: &dyn IntermediateStore,
    ) -> Result<Vec<PipelineArtifact>, PipelineError> {
        let start = Instant::now();
        let ratios = self.read_input(store, ArtifactKey::Ratio).await?;

        let sorted = sort_by_ratio_desc(&ratios).map_err(|source| {
            PipelineError::MalformedArtifact {
                key: ArtifactKey::Ratio,
                source,
            }
        })?;
        let artifact = store.put(ArtifactKey::Sorted, &sorted).await?;

        info!(
            "Sort stage completed: rows={} duration={}",
            sorted.len(),
            human_format::format_duration(start.elapsed())
        );
        Ok(vec![artifact])
    }

    fn stage_id(&self) -> &'static str {
        stage_names::SORT
    }

    fn stage_name(&self) -> &'static str {
        "Sort"
    }

    fn inputs(&self) -> &'static [ArtifactKey] {
        &[ArtifactKey::Ratio]
    }

    fn output(&self) -> Option<ArtifactKey> {
        Some(ArtifactKey::Sorted)
    }

    fn pipeline_status(&self) -> PipelineStatus {
        PipelineStatus::Sorting
    }
}
