//! Aggregate stage
//!
//! Groups joined rows by category, sums likes and dislikes, and derives
//! `ratio_likes_dislikes`. Division keeps IEEE semantics: zero dislikes gives `inf`,
//! zero of both gives `NaN`. Both cases are flagged as data-quality warnings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

use crate::pipeline::error::PipelineError;
use crate::pipeline::models::{ArtifactKey, PipelineArtifact, PipelineStatus};
use crate::pipeline::stage_names;
use crate::pipeline::store::IntermediateStore;
use crate::pipeline::table::{Table, TableError};
use crate::pipeline::traits::PipelineStage;
use crate::utils::human_format;

pub const CATEGORY_COLUMN: &str = "category";
pub const LIKES_COLUMN: &str = "likes";
pub const DISLIKES_COLUMN: &str = "dislikes";
pub const RATIO_COLUMN: &str = "ratio_likes_dislikes";

/// How meaningful a category's ratio is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioQuality {
    /// Dislikes sum is positive
    Finite,
    /// Likes but no dislikes; the ratio is `+inf`
    Unbounded,
    /// Neither likes nor dislikes; the ratio is `NaN`
    Undefined,
}

impl RatioQuality {
    pub fn of(likes: u64, dislikes: u64) -> Self {
        match (likes, dislikes) {
            (0, 0) => RatioQuality::Undefined,
            (_, 0) => RatioQuality::Unbounded,
            _ => RatioQuality::Finite,
        }
    }
}

/// One output row of the aggregate stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryAggregate {
    pub category: String,
    pub likes: u64,
    pub dislikes: u64,
}

impl CategoryAggregate {
    pub fn ratio(&self) -> f64 {
        self.likes as f64 / self.dislikes as f64
    }

    pub fn quality(&self) -> RatioQuality {
        RatioQuality::of(self.likes, self.dislikes)
    }
}

/// Serialized form of a ratio: `10.0`, `0.5`, `inf`, `NaN`
pub fn format_ratio(ratio: f64) -> String {
    format!("{ratio:?}")
}

fn parse_count(value: &str) -> Result<u64, std::num::ParseIntError> {
    value.trim().parse()
}

/// Per-category sums, ordered by category name
pub fn aggregate_by_category(joined: &Table) -> Result<Vec<CategoryAggregate>, TableError> {
    let category_index = joined.require_column(CATEGORY_COLUMN)?;
    let likes = joined.parse_column(LIKES_COLUMN, parse_count)?;
    let dislikes = joined.parse_column(DISLIKES_COLUMN, parse_count)?;

    let mut groups: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for (row, cells) in joined.rows().iter().enumerate() {
        let sums = groups.entry(cells[category_index].as_str()).or_default();
        sums.0 = checked_sum(sums.0, likes[row], LIKES_COLUMN, row)?;
        sums.1 = checked_sum(sums.1, dislikes[row], DISLIKES_COLUMN, row)?;
    }

    Ok(groups
        .into_iter()
        .map(|(category, (likes, dislikes))| CategoryAggregate {
            category: category.to_string(),
            likes,
            dislikes,
        })
        .collect())
}

fn checked_sum(total: u64, value: u64, column: &str, row: usize) -> Result<u64, TableError> {
    total.checked_add(value).ok_or_else(|| TableError::InvalidValue {
        column: column.to_string(),
        row,
        value: value.to_string(),
        reason: "sum overflows u64".to_string(),
    })
}

pub fn aggregates_to_table(aggregates: &[CategoryAggregate]) -> Result<Table, TableError> {
    let mut table = Table::new([CATEGORY_COLUMN, LIKES_COLUMN, DISLIKES_COLUMN, RATIO_COLUMN]);
    for aggregate in aggregates {
        table.push_row(vec![
            aggregate.category.clone(),
            aggregate.likes.to_string(),
            aggregate.dislikes.to_string(),
            format_ratio(aggregate.ratio()),
        ])?;
    }
    Ok(table)
}

pub struct AggregateStage;

#[async_trait::async_trait]
impl PipelineStage for AggregateStage {
    async fn execute(
        &self,
        store: &dyn IntermediateStore,
    ) -> Result<Vec<PipelineArtifact>, PipelineError> {
        let start = Instant::now();
        let joined = self.read_input(store, ArtifactKey::Joined).await?;

        let aggregates = aggregate_by_category(&joined).map_err(|source| {
            PipelineError::MalformedArtifact {
                key: ArtifactKey::Joined,
                source,
            }
        })?;

        let mut unbounded = 0usize;
        let mut undefined = 0usize;
        for aggregate in &aggregates {
            match aggregate.quality() {
                RatioQuality::Finite => {}
                RatioQuality::Unbounded => {
                    unbounded += 1;
                    warn!(
                        "Data quality: category='{}' has likes={} and no dislikes, ratio is inf",
                        aggregate.category, aggregate.likes
                    );
                }
                RatioQuality::Undefined => {
                    undefined += 1;
                    warn!(
                        "Data quality: category='{}' has neither likes nor dislikes, ratio is NaN",
                        aggregate.category
                    );
                }
            }
        }

        let table = aggregates_to_table(&aggregates).map_err(|source| {
            PipelineError::MalformedArtifact {
                key: ArtifactKey::Ratio,
                source,
            }
        })?;
        let artifact = store
            .put(ArtifactKey::Ratio, &table)
            .await?
            .with_metadata("unbounded_ratios".to_string(), unbounded.into())
            .with_metadata("undefined_ratios".to_string(), undefined.into());

        info!(
            "Aggregate stage completed: rows_in={} categories={} unbounded={} undefined={} duration={}",
            joined.len(),
            aggregates.len(),
            unbounded,
            undefined,
            human_format::format_duration(start.elapsed())
        );
        Ok(vec![artifact])
    }

    fn stage_id(&self) -> &'static str {
        stage_names::AGGREGATE
    }

    fn stage_name(&self) -> &'static str {
        "Aggregate"
    }

    fn inputs(&self) -> &'static [ArtifactKey] {
        &[ArtifactKey::Joined]
    }

    fn output(&self) -> Option<ArtifactKey> {
        Some(ArtifactKey::Ratio)
    }

    fn pipeline_status(&self) -> PipelineStatus {
        PipelineStatus::Aggregating
    }
}
