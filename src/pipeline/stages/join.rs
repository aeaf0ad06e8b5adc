//! Join stage
//!
//! Inner join of `vids` against `cats` on `category_id = id`. Videos without a
//! matching category are dropped.

use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

use crate::pipeline::error::PipelineError;
use crate::pipeline::models::{ArtifactKey, PipelineArtifact, PipelineStatus};
use crate::pipeline::stage_names;
use crate::pipeline::store::IntermediateStore;
use crate::pipeline::table::{Table, TableError};
use crate::pipeline::traits::PipelineStage;
use crate::utils::human_format;

pub const LEFT_KEY: &str = "category_id";
pub const RIGHT_KEY: &str = "id";

fn malformed(key: ArtifactKey) -> impl Fn(TableError) -> PipelineError {
    move |source| PipelineError::MalformedArtifact { key, source }
}

fn parse_key(value: &str) -> Result<i64, std::num::ParseIntError> {
    value.trim().parse()
}

/// Output header: left columns then right columns, names present on both sides
/// suffixed `_x` / `_y`
fn joined_columns(left: &[String], right: &[String]) -> Vec<String> {
    let left_names: Vec<String> = left
        .iter()
        .map(|c| {
            if right.contains(c) {
                format!("{c}_x")
            } else {
                c.clone()
            }
        })
        .collect();
    let right_names = right.iter().map(|c| {
        if left.contains(c) {
            format!("{c}_y")
        } else {
            c.clone()
        }
    });
    left_names.into_iter().chain(right_names).collect()
}

/// Inner join preserving `vids` row order; each video row is followed by its
/// matches in `cats` order.
///
/// Keys are compared as integers. Duplicate ids in `cats` multiply the output.
pub fn inner_join(vids: &Table, cats: &Table) -> Result<Table, PipelineError> {
    let left_keys = vids
        .parse_column(LEFT_KEY, parse_key)
        .map_err(malformed(ArtifactKey::Vids))?;
    let right_keys = cats
        .parse_column(RIGHT_KEY, parse_key)
        .map_err(malformed(ArtifactKey::Cats))?;

    let mut by_id: HashMap<i64, Vec<usize>> = HashMap::new();
    for (index, id) in right_keys.iter().enumerate() {
        by_id.entry(*id).or_default().push(index);
    }

    let mut joined = Table::new(joined_columns(vids.columns(), cats.columns()));
    for (left_row, key) in vids.rows().iter().zip(&left_keys) {
        let Some(matches) = by_id.get(key) else {
            continue;
        };
        for &right_index in matches {
            let row = left_row
                .iter()
                .chain(&cats.rows()[right_index])
                .cloned()
                .collect();
            joined
                .push_row(row)
                .map_err(malformed(ArtifactKey::Joined))?;
        }
    }

    debug!(
        "Joined {} video rows with {} categories: {} rows out",
        vids.len(),
        cats.len(),
        joined.len()
    );
    Ok(joined)
}

pub struct JoinStage;

#[async_trait::async_trait]
impl PipelineStage for JoinStage {
    async fn execute(
        &self,
        store: &dyn IntermediateStore,
    ) -> Result<Vec<PipelineArtifact>, PipelineError> {
        let start = Instant::now();
        let vids = self.read_input(store, ArtifactKey::Vids).await?;
        let cats = self.read_input(store, ArtifactKey::Cats).await?;

        let joined = inner_join(&vids, &cats)?;
        let dropped = vids.len().saturating_sub(joined.len());
        let artifact = store
            .put(ArtifactKey::Joined, &joined)
            .await?
            .with_metadata("unmatched_rows".to_string(), dropped.into());

        info!(
            "Join stage completed: videos={} categories={} joined={} duration={}",
            vids.len(),
            cats.len(),
            joined.len(),
            human_format::format_duration(start.elapsed())
        );
        Ok(vec![artifact])
    }

    fn stage_id(&self) -> &'static str {
        stage_names::JOIN
    }

    fn stage_name(&self) -> &'static str {
        "Join"
    }

    fn inputs(&self) -> &'static [ArtifactKey] {
        &[ArtifactKey::Vids, ArtifactKey::Cats]
    }

    fn output(&self) -> Option<ArtifactKey> {
        Some(ArtifactKey::Joined)
    }

    fn pipeline_status(&self) -> PipelineStatus {
        PipelineStatus::Joining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::store::MemoryArtifactStore;

    fn table(csv: &str) -> Table {
        Table::from_csv_slice(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_inner_join_drops_unmatched_and_keeps_left_order() {
        let vids = table("video_id,category_id,likes\na,2,1\nb,9,1\nc,1,1\nd,2,1\n");
        let cats = table("category,id\nMusic,1\nGaming,2\n");

        let joined = inner_join(&vids, &cats).unwrap();
        assert_eq!(
            joined.columns(),
            ["video_id", "category_id", "likes", "category", "id"]
        );
        let rows: Vec<(&str, &str)> = joined
            .rows()
            .iter()
            .map(|r| (r[0].as_str(), r[3].as_str()))
            .collect();
        assert_eq!(rows, [("a", "Gaming"), ("c", "Music"), ("d", "Gaming")]);
    }

    #[test]
    fn test_keys_compare_as_integers() {
        let vids = table("video_id,category_id\na,010\n");
        let cats = table("category,id\nMusic,10\n");
        assert_eq!(inner_join(&vids, &cats).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_ids_multiply_rows() {
        let vids = table("video_id,category_id\na,1\n");
        let cats = table("category,id\nMusic,1\nMusic (dup),1\n");
        let joined = inner_join(&vids, &cats).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.rows()[1][2], "Music (dup)");
    }

    #[test]
    fn test_colliding_columns_are_suffixed() {
        let vids = table("video_id,category_id,category\na,1,raw\n");
        let cats = table("category,id\nMusic,1\n");
        let joined = inner_join(&vids, &cats).unwrap();
        assert_eq!(
            joined.columns(),
            ["video_id", "category_id", "category_x", "category_y", "id"]
        );
    }

    #[test]
    fn test_unparsable_key_is_malformed_artifact() {
        let vids = table("video_id,category_id\na,music\n");
        let cats = table("category,id\nMusic,1\n");
        assert!(matches!(
            inner_join(&vids, &cats),
            Err(PipelineError::MalformedArtifact {
                key: ArtifactKey::Vids,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_join_before_inputs_is_pipeline_state_error() {
        let store = MemoryArtifactStore::new();
        store
            .put(ArtifactKey::Cats, &table("category,id\nMusic,1\n"))
            .await
            .unwrap();

        let err = JoinStage.execute(&store).await.unwrap_err();
        assert_eq!(err.missing_artifact(), Some(ArtifactKey::Vids));
        assert!(!store.contains(ArtifactKey::Joined).await.unwrap());
    }
}
