//! Filter stage
//!
//! Loads the raw video dataset and keeps the rows whose `trending_date` equals the
//! requested date. The comparison is exact string equality, not calendar-aware.

use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::FilterInput;
use crate::pipeline::error::PipelineError;
use crate::pipeline::models::{ArtifactKey, PipelineArtifact, PipelineStatus};
use crate::pipeline::stage_names;
use crate::pipeline::store::IntermediateStore;
use crate::pipeline::table::{Table, TableError};
use crate::pipeline::traits::PipelineStage;
use crate::utils::{decompression, human_format};

pub const TRENDING_DATE_COLUMN: &str = "trending_date";

/// Rows of `videos` whose trending date is exactly `date`, in input order
pub fn filter_by_date(videos: &Table, date: &str) -> Result<Table, TableError> {
    let date_index = videos.require_column(TRENDING_DATE_COLUMN)?;

    let mut filtered = videos.empty_like();
    for row in videos.rows().iter().filter(|row| row[date_index] == date) {
        filtered.push_row(row.clone())?;
    }
    Ok(filtered)
}

/// Read and decode a raw dataset file (zip, gzip or plain)
pub async fn load_raw_dataset(path: &Path) -> Result<Table, PipelineError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::source_read_with(path, "cannot read dataset", e))?;
    let raw_size = raw.len() as u64;

    let owned_path = path.to_path_buf();
    let (format, table) = tokio::task::spawn_blocking(move || {
        let (format, decoded) = decompression::decompress(raw).map_err(|e| {
            PipelineError::source_read_with(&owned_path, "cannot decompress dataset", e)
        })?;
        let table = Table::from_csv_slice(&decoded).map_err(|e| {
            PipelineError::source_read_with(&owned_path, "cannot parse dataset", e)
        })?;
        Ok::<_, PipelineError>((format, table))
    })
    .await
    .map_err(|e| PipelineError::StageJoin {
        stage: stage_names::FILTER.to_string(),
        message: e.to_string(),
    })??;

    debug!(
        "Loaded raw dataset: path={} format={} size={} rows={}",
        path.display(),
        format.as_str(),
        human_format::format_bytes(raw_size),
        table.len()
    );
    Ok(table)
}

pub struct FilterStage {
    input: FilterInput,
}

impl FilterStage {
    pub fn new(input: FilterInput) -> Self {
        Self { input }
    }
}

#[async_trait::async_trait]
impl PipelineStage for FilterStage {
    async fn execute(
        &self,
        store: &dyn IntermediateStore,
    ) -> Result<Vec<PipelineArtifact>, PipelineError> {
        let start = Instant::now();
        let path = self.input.path_vids.as_path();

        let videos = load_raw_dataset(path).await?;
        let filtered = filter_by_date(&videos, &self.input.date).map_err(|e| {
            PipelineError::source_read_with(path, "dataset is not a trending video export", e)
        })?;

        let artifact = store
            .put(ArtifactKey::Vids, &filtered)
            .await?
            .with_metadata("source_rows".to_string(), videos.len().into())
            .with_metadata("date".to_string(), self.input.date.clone().into());

        info!(
            "Filter stage completed: source={} date={} rows_in={} rows_out={} duration={}",
            path.display(),
            self.input.date,
            videos.len(),
            filtered.len(),
            human_format::format_duration(start.elapsed())
        );
        Ok(vec![artifact])
    }

    fn stage_id(&self) -> &'static str {
        stage_names::FILTER
    }

    fn stage_name(&self) -> &'static str {
        "Filter"
    }

    fn output(&self) -> Option<ArtifactKey> {
        Some(ArtifactKey::Vids)
    }

    fn pipeline_status(&self) -> PipelineStatus {
        PipelineStatus::FilteringPreprocessing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::store::MemoryArtifactStore;
    use tempfile::TempDir;

    const VIDEOS: &str = "\
video_id,trending_date,category_id,likes,dislikes
a,17.14.11,1,100,10
b,17.14.11,1,50,5
c,17.15.11,2,10,20
d,2017-11-14,1,7,1
";

    #[test]
    fn test_filter_keeps_exact_date_matches_in_order() {
        let videos = Table::from_csv_slice(VIDEOS.as_bytes()).unwrap();
        let filtered = filter_by_date(&videos, "17.14.11").unwrap();

        assert_eq!(filtered.columns(), videos.columns());
        let ids: Vec<&str> = filtered.rows().iter().map(|r| r[0].as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_filter_date_is_not_calendar_aware() {
        let videos = Table::from_csv_slice(VIDEOS.as_bytes()).unwrap();
        assert!(filter_by_date(&videos, "2017-11-15").unwrap().is_empty());
        assert_eq!(filter_by_date(&videos, "2017-11-14").unwrap().len(), 1);
    }

    #[test]
    fn test_filter_requires_trending_date() {
        let table = Table::from_csv_slice(b"video_id,likes\na,1\n").unwrap();
        assert!(matches!(
            filter_by_date(&table, "17.14.11"),
            Err(TableError::MissingColumn { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_dataset_is_source_read_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryArtifactStore::new();
        let stage = FilterStage::new(FilterInput {
            path_vids: temp_dir.path().join("absent.zip"),
            date: "17.14.11".to_string(),
        });

        let err = stage.execute(&store).await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceRead { .. }));
        assert!(!store.contains(ArtifactKey::Vids).await.unwrap());
    }

    #[tokio::test]
    async fn test_plain_dataset_is_filtered_into_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("videos.csv");
        std::fs::write(&path, VIDEOS).unwrap();

        let store = MemoryArtifactStore::new();
        let stage = FilterStage::new(FilterInput {
            path_vids: path,
            date: "17.15.11".to_string(),
        });
        let artifacts = stage.execute(&store).await.unwrap();

        assert_eq!(artifacts[0].record_count, Some(1));
        assert_eq!(artifacts[0].metadata["source_rows"], 4);
        let vids = store.get(ArtifactKey::Vids).await.unwrap();
        assert_eq!(vids.rows()[0][0], "c");
    }
}
