//! Store stage
//!
//! Writes the sorted result to the requested destination, then purges the
//! intermediate store. Purge happens only after a successful write; any failure
//! leaves every artifact in place for inspection.

use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use url::Url;

use crate::config::StoreInput;
use crate::pipeline::error::PipelineError;
use crate::pipeline::models::{ArtifactKey, ArtifactType, PipelineArtifact, PipelineStatus};
use crate::pipeline::stage_names;
use crate::pipeline::store::IntermediateStore;
use crate::pipeline::traits::PipelineStage;
use crate::utils::human_format;

/// Resolve `path_output` to a local file path.
///
/// Plain paths are used as-is; `file://` URIs are converted. Any other URI scheme is
/// a sink error.
pub fn resolve_destination(raw: &str) -> Result<PathBuf, PipelineError> {
    match Url::parse(raw) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| PipelineError::sink_write(raw, "file URI does not name a local path")),
        // Single-letter schemes are Windows drive letters
        Ok(url) if url.scheme().len() > 1 => Err(PipelineError::sink_write(
            raw,
            format!("unsupported output scheme '{}'", url.scheme()),
        )),
        _ => Ok(PathBuf::from(raw)),
    }
}

pub struct StoreStage {
    input: StoreInput,
}

impl StoreStage {
    pub fn new(input: StoreInput) -> Self {
        Self { input }
    }
}

#[async_trait::async_trait]
impl PipelineStage for StoreStage {
    async fn execute(
        &self,
        store: &dyn IntermediateStore,
    ) -> Result<Vec<PipelineArtifact>, PipelineError> {
        let start = Instant::now();
        let sorted = self.read_input(store, ArtifactKey::Sorted).await?;
        let destination = resolve_destination(&self.input.path_output)?;

        let bytes = sorted
            .to_csv_bytes()
            .map_err(|source| PipelineError::MalformedArtifact {
                key: ArtifactKey::Sorted,
                source,
            })?;
        tokio::fs::write(&destination, &bytes)
            .await
            .map_err(|e| PipelineError::SinkWrite {
                destination: destination.display().to_string(),
                message: e.to_string(),
                source: Some(e),
            })?;

        info!(
            "Output written: destination={} rows={} size={}",
            destination.display(),
            sorted.len(),
            human_format::format_bytes(bytes.len() as u64)
        );

        if !store.purge().await? {
            warn!(
                "Intermediate store at {} was already empty when purging",
                store.location()
            );
        }

        info!(
            "Store stage completed: destination={} purged_store={} duration={}",
            destination.display(),
            store.location(),
            human_format::format_duration(start.elapsed())
        );

        let published = PipelineArtifact::new(
            ArtifactType::Published,
            destination.display().to_string(),
            stage_names::STORE.to_string(),
        )
        .with_record_count(sorted.len())
        .with_file_size(bytes.len() as u64);
        Ok(vec![published])
    }

    fn stage_id(&self) -> &'static str {
        stage_names::STORE
    }

    fn stage_name(&self) -> &'static str {
        "Store"
    }

    fn inputs(&self) -> &'static [ArtifactKey] {
        &[ArtifactKey::Sorted]
    }

    fn output(&self) -> Option<ArtifactKey> {
        None
    }

    fn pipeline_status(&self) -> PipelineStatus {
        PipelineStatus::Storing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::store::MemoryArtifactStore;
    use crate::pipeline::table::Table;
    use rstest::rstest;
    use tempfile::TempDir;

    async fn store_with_sorted() -> MemoryArtifactStore {
        let store = MemoryArtifactStore::new();
        let sorted = Table::from_csv_slice(
            b"category,likes,dislikes,ratio_likes_dislikes\nMusic,150,15,10.0\n",
        )
        .unwrap();
        store.put(ArtifactKey::Sorted, &sorted).await.unwrap();
        store
            .put(ArtifactKey::Vids, &Table::new(["video_id"]))
            .await
            .unwrap();
        store
    }

    #[rstest]
    #[case("out/ratio.csv", Some("out/ratio.csv"))]
    #[case("/data/ratio.csv", Some("/data/ratio.csv"))]
    #[case("file:///data/ratio.csv", Some("/data/ratio.csv"))]
    #[case("s3://bucket/ratio.csv", None)]
    #[case("https://example.com/ratio.csv", None)]
    fn test_resolve_destination(#[case] raw: &str, #[case] expected: Option<&str>) {
        match expected {
            Some(path) => assert_eq!(resolve_destination(raw).unwrap(), PathBuf::from(path)),
            None => assert!(matches!(
                resolve_destination(raw),
                Err(PipelineError::SinkWrite { .. })
            )),
        }
    }

    #[tokio::test]
    async fn test_writes_output_then_purges() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("ratio.csv");
        let store = store_with_sorted().await;

        let stage = StoreStage::new(StoreInput {
            path_output: output.display().to_string(),
        });
        let artifacts = stage.execute(&store).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "category,likes,dislikes,ratio_likes_dislikes\nMusic,150,15,10.0\n"
        );
        assert_eq!(artifacts[0].artifact_type, ArtifactType::Published);
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_skips_purge() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("missing-dir").join("ratio.csv");
        let store = store_with_sorted().await;

        let stage = StoreStage::new(StoreInput {
            path_output: output.display().to_string(),
        });
        let err = stage.execute(&store).await.unwrap_err();

        assert!(matches!(err, PipelineError::SinkWrite { .. }));
        assert_eq!(
            store.keys().await.unwrap(),
            vec![ArtifactKey::Vids, ArtifactKey::Sorted]
        );
    }

    #[tokio::test]
    async fn test_missing_sorted_skips_purge() {
        let store = MemoryArtifactStore::new();
        store
            .put(ArtifactKey::Ratio, &Table::new(["category"]))
            .await
            .unwrap();

        let stage = StoreStage::new(StoreInput {
            path_output: "unused.csv".to_string(),
        });
        let err = stage.execute(&store).await.unwrap_err();

        assert_eq!(err.missing_artifact(), Some(ArtifactKey::Sorted));
        assert!(store.contains(ArtifactKey::Ratio).await.unwrap());
    }
}
