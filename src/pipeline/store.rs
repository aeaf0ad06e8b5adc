//! Intermediate artifact store
//!
//! The keyed cache stages exchange tables through. Every backend stores the encoded
//! delimited-text form, so an artifact read back is exactly what was written.

use async_trait::async_trait;
use sandboxed_scratch::ScratchSpace;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::pipeline::error::StoreError;
use crate::pipeline::models::{ArtifactKey, PipelineArtifact};
use crate::pipeline::table::Table;

/// Keyed persistence for the artifacts exchanged between stages.
///
/// Implementations provide no cross-key locking. A `get` for a key nobody has written
/// fails with [`StoreError::ArtifactNotFound`]; it never yields an empty table.
#[async_trait]
pub trait IntermediateStore: Send + Sync {
    /// Persist `table` under `key`, provisioning the backing location on first use
    async fn put(&self, key: ArtifactKey, table: &Table) -> Result<PipelineArtifact, StoreError>;

    async fn get(&self, key: ArtifactKey) -> Result<Table, StoreError>;

    async fn contains(&self, key: ArtifactKey) -> Result<bool, StoreError>;

    /// Keys currently present, in production order
    async fn keys(&self) -> Result<Vec<ArtifactKey>, StoreError>;

    /// Remove every artifact. Returns `false` if there was nothing to remove.
    async fn purge(&self) -> Result<bool, StoreError>;

    /// Human-readable location, for diagnostics
    fn location(&self) -> String;
}

fn encode(key: ArtifactKey, table: &Table) -> Result<Vec<u8>, StoreError> {
    table
        .to_csv_bytes()
        .map_err(|source| StoreError::Codec { key, source })
}

fn decode(key: ArtifactKey, bytes: &[u8]) -> Result<Table, StoreError> {
    Table::from_csv_slice(bytes).map_err(|source| StoreError::Codec { key, source })
}

/// Store backed by a sandboxed scratch directory, one `data_<key>.csv` file per artifact
#[derive(Clone, Debug)]
pub struct ScratchArtifactStore {
    space: ScratchSpace,
}

impl ScratchArtifactStore {
    pub fn new(space: ScratchSpace) -> Self {
        Self { space }
    }

    pub fn space(&self) -> &ScratchSpace {
        &self.space
    }
}

#[async_trait]
impl IntermediateStore for ScratchArtifactStore {
    async fn put(&self, key: ArtifactKey, table: &Table) -> Result<PipelineArtifact, StoreError> {
        let bytes = encode(key, table)?;
        let written = self.space.write(key.file_name(), &bytes).await?;
        debug!(
            "Stored artifact key={} rows={} bytes={} root={}",
            key,
            table.len(),
            written,
            self.space.root().display()
        );

        Ok(PipelineArtifact::intermediate(key)
            .with_record_count(table.len())
            .with_file_size(written))
    }

    async fn get(&self, key: ArtifactKey) -> Result<Table, StoreError> {
        let bytes = match self.space.read(key.file_name()).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Err(StoreError::ArtifactNotFound { key }),
            Err(e) => return Err(e.into()),
        };
        decode(key, &bytes)
    }

    async fn contains(&self, key: ArtifactKey) -> Result<bool, StoreError> {
        Ok(self.space.exists(key.file_name()).await?)
    }

    async fn keys(&self) -> Result<Vec<ArtifactKey>, StoreError> {
        let mut keys: Vec<ArtifactKey> = self
            .space
            .list()
            .await?
            .iter()
            .filter_map(|entry| ArtifactKey::from_file_name(&entry.name))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn purge(&self) -> Result<bool, StoreError> {
        Ok(self.space.purge().await?)
    }

    fn location(&self) -> String {
        self.space.root().display().to_string()
    }
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<BTreeMap<ArtifactKey, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place raw bytes under `key`, bypassing the codec
    pub async fn put_raw(&self, key: ArtifactKey, bytes: impl Into<Vec<u8>>) {
        self.artifacts.write().await.insert(key, bytes.into());
    }

    /// Raw bytes stored under `key`
    pub async fn get_raw(&self, key: ArtifactKey) -> Option<Vec<u8>> {
        self.artifacts.read().await.get(&key).cloned()
    }
}

#[async_trait]
impl IntermediateStore for MemoryArtifactStore {
    async fn put(&self, key: ArtifactKey, table: &Table) -> Result<PipelineArtifact, StoreError> {
        let bytes = encode(key, table)?;
        let size = bytes.len() as u64;
        self.artifacts.write().await.insert(key, bytes);

        Ok(PipelineArtifact::intermediate(key)
            .with_record_count(table.len())
            .with_file_size(size))
    }

    async fn get(&self, key: ArtifactKey) -> Result<Table, StoreError> {
        let artifacts = self.artifacts.read().await;
        let bytes = artifacts
            .get(&key)
            .ok_or(StoreError::ArtifactNotFound { key })?;
        decode(key, bytes)
    }

    async fn contains(&self, key: ArtifactKey) -> Result<bool, StoreError> {
        Ok(self.artifacts.read().await.contains_key(&key))
    }

    async fn keys(&self) -> Result<Vec<ArtifactKey>, StoreError> {
        Ok(self.artifacts.read().await.keys().copied().collect())
    }

    async fn purge(&self) -> Result<bool, StoreError> {
        let mut artifacts = self.artifacts.write().await;
        let had_any = !artifacts.is_empty();
        artifacts.clear();
        Ok(had_any)
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
