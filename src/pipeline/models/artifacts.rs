//! Pipeline artifact tracking system
//!
//! This module defines the keys under which stages exchange artifacts and the metadata
//! recorded for every artifact a stage produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Convention keys of the intermediate artifacts, in production order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKey {
    /// Video rows for the requested date
    Vids,
    /// Flattened category taxonomy
    Cats,
    /// Videos joined with their category names
    Joined,
    /// Per-category sums and ratio
    Ratio,
    /// Ratio rows ordered descending
    Sorted,
}

impl ArtifactKey {
    pub const ALL: [ArtifactKey; 5] = [
        ArtifactKey::Vids,
        ArtifactKey::Cats,
        ArtifactKey::Joined,
        ArtifactKey::Ratio,
        ArtifactKey::Sorted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKey::Vids => "vids",
            ArtifactKey::Cats => "cats",
            ArtifactKey::Joined => "joined",
            ArtifactKey::Ratio => "ratio",
            ArtifactKey::Sorted => "sorted",
        }
    }

    /// File name of the artifact inside the store
    pub fn file_name(&self) -> String {
        format!("data_{}.csv", self.as_str())
    }

    /// Reverse of [`ArtifactKey::file_name`]
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let key = file_name.strip_prefix("data_")?.strip_suffix(".csv")?;
        key.parse().ok()
    }

    /// The one stage allowed to write this key
    pub fn producer_stage(&self) -> &'static str {
        use crate::pipeline::stage_names;
        match self {
            ArtifactKey::Vids => stage_names::FILTER,
            ArtifactKey::Cats => stage_names::PREPROCESS,
            ArtifactKey::Joined => stage_names::JOIN,
            ArtifactKey::Ratio => stage_names::AGGREGATE,
            ArtifactKey::Sorted => stage_names::SORT,
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown artifact key '{s}'"))
    }
}

/// Where an artifact lives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum ArtifactType {
    /// Held in the intermediate store under a convention key
    Intermediate(ArtifactKey),
    /// Written to the caller's output destination
    Published,
}

/// Metadata about one artifact created during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineArtifact {
    /// Unique identifier for this artifact
    pub id: String,
    pub artifact_type: ArtifactType,
    /// Store file name, or the destination path for published output
    pub file_path: String,
    /// Name of the pipeline stage that created this artifact
    pub created_by_stage: String,
    pub record_count: Option<usize>,
    pub file_size: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PipelineArtifact {
    pub fn new(artifact_type: ArtifactType, file_path: String, created_by_stage: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            artifact_type,
            file_path,
            created_by_stage,
            record_count: None,
            file_size: None,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Metadata for an artifact just stored under `key`
    pub fn intermediate(key: ArtifactKey) -> Self {
        Self::new(
            ArtifactType::Intermediate(key),
            key.file_name(),
            key.producer_stage().to_string(),
        )
    }

    pub fn with_record_count(mut self, count: usize) -> Self {
        self.record_count = Some(count);
        self
    }

    pub fn with_file_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }

    pub fn with_metadata(mut self, key: String, value: serde_json::Value) -> Self {
        self.metadata.insert(key, value);
        self
    }

    pub fn key(&self) -> Option<ArtifactKey> {
        match self.artifact_type {
            ArtifactType::Intermediate(key) => Some(key),
            ArtifactType::Published => None,
        }
    }
}
