//! Pipeline Error Types
//!
//! Structured errors for the intermediate store and the pipeline stages. Every failure
//! is returned to the caller; nothing in here terminates the process.

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::models::ArtifactKey;
use crate::pipeline::table::TableError;

/// Errors raised by an intermediate store
#[derive(Error, Debug)]
pub enum StoreError {
    /// No artifact stored under the requested key
    #[error("Artifact not found: '{key}'")]
    ArtifactNotFound { key: ArtifactKey },

    /// The storage backend failed
    #[error("Store backend error: {0}")]
    Backend(#[from] sandboxed_scratch::ScratchError),

    /// A stored artifact could not be encoded or decoded
    #[error("Artifact '{key}' codec error: {source}")]
    Codec {
        key: ArtifactKey,
        #[source]
        source: TableError,
    },
}

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// An external raw input is missing, unreadable or malformed
    #[error("Failed to read source {path:?}: {message}")]
    SourceRead {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A stage's required predecessor artifact is absent
    #[error(
        "Stage '{stage}' cannot run: required predecessor artifact '{key}' is absent \
         (pipeline invoked out of order, or a prior stage failed)"
    )]
    PipelineState {
        stage: String,
        key: ArtifactKey,
        #[source]
        source: StoreError,
    },

    /// The final output destination cannot be written
    #[error("Failed to write output {destination}: {message}")]
    SinkWrite {
        destination: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// An intermediate artifact exists but does not have the expected shape
    #[error("Artifact '{key}' is malformed: {source}")]
    MalformedArtifact {
        key: ArtifactKey,
        #[source]
        source: TableError,
    },

    /// Any other store failure
    #[error("Intermediate store error: {0}")]
    Store(#[from] StoreError),

    /// Missing or invalid run parameters / configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Illegal pipeline state machine transition
    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Unknown stage requested by the trigger
    #[error("Unknown stage '{0}'")]
    UnknownStage(String),

    /// A concurrently executed stage task panicked or was cancelled
    #[error("Stage task '{stage}' did not complete: {message}")]
    StageJoin { stage: String, message: String },
}

/// Process exit status for a missing predecessor artifact
pub const EXIT_PIPELINE_STATE: u8 = 3;
/// Process exit status for an unreadable raw source
pub const EXIT_SOURCE_READ: u8 = 4;
/// Process exit status for an unwritable output destination
pub const EXIT_SINK_WRITE: u8 = 5;
/// Process exit status for configuration problems
pub const EXIT_CONFIGURATION: u8 = 2;
/// Process exit status for everything else
pub const EXIT_FAILURE: u8 = 1;

impl PipelineError {
    pub fn source_read(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        PipelineError::SourceRead {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn source_read_with(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PipelineError::SourceRead {
            path: path.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn sink_write(destination: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::SinkWrite {
            destination: destination.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        PipelineError::Configuration(message.into())
    }

    /// Wrap a failed artifact read with the stage that needed it.
    ///
    /// A missing artifact becomes `PipelineState`; a corrupt one `MalformedArtifact`.
    pub fn from_store_read(stage: &str, error: StoreError) -> Self {
        match error {
            StoreError::ArtifactNotFound { key } => PipelineError::PipelineState {
                stage: stage.to_string(),
                key,
                source: StoreError::ArtifactNotFound { key },
            },
            StoreError::Codec { key, source } => PipelineError::MalformedArtifact { key, source },
            other => PipelineError::Store(other),
        }
    }

    /// Distinct process exit status per failure class
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::PipelineState { .. } => EXIT_PIPELINE_STATE,
            PipelineError::SourceRead { .. } => EXIT_SOURCE_READ,
            PipelineError::SinkWrite { .. } => EXIT_SINK_WRITE,
            PipelineError::Configuration(_) | PipelineError::UnknownStage(_) => EXIT_CONFIGURATION,
            _ => EXIT_FAILURE,
        }
    }

    /// The missing artifact key, for `PipelineState` failures
    pub fn missing_artifact(&self) -> Option<ArtifactKey> {
        match self {
            PipelineError::PipelineState { key, .. } => Some(*key),
            _ => None,
        }
    }
}
