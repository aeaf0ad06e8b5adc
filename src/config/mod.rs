//! Configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `RATIO_PIPELINE_*` environment variables. The binary applies CLI flags last.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::pipeline::PipelineError;

pub mod defaults;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Parameter bag normally supplied by the trigger
    #[serde(default)]
    pub run: RunParameters,
}

/// Where intermediate artifacts live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_pipeline_path")]
    pub pipeline_path: PathBuf,
    /// Keep each run's artifacts under `<pipeline_path>/<run_id>`
    #[serde(default = "default_run_scoped")]
    pub run_scoped: bool,
    #[serde(default = "default_secure_permissions")]
    pub secure_permissions: bool,
}

fn default_pipeline_path() -> PathBuf {
    PathBuf::from(DEFAULT_PIPELINE_PATH)
}
fn default_run_scoped() -> bool {
    DEFAULT_RUN_SCOPED
}
fn default_secure_permissions() -> bool {
    DEFAULT_SECURE_PERMISSIONS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pipeline_path: default_pipeline_path(),
            run_scoped: DEFAULT_RUN_SCOPED,
            secure_permissions: DEFAULT_SECURE_PERMISSIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: DEFAULT_LOG_JSON,
        }
    }
}

/// Run-time parameters. Every field is optional here; each stage validates only the
/// ones it needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_vids: Option<PathBuf>,
    /// Compared verbatim against `trending_date`, so it must be a string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_cats: Option<PathBuf>,
    /// Filesystem path or `file://` URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_output: Option<String>,
}

/// Validated input of the filter stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterInput {
    pub path_vids: PathBuf,
    pub date: String,
}

/// Validated input of the preprocess stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessInput {
    pub path_cats: PathBuf,
}

/// Validated input of the store stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInput {
    pub path_output: String,
}

fn required<T>(
    value: Option<T>,
    field: &str,
    is_empty: impl Fn(&T) -> bool,
) -> Result<T, PipelineError> {
    match value {
        Some(v) if !is_empty(&v) => Ok(v),
        Some(_) => Err(PipelineError::config_error(format!(
            "run parameter '{field}' must not be empty"
        ))),
        None => Err(PipelineError::config_error(format!(
            "missing run parameter '{field}'"
        ))),
    }
}

impl RunParameters {
    pub fn filter_input(&self) -> Result<FilterInput, PipelineError> {
        Ok(FilterInput {
            path_vids: required(self.path_vids.clone(), "path_vids", |p| {
                p.as_os_str().is_empty()
            })?,
            date: required(self.date.clone(), "date", |d| d.is_empty())?,
        })
    }

    pub fn preprocess_input(&self) -> Result<PreprocessInput, PipelineError> {
        Ok(PreprocessInput {
            path_cats: required(self.path_cats.clone(), "path_cats", |p| {
                p.as_os_str().is_empty()
            })?,
        })
    }

    pub fn store_input(&self) -> Result<StoreInput, PipelineError> {
        Ok(StoreInput {
            path_output: required(self.path_output.clone(), "path_output", |p| {
                p.trim().is_empty()
            })?,
        })
    }

    /// Overlay the fields set in `other`
    pub fn merge(&mut self, other: RunParameters) {
        if other.path_vids.is_some() {
            self.path_vids = other.path_vids;
        }
        if other.date.is_some() {
            self.date = other.date;
        }
        if other.path_cats.is_some() {
            self.path_cats = other.path_cats;
        }
        if other.path_output.is_some() {
            self.path_output = other.path_output;
        }
    }
}

impl Config {
    /// Load configuration from defaults, a TOML file and the environment.
    ///
    /// Without an explicit `config_file`, `ratio-pipeline.toml` is used if present. An
    /// explicit file must exist.
    pub fn load(config_file: Option<&Path>) -> Result<Self, PipelineError> {
        let path = match config_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(PipelineError::config_error(format!(
                        "config file {} not found",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config: Config = Self::figment(&path)
            .extract()
            .map_err(|e| PipelineError::config_error(e.to_string()))?;
        config.validate()?;

        if path.is_file() {
            info!("Configuration loaded from: {}", path.display());
        } else {
            debug!(
                "No config file at {}, using defaults and environment",
                path.display()
            );
        }
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_NESTING_SEPARATOR));

        // The env provider parses numeric-looking values, which would rewrite
        // dates such as `0101` or `2018.10`.
        match std::env::var(format!("{ENV_PREFIX}{ENV_DATE_KEY}")) {
            Ok(date) => figment.merge(Serialized::default("run.date", date)),
            Err(_) => figment,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.storage.pipeline_path.as_os_str().is_empty() {
            return Err(PipelineError::config_error(
                "storage.pipeline_path must not be empty",
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(PipelineError::config_error("logging.level must not be empty"));
        }
        Ok(())
    }
}
