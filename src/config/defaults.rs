/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Config sources
pub const DEFAULT_CONFIG_FILE: &str = "ratio-pipeline.toml";
pub const ENV_PREFIX: &str = "RATIO_PIPELINE_";
pub const ENV_NESTING_SEPARATOR: &str = "__";
/// Read as a raw string, after the prefix
pub const ENV_DATE_KEY: &str = "RUN__DATE";

// Storage defaults
pub const DEFAULT_PIPELINE_PATH: &str = "./tmp";
pub const DEFAULT_RUN_SCOPED: bool = true;
pub const DEFAULT_SECURE_PERMISSIONS: bool = true;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_JSON: bool = false;
