//! Tracing subscriber setup

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for `level`, scoped to this crate and its storage backend
pub fn default_filter(level: &str) -> String {
    if level == "trace" {
        format!("ratio_pipeline={level},sandboxed_scratch={level},figment=debug")
    } else {
        format!("ratio_pipeline={level},sandboxed_scratch={level}")
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Output goes to stderr so that command
/// output on stdout stays clean.
pub fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .try_init()
        .context("Failed to install tracing subscriber")
}
