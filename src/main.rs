use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use ratio_pipeline::{
    config::{Config, RunParameters, StorageConfig},
    observability,
    pipeline::{
        IntermediateStore, PipelineBuilder, PipelineError, PipelineExecution,
        core::open_store, error::EXIT_CONFIGURATION, error::EXIT_FAILURE, stage_names,
    },
    utils::human_format,
};

#[derive(Parser)]
#[command(name = "ratio-pipeline")]
#[command(version)]
#[command(about = "Computes like/dislike ratios per video category for one trending date")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (default: ratio-pipeline.toml if present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (overrides config; RUST_LOG overrides both)
    #[arg(short = 'v', long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Directory holding intermediate artifacts (overrides config)
    #[arg(long, global = true, value_name = "DIR")]
    pipeline_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Raw video dataset (zip, gzip or csv)
    #[arg(long = "vids", value_name = "PATH")]
    path_vids: Option<PathBuf>,

    /// Trending date, matched verbatim
    #[arg(long, value_name = "DATE")]
    date: Option<String>,

    /// Category taxonomy JSON document
    #[arg(long = "cats", value_name = "PATH")]
    path_cats: Option<PathBuf>,

    /// Output path or file:// URI
    #[arg(long = "output", value_name = "PATH")]
    path_output: Option<String>,
}

impl From<RunArgs> for RunParameters {
    fn from(args: RunArgs) -> Self {
        RunParameters {
            path_vids: args.path_vids,
            date: args.date,
            path_cats: args.path_cats,
            path_output: args.path_output,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StageName {
    Filter,
    Preprocess,
    Join,
    Aggregate,
    Sort,
    Store,
}

impl StageName {
    fn id(self) -> &'static str {
        match self {
            StageName::Filter => stage_names::FILTER,
            StageName::Preprocess => stage_names::PREPROCESS,
            StageName::Join => stage_names::JOIN,
            StageName::Aggregate => stage_names::AGGREGATE,
            StageName::Sort => stage_names::SORT,
            StageName::Store => stage_names::STORE,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the whole pipeline
    Run {
        #[command(flatten)]
        params: RunArgs,

        /// Run identifier (generated if omitted)
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Run a single stage against an existing run's artifacts
    Stage {
        stage: StageName,

        #[command(flatten)]
        params: RunArgs,

        #[arg(long)]
        run_id: Option<String>,
    },
    /// List the artifacts left in the store
    Inspect {
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Remove a run's artifacts
    Purge {
        #[arg(long)]
        run_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_CONFIGURATION);
        }
    };

    if let Err(e) = observability::init_tracing(&config.logging.level, config.logging.json) {
        eprintln!("warning: {e:#}");
    }

    match execute(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_failure(&e),
    }
}

fn load_config(cli: &Cli) -> Result<Config, PipelineError> {
    let mut config = Config::load(cli.config.as_deref())?;

    // Override config with CLI arguments
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(path) = &cli.pipeline_path {
        config.storage.pipeline_path = path.clone();
    }
    config.validate()?;
    Ok(config)
}

fn report_failure(error: &anyhow::Error) -> ExitCode {
    let Some(pipeline_error) = error.downcast_ref::<PipelineError>() else {
        eprintln!("error: {error:#}");
        return ExitCode::from(EXIT_FAILURE);
    };

    if let Some(key) = pipeline_error.missing_artifact() {
        eprintln!(
            "error: required artifact '{key}' ({}) is absent; run the '{}' stage first",
            key.file_name(),
            key.producer_stage()
        );
    }
    eprintln!("error: {error:#}");
    ExitCode::from(pipeline_error.exit_code())
}

async fn execute(command: Command, mut config: Config) -> Result<()> {
    match command {
        Command::Run { params, run_id } => {
            config.run.merge(params.into());
            let mut builder = PipelineBuilder::new(&config);
            if let Some(run_id) = run_id {
                builder = builder.run_id(run_id);
            }

            let mut orchestrator = builder.build_for_run()?;
            let execution = orchestrator.execute_pipeline().await?;
            log_summary(&execution);
        }
        Command::Stage {
            stage,
            params,
            run_id,
        } => {
            config.run.merge(params.into());
            let mut builder = PipelineBuilder::new(&config);
            if let Some(run_id) = run_id {
                builder = builder.run_id(run_id);
            }

            let mut orchestrator = builder.build_for_stage(stage.id())?;
            let execution = orchestrator.run_stage(stage.id()).await?;
            log_summary(&execution);
        }
        Command::Inspect { run_id } => inspect(&config.storage, run_id.as_deref()).await?,
        Command::Purge { run_id } => purge(&config.storage, run_id.as_deref()).await?,
    }
    Ok(())
}

fn log_summary(execution: &PipelineExecution) {
    let duration = execution
        .duration()
        .and_then(|d| d.to_std().ok())
        .map(human_format::format_duration)
        .unwrap_or_else(|| "-".to_string());
    info!(
        "Run {} finished: status={} stages={} duration={}",
        execution.run_id,
        execution.status,
        execution.stages.len(),
        duration
    );
}

/// Run directories under the pipeline path, for run-scoped storage
async fn list_runs(pipeline_path: &Path) -> Result<Vec<String>> {
    let mut runs = Vec::new();
    let mut entries = match tokio::fs::read_dir(pipeline_path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(runs),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to list {}", pipeline_path.display()));
        }
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir()
            && let Some(name) = entry.file_name().to_str()
        {
            runs.push(name.to_string());
        }
    }
    runs.sort();
    Ok(runs)
}

async fn inspect(storage: &StorageConfig, run_id: Option<&str>) -> Result<()> {
    let run_id = match (run_id, storage.run_scoped) {
        (Some(run_id), _) => run_id,
        (None, false) => "",
        (None, true) => {
            let runs = list_runs(&storage.pipeline_path).await?;
            if runs.is_empty() {
                println!("No runs with artifacts under {}", storage.pipeline_path.display());
            }
            for run in runs {
                println!("{run}");
            }
            return Ok(());
        }
    };

    let store = open_store(storage, run_id)?;
    let entries = store.space().list().await?;
    if entries.is_empty() {
        println!("No artifacts in {}", store.location());
        return Ok(());
    }

    println!("Artifacts in {}:", store.location());
    for entry in entries {
        let modified = entry
            .modified_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<18} {:>10}  {}",
            entry.name,
            human_format::format_bytes(entry.size_bytes),
            modified
        );
    }
    Ok(())
}

async fn purge(storage: &StorageConfig, run_id: Option<&str>) -> Result<()> {
    let run_id = match (run_id, storage.run_scoped) {
        (Some(run_id), _) => run_id,
        (None, false) => "",
        (None, true) => {
            return Err(PipelineError::config_error(
                "--run-id is required to purge when storage.run_scoped is enabled",
            )
            .into());
        }
    };

    let store = open_store(storage, run_id)?;
    if store.purge().await? {
        info!("Purged intermediate store: {}", store.location());
    } else {
        warn!("Nothing to purge at {}", store.location());
    }
    Ok(())
}
