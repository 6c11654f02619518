//! gauge - read-only SQL artifacts to cached datasets and KPI reports.

mod cli;
mod logging;

use std::path::Path;

use cli::{CacheCommand, Cli, Command, RunArgs};
use db_gauge::cache::CacheStore;
use db_gauge::config::Config;
use db_gauge::db;
use db_gauge::engine::{ArtifactExecutionEngine, DatasetPreview, RunOptions};
use db_gauge::error::{GaugeError, Result};
use db_gauge::memory::MemoryDocument;
use db_gauge::{plan, safety};
use serde::Serialize;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;

    match &cli.command {
        Command::Run(args) => {
            args.apply_to(&mut config)?;
            config.apply_env_defaults();
            run_artifacts(args, &config).await
        }
        Command::Check { sql } => check(sql),
        Command::Cache(command) => {
            let dir = match command {
                CacheCommand::List { cache_dir } | CacheCommand::Get { cache_dir, .. } => cache_dir,
            };
            if let Some(dir) = dir {
                config.cache.dir = Some(dir.clone());
            }
            config.apply_env_defaults();
            cache_command(command, &config).await
        }
    }
}

async fn run_artifacts(args: &RunArgs, config: &Config) -> Result<()> {
    let artifacts = plan::load_artifacts(&args.artifacts)?;
    let analysis_plan = args.plan.as_deref().map(plan::load_plan).transpose()?;

    let cache = CacheStore::open(&config.cache.resolved_dir()).await?;

    info!("Source: {}", config.source.display_string());
    let source = match db::connect(&config.source).await {
        Ok(source) => source,
        Err(e) => {
            cache.close().await;
            return Err(e);
        }
    };

    let engine = ArtifactExecutionEngine::new(
        source.as_ref(),
        &cache,
        RunOptions::from_config(config),
    );
    let result = engine.run(&artifacts, analysis_plan.as_ref()).await;

    if let Err(e) = source.close().await {
        warn!("Failed to close source: {e}");
    }
    cache.close().await;
    let outcome = result?;

    let mut memory = MemoryDocument::load(cache.dir());
    memory.record_run(&outcome.bundle, analysis_plan.as_ref())?;
    memory.save()?;
    info!("Updated {}", memory.path().display());

    write_json(args.output.as_deref(), &outcome.bundle)?;
    if let Some(path) = &args.previews {
        write_json(Some(path), &outcome.previews)?;
    }
    if let Some(path) = &args.failures {
        write_json(Some(path), &outcome.failures)?;
    }

    for failure in &outcome.failures {
        warn!(
            "Excluded '{}' ({}): {}",
            failure.dataset_name,
            failure.kind.as_str(),
            failure.message
        );
    }
    Ok(())
}

fn check(sql: &str) -> Result<()> {
    safety::check(sql).map_err(|rejection| GaugeError::unsafe_query(rejection.to_string()))?;
    println!("OK: read-only SELECT");
    Ok(())
}

async fn cache_command(command: &CacheCommand, config: &Config) -> Result<()> {
    let cache = CacheStore::open(&config.cache.resolved_dir()).await?;
    let result = match command {
        CacheCommand::List { .. } => match cache.list_entries().await {
            Ok(entries) => write_json(None, &entries),
            Err(e) => Err(e),
        },
        CacheCommand::Get { key, limit, .. } => match cache.get(key).await {
            Ok(Some(data)) => {
                let limit = limit.unwrap_or(config.run.preview_rows);
                write_json(None, &DatasetPreview::new(key, &data, limit))
            }
            Ok(None) => Err(GaugeError::persistence(format!("'{key}' is not cached"))),
            Err(e) => Err(e),
        },
    };
    cache.close().await;
    result
}

/// Writes pretty JSON to `path`, or to stdout when no path is given.
fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| GaugeError::internal(format!("Failed to encode output: {e}")))?;

    match path {
        Some(path) => {
            std::fs::write(path, text).map_err(|e| {
                GaugeError::persistence(format!("Failed to write {}: {e}", path.display()))
            })?;
            info!("Wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}
