//! Command-line argument parsing for gauge.

use clap::{Args, Parser, Subcommand};
use db_gauge::config::{Config, SourceConfig};
use db_gauge::error::Result;
use std::path::PathBuf;

/// Runs read-only SQL artifacts into cached datasets and KPI reports.
#[derive(Parser, Debug)]
#[command(name = "gauge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", env = "GAUGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute artifacts, cache their results, and compute KPIs
    Run(RunArgs),

    /// Check whether a statement passes the read-only gate
    Check {
        /// SQL statement to check
        #[arg(value_name = "SQL")]
        sql: String,
    },

    /// Inspect the dataset cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Artifact document (JSON, or planner output wrapping JSON)
    #[arg(long, value_name = "FILE")]
    pub artifacts: PathBuf,

    /// Analysis plan document with a `kpis` list
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,

    /// Source URL (postgres://, postgresql://, or sqlite://)
    #[arg(long, value_name = "URL")]
    pub source: Option<String>,

    /// Cache directory
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Prefix for derived cache keys
    #[arg(long, value_name = "NS")]
    pub namespace: Option<String>,

    /// Rows kept in each dataset preview
    #[arg(long, value_name = "N")]
    pub preview_rows: Option<usize>,

    /// Write the execution bundle here instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write dataset previews here
    #[arg(long, value_name = "FILE")]
    pub previews: Option<PathBuf>,

    /// Write excluded artifacts and their reasons here as JSON
    #[arg(long, value_name = "FILE")]
    pub failures: Option<PathBuf>,

    /// Abort the whole run on the first rejected statement
    #[arg(long)]
    pub strict: bool,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// List index entries, newest first
    List {
        /// Cache directory
        #[arg(long, value_name = "DIR")]
        cache_dir: Option<PathBuf>,
    },

    /// Print the leading rows of a cached dataset as JSON
    Get {
        /// Cache key
        #[arg(value_name = "KEY")]
        key: String,

        /// Cache directory
        #[arg(long, value_name = "DIR")]
        cache_dir: Option<PathBuf>,

        /// Maximum rows to print
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }
}

impl RunArgs {
    /// Overrides config values with the flags that were given.
    pub fn apply_to(&self, config: &mut Config) -> Result<()> {
        if let Some(url) = &self.source {
            config.source = SourceConfig::from_url(url)?;
        }
        if let Some(dir) = &self.cache_dir {
            config.cache.dir = Some(dir.clone());
        }
        if let Some(namespace) = &self.namespace {
            config.cache.namespace = namespace.clone();
        }
        if let Some(rows) = self.preview_rows {
            config.run.preview_rows = rows;
        }
        if self.strict {
            config.run.strict_gate = true;
        }
        Ok(())
    }
}
