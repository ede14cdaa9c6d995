//! Command-line argument parsing for snowsample.

use crate::config::Config;
use crate::error::{Result, SnowsampleError};
use crate::logging::{self, LogTarget};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Provision warehouse drivers and pull a bounded sample into a local table.
#[derive(Parser, Debug)]
#[command(name = "snowsample")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the driver jars (overrides config)
    #[arg(long, value_name = "DIR", global = true)]
    pub drivers_dir: Option<PathBuf>,

    /// AWS region of the parameter store (overrides config)
    #[arg(long, value_name = "REGION", env = "SNOWSAMPLE_REGION", global = true)]
    pub region: Option<String>,

    /// Write logs to PATH instead of stderr (default: the state directory)
    #[arg(
        long,
        value_name = "PATH",
        global = true,
        num_args = 0..=1,
        require_equals = true
    )]
    pub log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Download the newest driver versions and prune stale ones
    Provision,

    /// List the drivers currently on disk
    Status,

    /// Run the full pipeline: drivers, session, credentials, query
    Run(RunArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Maximum number of rows to pull (overrides config)
    #[arg(long, value_name = "ROWS")]
    pub limit: Option<usize>,

    /// Source table (overrides config)
    #[arg(long, value_name = "TABLE")]
    pub table: Option<String>,

    /// Use the built-in sample documents and placeholder credentials
    #[arg(long)]
    pub mock_warehouse: bool,

    /// Use drivers already on disk without checking for newer versions
    #[arg(long)]
    pub offline: bool,

    /// Number of rows to print
    #[arg(long, value_name = "ROWS", default_value = "10")]
    pub preview: usize,

    /// Print JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Where logs should go.
    pub fn log_target(&self) -> LogTarget {
        match &self.log_file {
            None => LogTarget::Stderr,
            Some(path) => LogTarget::File(path.clone().unwrap_or_else(logging::default_log_path)),
        }
    }

    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(dir) = &self.drivers_dir {
            config.drivers.dir = dir.clone();
        }
        if let Some(region) = &self.region {
            config.secrets.region = region.clone();
        }
        if let Command::Run(args) = &self.command {
            if let Some(limit) = args.limit {
                if limit == 0 {
                    return Err(SnowsampleError::config("--limit must be greater than 0"));
                }
                config.query.limit = limit;
            }
            if let Some(table) = &args.table {
                config.query.table = table.clone();
            }
        }
        config.validate()
    }
}
