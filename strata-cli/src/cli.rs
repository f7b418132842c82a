//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CONFIG_FILE_NAME;

/// Strata CLI - ordered SQL change-script deployment
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author = "Pegasus Heavy Industries LLC")]
#[command(version)]
#[command(about = "Strata CLI - deploy SQL change scripts exactly once", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the project configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Explicit log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy pending change scripts to the target database
    Deploy(DeployArgs),

    /// Render a single script and print its content and checksum
    Render(RenderArgs),

    /// Display version information
    Version,
}

impl Command {
    /// Registry name of the subcommand.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Deploy(_) => "deploy",
            Command::Render(_) => "render",
            Command::Version => "version",
        }
    }
}

/// Arguments for the `deploy` command
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Root folder containing change scripts
    #[arg(short, long)]
    pub root_folder: Option<PathBuf>,

    /// Database connection URL
    #[arg(long, env = "STRATA_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Override the change history table (database.schema.table)
    #[arg(long)]
    pub change_history_table: Option<String>,

    /// Create the change history table if it does not exist
    #[arg(long)]
    pub create_change_history_table: bool,

    /// Run the decision pipeline without executing SQL or writing history
    #[arg(long)]
    pub dry_run: bool,

    /// Enable autocommit instead of wrapping each script in a transaction
    #[arg(long)]
    pub autocommit: bool,

    /// Session tag attached to executed queries
    #[arg(long)]
    pub query_tag: Option<String>,

    /// Template variable as KEY=VALUE (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
}

/// Arguments for the `render` command
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Path to the script to render
    pub script: PathBuf,

    /// Template variable as KEY=VALUE (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
}

/// Parse a `KEY=VALUE` template variable.
fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
