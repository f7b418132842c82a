//! CLI configuration handling.
//!
//! Project settings live in `strata.toml`; CLI flags override file values.
//! The merge is plain composition: one base file config plus explicit
//! per-command overrides, no layered inheritance.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use strata_deploy::HistoryTable;

use crate::cli::DeployArgs;
use crate::error::{CliError, CliResult};

/// Default config file name (lives in project root)
pub const CONFIG_FILE_NAME: &str = "strata.toml";

/// Strata project configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project-level settings
    pub project: ProjectConfig,

    /// Change-history settings
    pub history: HistoryConfig,

    /// Database session settings
    pub session: SessionConfig,
}

/// Project-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Root folder containing change scripts
    pub root_folder: PathBuf,

    /// Template variables available to every script
    pub vars: HashMap<String, String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root_folder: PathBuf::from("./scripts"),
            vars: HashMap::new(),
        }
    }
}

/// Change-history settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Qualified change history table (database.schema.table)
    pub table: Option<String>,

    /// Create the history table if it does not exist
    pub create: bool,
}

/// Database session settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Database connection URL
    pub url: Option<String>,

    /// Enable autocommit instead of per-script transactions
    pub autocommit: bool,

    /// Session tag attached to executed queries
    pub query_tag: Option<String>,
}

impl Config {
    /// Load configuration from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> CliResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Final settings for one deploy invocation: the file config merged with CLI
/// overrides.
#[derive(Debug, Clone)]
pub struct DeploySettings {
    /// Root folder containing change scripts.
    pub root_folder: PathBuf,
    /// Merged template variables (CLI wins over file).
    pub vars: HashMap<String, String>,
    /// Change-history table.
    pub history_table: HistoryTable,
    /// Create the history table if missing.
    pub create_history_table: bool,
    /// Dry-run mode.
    pub dry_run: bool,
    /// Database connection URL.
    pub database_url: Option<String>,
    /// Autocommit instead of per-script transactions.
    pub autocommit: bool,
    /// Session query tag.
    pub query_tag: Option<String>,
}

impl DeploySettings {
    /// Merge the project config with CLI arguments.
    pub fn resolve(config: &Config, args: &DeployArgs) -> CliResult<Self> {
        let mut vars = config.project.vars.clone();
        vars.extend(args.vars.iter().cloned());

        let table = args
            .change_history_table
            .as_deref()
            .or(config.history.table.as_deref());
        let history_table = match table {
            Some(s) => HistoryTable::parse(s)?,
            None => HistoryTable::default(),
        };

        Ok(Self {
            root_folder: args
                .root_folder
                .clone()
                .unwrap_or_else(|| config.project.root_folder.clone()),
            vars,
            history_table,
            create_history_table: args.create_change_history_table || config.history.create,
            dry_run: args.dry_run,
            database_url: args
                .database_url
                .clone()
                .or_else(|| config.session.url.clone()),
            autocommit: args.autocommit || config.session.autocommit,
            query_tag: args.query_tag.clone().or_else(|| config.session.query_tag.clone()),
        })
    }

    /// The database URL, or a configuration error telling the user where to
    /// set one.
    pub fn require_database_url(&self) -> CliResult<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            CliError::Config(
                "no database URL configured; set [session].url in strata.toml, pass \
                 --database-url, or export STRATA_DATABASE_URL"
                    .to_string(),
            )
        })
    }
}
