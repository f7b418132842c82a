//! Static command registry.
//!
//! Subcommands dispatch through an explicit mapping from name to a
//! statically known handler implementing a fixed `pre_run`/`run`/`post_run`
//! interface. The table is populated at startup by [`Registry::builtin`];
//! there is no runtime discovery.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::{CliError, CliResult};

/// Everything a handler needs for one invocation.
pub struct CommandContext {
    /// Parsed CLI arguments.
    pub cli: Cli,
    /// Loaded project configuration.
    pub config: Config,
}

/// Fixed interface every subcommand handler implements.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Registry key for this handler.
    fn name(&self) -> &'static str;

    /// Runs before [`CommandHandler::run`]. A failure aborts the command.
    async fn pre_run(&self, _ctx: &CommandContext) -> CliResult<()> {
        Ok(())
    }

    /// The command body.
    async fn run(&self, ctx: &CommandContext) -> CliResult<()>;

    /// Runs after a successful [`CommandHandler::run`].
    async fn post_run(&self, _ctx: &CommandContext) -> CliResult<()> {
        Ok(())
    }
}

/// Mapping from subcommand name to handler.
#[derive(Default)]
pub struct Registry {
    handlers: BTreeMap<&'static str, Box<dyn CommandHandler>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with all built-in handlers.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::commands::deploy::DeployCommand));
        registry.register(Box::new(crate::commands::render::RenderCommand));
        registry.register(Box::new(crate::commands::version::VersionCommand));
        registry
    }

    /// Register a handler under its own name. A later registration under the
    /// same name replaces the earlier one.
    pub fn register(&mut self, handler: Box<dyn CommandHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    /// Registered subcommand names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Dispatch one invocation through its handler.
    pub async fn dispatch(&self, ctx: &CommandContext) -> CliResult<()> {
        let name = ctx.cli.command.name();
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| CliError::Command(format!("no handler registered for '{name}'")))?;

        handler.pre_run(ctx).await?;
        handler.run(ctx).await?;
        handler.post_run(ctx).await
    }
}
