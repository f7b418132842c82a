//! Strata CLI - deploy SQL change scripts exactly once.

use clap::Parser;

use strata_cli::cli::Cli;
use strata_cli::config::Config;
use strata_cli::error::CliResult;
use strata_cli::output;
use strata_cli::registry::{CommandContext, Registry};

#[tokio::main]
async fn main() {
    // Run the CLI and handle errors
    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    init_tracing(&cli);

    // Load the project configuration and dispatch through the registry
    let config = Config::load(&cli.config)?;
    let ctx = CommandContext { cli, config };

    Registry::builtin().dispatch(&ctx).await
}

/// Install the log subscriber for this run.
fn init_tracing(cli: &Cli) {
    use tracing_subscriber::EnvFilter;

    let level = if cli.verbose {
        "debug"
    } else {
        cli.log_level.as_deref().unwrap_or("info")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
