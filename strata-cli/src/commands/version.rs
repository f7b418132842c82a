//! `strata version` - Display version information.

use async_trait::async_trait;

use crate::error::CliResult;
use crate::output::{self, kv};
use crate::registry::{CommandContext, CommandHandler};

/// Package version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
const NAME: &str = env!("CARGO_PKG_NAME");

/// Handler for the `version` subcommand.
pub struct VersionCommand;

#[async_trait]
impl CommandHandler for VersionCommand {
    fn name(&self) -> &'static str {
        "version"
    }

    async fn run(&self, _ctx: &CommandContext) -> CliResult<()> {
        kv("Version", VERSION);
        kv("Binary", NAME);

        #[cfg(debug_assertions)]
        let build_mode = "debug";
        #[cfg(not(debug_assertions))]
        let build_mode = "release";

        kv("Build", build_mode);

        let mut features = Vec::new();

        #[cfg(feature = "postgres")]
        features.push("postgres");

        if features.is_empty() {
            features.push("none");
        }

        kv("Features", &features.join(", "));

        output::newline();
        output::section("Components");
        kv("strata-deploy", VERSION);

        Ok(())
    }
}
