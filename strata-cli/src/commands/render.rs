//! `strata render` - render a single script and print its checksum.
//!
//! Runs the render/checksum half of the deploy pipeline without touching
//! history, for previewing template output.

use async_trait::async_trait;

use strata_deploy::{TemplateRenderer, script_checksum};

use crate::cli::Command;
use crate::error::{CliError, CliResult};
use crate::output::{self, kv};
use crate::registry::{CommandContext, CommandHandler};

/// Handler for the `render` subcommand.
pub struct RenderCommand;

#[async_trait]
impl CommandHandler for RenderCommand {
    fn name(&self) -> &'static str {
        "render"
    }

    async fn run(&self, ctx: &CommandContext) -> CliResult<()> {
        let Command::Render(args) = &ctx.cli.command else {
            return Err(CliError::Command(
                "render handler invoked with mismatched arguments".to_string(),
            ));
        };

        let mut vars = ctx.config.project.vars.clone();
        vars.extend(args.vars.iter().cloned());

        let renderer = TemplateRenderer::new(vars)?;
        let content = renderer.render_path(&args.script)?;
        let checksum = script_checksum(&content);

        output::header("Render");
        kv("Script", &args.script.display().to_string());
        kv("Checksum", &checksum);
        output::code(&content, "sql");

        Ok(())
    }
}
