//! `strata deploy` - apply pending change scripts to the target database.

use async_trait::async_trait;

use crate::cli::Command;
use crate::config::DeploySettings;
use crate::error::{CliError, CliResult};
use crate::output::{self, kv, success, warn};
use crate::registry::{CommandContext, CommandHandler};

/// Handler for the `deploy` subcommand.
pub struct DeployCommand;

#[async_trait]
impl CommandHandler for DeployCommand {
    fn name(&self) -> &'static str {
        "deploy"
    }

    async fn run(&self, ctx: &CommandContext) -> CliResult<()> {
        let Command::Deploy(args) = &ctx.cli.command else {
            return Err(CliError::Command(
                "deploy handler invoked with mismatched arguments".to_string(),
            ));
        };
        let settings = DeploySettings::resolve(&ctx.config, args)?;

        output::header("Deploy");
        kv("Scripts", &settings.root_folder.display().to_string());
        kv("History table", &settings.history_table.fully_qualified());
        kv("Dry run", if settings.dry_run { "yes" } else { "no" });
        output::newline();

        let report = run_deploy(&settings).await?;

        for drift in &report.drift {
            warn(&format!(
                "drift: '{}' changed after being applied (recorded {}, current {})",
                drift.script_name, drift.recorded_checksum, drift.current_checksum
            ));
        }

        success(&report.summary());
        if settings.dry_run {
            output::info("Dry run: no changes were made");
        }

        Ok(())
    }
}

#[cfg(feature = "postgres")]
async fn run_deploy(settings: &DeploySettings) -> CliResult<strata_deploy::DeployReport> {
    use strata_deploy::{DeployConfig, Deployment, TemplateRenderer};

    use crate::session::PostgresSession;

    let url = settings.require_database_url()?;
    let session = PostgresSession::connect(
        url,
        settings.history_table.clone(),
        settings.autocommit,
        settings.query_tag.clone(),
    )
    .await?;

    let renderer = TemplateRenderer::new(settings.vars.clone())?;
    let config = DeployConfig::new()
        .root_folder(settings.root_folder.clone())
        .create_history_table(settings.create_history_table)
        .dry_run(settings.dry_run);

    let deployment = Deployment::new(config, session, renderer);
    Ok(deployment.run().await?)
}

#[cfg(not(feature = "postgres"))]
async fn run_deploy(_settings: &DeploySettings) -> CliResult<strata_deploy::DeployReport> {
    Err(CliError::Command(
        "this build has no database driver; rebuild with the 'postgres' feature".to_string(),
    ))
}
