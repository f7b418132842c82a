//! PostgreSQL-backed database session.
//!
//! Implements the engine's [`DatabaseSession`] boundary over
//! `tokio-postgres`: reads the change-history snapshot at run start,
//! executes rendered scripts (one transaction per script unless autocommit
//! is enabled), and records each success in the history table.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use strata_deploy::{
    AppliedScriptRecord, DatabaseSession, DeployError, DeployResult, HistorySnapshot,
    HistoryTable, ScriptDescriptor, ScriptKind, version_cmp,
};

use crate::error::{CliError, CliResult};

/// A live PostgreSQL session owning the change-history table.
///
/// The `database` part of the qualified table name is fixed by the
/// connection URL; the session addresses the table as `schema.table`.
pub struct PostgresSession {
    client: Mutex<Client>,
    history_table: HistoryTable,
    autocommit: bool,
}

impl PostgresSession {
    /// Connect to the target database and configure the session.
    pub async fn connect(
        url: &str,
        history_table: HistoryTable,
        autocommit: bool,
        query_tag: Option<String>,
    ) -> CliResult<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(|e| CliError::Database(format!("connection failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("database connection error: {e}");
            }
        });

        if let Some(tag) = &query_tag {
            let set_tag = format!("SET application_name = '{}'", tag.replace('\'', "''"));
            client
                .batch_execute(&set_tag)
                .await
                .map_err(|e| CliError::Database(format!("failed to set query tag: {e}")))?;
        }

        Ok(Self {
            client: Mutex::new(client),
            history_table,
            autocommit,
        })
    }

    async fn history_table_exists(&self, client: &Client) -> DeployResult<bool> {
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2)",
                &[&self.history_table.schema, &self.history_table.table],
            )
            .await
            .map_err(db_err)?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl DatabaseSession for PostgresSession {
    async fn get_script_metadata(
        &self,
        create_history_table: bool,
        dry_run: bool,
    ) -> DeployResult<HistorySnapshot> {
        let client = self.client.lock().await;
        let table = self.history_table.qualified();

        if !self.history_table_exists(&client).await? {
            if dry_run {
                warn!(
                    "change history table {} does not exist; dry run proceeds against empty history",
                    table
                );
                return Ok(HistorySnapshot::default());
            }
            if !create_history_table {
                return Err(DeployError::session(format!(
                    "change history table {table} does not exist; pass \
                     --create-change-history-table to create it"
                )));
            }
            client
                .batch_execute(history_ddl(&self.history_table).as_str())
                .await
                .map_err(db_err)?;
            debug!("created change history table {}", table);
            return Ok(HistorySnapshot::default());
        }

        let rows = client
            .query(snapshot_sql(&self.history_table).as_str(), &[])
            .await
            .map_err(db_err)?;

        let mut snapshot = HistorySnapshot::default();
        for row in rows {
            let kind_marker: String = row.get("kind");
            let record = AppliedScriptRecord {
                script_name: row.get("script_name"),
                kind: kind_marker.parse::<ScriptKind>()?,
                version: row.get("version"),
                checksum: row.get("checksum"),
                installed_rank: row.get("installed_rank"),
                applied_at: row.get("applied_at"),
                success: row.get("success"),
            };

            match record.kind {
                ScriptKind::Versioned => {
                    if let Some(version) = &record.version {
                        let is_new_max = snapshot
                            .max_applied_version
                            .as_deref()
                            .is_none_or(|max| version_cmp(version, max).is_gt());
                        if is_new_max {
                            snapshot.max_applied_version = Some(version.clone());
                        }
                    }
                    snapshot
                        .versioned
                        .insert(record.script_name.clone(), record);
                }
                ScriptKind::Repeatable => {
                    snapshot
                        .repeatable_checksums
                        .insert(record.script_name.clone(), record.checksum.clone());
                }
                ScriptKind::Always => {}
            }
        }

        debug!(
            versioned = snapshot.versioned.len(),
            repeatable = snapshot.repeatable_checksums.len(),
            max_applied_version = snapshot.max_applied_version.as_deref(),
            "loaded change history snapshot"
        );
        Ok(snapshot)
    }

    async fn apply_change_script(
        &self,
        script: &ScriptDescriptor,
        rendered_sql: &str,
        checksum: &str,
        dry_run: bool,
    ) -> DeployResult<()> {
        if dry_run {
            debug!("dry run: skipping execution of '{}'", script.name());
            return Ok(());
        }

        let record = upsert_sql(&self.history_table);
        let params: &[&(dyn ToSql + Sync)] = &[
            &script.name(),
            &script.kind().as_str(),
            &script.version(),
            &checksum,
        ];

        let mut client = self.client.lock().await;
        if self.autocommit {
            client.batch_execute(rendered_sql).await.map_err(db_err)?;
            client.execute(record.as_str(), params).await.map_err(db_err)?;
        } else {
            let tx = client.transaction().await.map_err(db_err)?;
            tx.batch_execute(rendered_sql).await.map_err(db_err)?;
            tx.execute(record.as_str(), params).await.map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
        }

        Ok(())
    }
}

fn db_err(e: tokio_postgres::Error) -> DeployError {
    DeployError::session(e.to_string())
}

/// DDL creating the change-history schema and table.
fn history_ddl(table: &HistoryTable) -> String {
    format!(
        "CREATE SCHEMA IF NOT EXISTS {schema};\n\
         CREATE TABLE IF NOT EXISTS {qualified} (\n\
             script_name TEXT PRIMARY KEY,\n\
             kind TEXT NOT NULL,\n\
             version TEXT,\n\
             checksum TEXT NOT NULL,\n\
             installed_rank BIGINT NOT NULL,\n\
             applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),\n\
             success BOOLEAN NOT NULL DEFAULT TRUE\n\
         );",
        schema = table.schema,
        qualified = table.qualified(),
    )
}

/// Query reading all successful history rows in application order.
fn snapshot_sql(table: &HistoryTable) -> String {
    format!(
        "SELECT script_name, kind, version, checksum, installed_rank, applied_at, success \
         FROM {} WHERE success ORDER BY installed_rank",
        table.qualified()
    )
}

/// One row per script name: re-application of a repeatable script replaces
/// its prior record.
fn upsert_sql(table: &HistoryTable) -> String {
    format!(
        "INSERT INTO {qualified} (script_name, kind, version, checksum, installed_rank, success) \
         VALUES ($1, $2, $3, $4, \
             (SELECT COALESCE(MAX(installed_rank), 0) + 1 FROM {qualified}), TRUE) \
         ON CONFLICT (script_name) DO UPDATE SET \
             checksum = EXCLUDED.checksum, \
             installed_rank = EXCLUDED.installed_rank, \
             applied_at = NOW(), \
             success = EXCLUDED.success",
        qualified = table.qualified(),
    )
}
