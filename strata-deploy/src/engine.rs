//! The reconciliation engine and run orchestration.
//!
//! Given the discovered script catalog and a snapshot of the change history,
//! the engine decides per script whether to apply, skip, or flag drift, and
//! drives application strictly sequentially in deployment order. Versioned
//! history depends on a monotonically advancing baseline, so nothing here
//! runs concurrently within a single run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::catalog::{self, ScriptDescriptor, ScriptKind};
use crate::checksum::script_checksum;
use crate::error::{DeployError, DeployResult};
use crate::history::HistorySnapshot;
use crate::render::ScriptRenderer;
use crate::session::DatabaseSession;
use crate::sortkey::{KeyPart, alphanum_key};

/// Configuration for one deployment run.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Root folder scanned for change scripts.
    pub root_folder: PathBuf,
    /// Create the change-history table when missing.
    pub create_history_table: bool,
    /// Run the full decision pipeline without executing SQL or writing
    /// history.
    pub dry_run: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            root_folder: PathBuf::from("."),
            create_history_table: false,
            dry_run: false,
        }
    }
}

impl DeployConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the script root folder.
    pub fn root_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_folder = dir.into();
        self
    }

    /// Create the change-history table when missing.
    pub fn create_history_table(mut self, create: bool) -> Self {
        self.create_history_table = create;
        self
    }

    /// Enable dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// A previously applied versioned script whose current content no longer
/// matches the recorded checksum. Reported, never corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftObservation {
    /// Canonical script name.
    pub script_name: String,
    /// Script version.
    pub version: Option<String>,
    /// Checksum recorded when the script was applied.
    pub recorded_checksum: String,
    /// Checksum of the current rendered content.
    pub current_checksum: String,
}

/// Result of a deployment run.
#[derive(Debug, Default)]
pub struct DeployReport {
    /// Number of scripts applied.
    pub applied: usize,
    /// Number of scripts skipped.
    pub skipped: usize,
    /// Names of applied scripts, in application order.
    pub applied_scripts: Vec<String>,
    /// Names of skipped scripts.
    pub skipped_scripts: Vec<String>,
    /// Drift observations collected during the run.
    pub drift: Vec<DriftObservation>,
}

impl DeployReport {
    /// Check whether anything was applied.
    pub fn has_changes(&self) -> bool {
        self.applied > 0
    }

    /// Get a summary of the run.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} applied", self.applied),
            format!("{} skipped", self.skipped),
        ];
        if !self.drift.is_empty() {
            parts.push(format!("{} drift warnings", self.drift.len()));
        }
        parts.join(", ")
    }
}

/// A zero-argument callable run before or after the main deployment.
pub type Hook = Box<dyn Fn() -> DeployResult<()> + Send + Sync>;

/// Named pre/post hooks for one run.
///
/// Hook failure propagates as a run failure; post hooks do not run when the
/// main deployment failed.
#[derive(Default)]
pub struct RunHooks {
    pre: Vec<(String, Hook)>,
    post: Vec<(String, Hook)>,
}

impl RunHooks {
    /// Create an empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-run hook.
    pub fn pre_run(
        mut self,
        name: impl Into<String>,
        hook: impl Fn() -> DeployResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.pre.push((name.into(), Box::new(hook)));
        self
    }

    /// Register a post-run hook.
    pub fn post_run(
        mut self,
        name: impl Into<String>,
        hook: impl Fn() -> DeployResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.post.push((name.into(), Box::new(hook)));
        self
    }
}

/// Working state for a single deployment run. Created fresh per run and
/// discarded at run end.
struct DeploymentState {
    scripts: BTreeMap<String, ScriptDescriptor>,
    order: Vec<String>,
    snapshot: HistorySnapshot,
    /// Baseline version key, computed once at run start and never updated
    /// mid-run.
    baseline: Option<Vec<KeyPart>>,
    report: DeployReport,
}

impl DeploymentState {
    fn new(scripts: BTreeMap<String, ScriptDescriptor>, snapshot: HistorySnapshot) -> Self {
        let order = catalog::deployment_order(&scripts);
        let baseline = snapshot.max_applied_version.as_deref().map(alphanum_key);
        Self {
            scripts,
            order,
            snapshot,
            baseline,
            report: DeployReport::default(),
        }
    }
}

/// Per-script decision of the reconciliation engine.
enum Decision {
    Apply,
    Skip {
        reason: &'static str,
        drift: Option<DriftObservation>,
    },
}

/// One end-to-end deployment run over a script root.
pub struct Deployment<S: DatabaseSession, R: ScriptRenderer> {
    config: DeployConfig,
    session: S,
    renderer: R,
    hooks: RunHooks,
}

impl<S: DatabaseSession, R: ScriptRenderer> Deployment<S, R> {
    /// Create a new deployment.
    pub fn new(config: DeployConfig, session: S, renderer: R) -> Self {
        Self {
            config,
            session,
            renderer,
            hooks: RunHooks::default(),
        }
    }

    /// Attach pre/post hooks.
    pub fn with_hooks(mut self, hooks: RunHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// The underlying session.
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Run pre hooks, the deployment, then post hooks.
    pub async fn run(&self) -> DeployResult<DeployReport> {
        for (name, hook) in &self.hooks.pre {
            debug!("running pre-run hook '{}'", name);
            hook().map_err(|e| DeployError::Hook {
                name: name.clone(),
                source: Box::new(e),
            })?;
        }

        let report = self.deploy().await?;

        for (name, hook) in &self.hooks.post {
            debug!("running post-run hook '{}'", name);
            hook().map_err(|e| DeployError::Hook {
                name: name.clone(),
                source: Box::new(e),
            })?;
        }

        Ok(report)
    }

    /// Run the deployment: snapshot the history, discover scripts, then
    /// reconcile each script in deployment order.
    pub async fn deploy(&self) -> DeployResult<DeployReport> {
        info!(
            dry_run = self.config.dry_run,
            root = %self.config.root_folder.display(),
            "starting deploy"
        );

        let snapshot = self
            .session
            .get_script_metadata(self.config.create_history_table, self.config.dry_run)
            .await?;
        let scripts = catalog::discover(&self.config.root_folder).await?;
        let mut state = DeploymentState::new(scripts, snapshot);

        for name in state.order.clone() {
            let Some(script) = state.scripts.get(&name) else {
                continue;
            };

            let content = self.renderer.render(script)?;
            let checksum = script_checksum(&content);

            match evaluate(script, &checksum, &state.snapshot, state.baseline.as_ref()) {
                Decision::Skip { reason, drift } => {
                    debug!("skipping script '{}': {}", name, reason);
                    if let Some(observation) = drift {
                        warn!(
                            recorded = %observation.recorded_checksum,
                            current = %observation.current_checksum,
                            "script '{}' checksum has drifted since application",
                            name
                        );
                        state.report.drift.push(observation);
                    }
                    state.report.skipped += 1;
                    state.report.skipped_scripts.push(name);
                }
                Decision::Apply => {
                    info!(dry_run = self.config.dry_run, "applying script '{}'", name);
                    if let Err(e) = self
                        .session
                        .apply_change_script(script, &content, &checksum, self.config.dry_run)
                        .await
                    {
                        error!(
                            applied = state.report.applied,
                            skipped = state.report.skipped,
                            last_applied = state.report.applied_scripts.last().map(String::as_str),
                            "deploy halted at script '{}'",
                            name
                        );
                        let version = script.version().map(String::from);
                        return Err(DeployError::apply(name, version, e));
                    }
                    state.report.applied += 1;
                    state.report.applied_scripts.push(name);
                }
            }
        }

        info!(
            applied = state.report.applied,
            skipped = state.report.skipped,
            "completed successfully"
        );
        Ok(state.report)
    }
}

/// Decision procedure for one script, given its current rendered checksum.
fn evaluate(
    script: &ScriptDescriptor,
    checksum_current: &str,
    snapshot: &HistorySnapshot,
    baseline: Option<&Vec<KeyPart>>,
) -> Decision {
    match script.kind() {
        ScriptKind::Versioned => {
            let Some(baseline) = baseline else {
                return Decision::Apply;
            };
            if alphanum_key(script.version().unwrap_or("")) > *baseline {
                return Decision::Apply;
            }

            // At or below the baseline: history is authoritative. A missing
            // record means the script predates history tracking and is
            // adopted as-is; a checksum mismatch is drift, reported but
            // never auto-corrected.
            match snapshot.versioned.get(script.name()) {
                None => Decision::Skip {
                    reason: "older than the most recently applied version",
                    drift: None,
                },
                Some(record) => {
                    let drift = (record.checksum != checksum_current).then(|| DriftObservation {
                        script_name: script.name().to_string(),
                        version: script.version().map(String::from),
                        recorded_checksum: record.checksum.clone(),
                        current_checksum: checksum_current.to_string(),
                    });
                    Decision::Skip {
                        reason: "already applied",
                        drift,
                    }
                }
            }
        }
        ScriptKind::Repeatable => {
            let last = snapshot
                .repeatable_checksums
                .get(script.name())
                .map(String::as_str)
                .unwrap_or("");
            if last == checksum_current {
                Decision::Skip {
                    reason: "no change since last execution",
                    drift: None,
                }
            } else {
                Decision::Apply
            }
        }
        ScriptKind::Always => Decision::Apply,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::AppliedScriptRecord;
    use crate::render::TemplateRenderer;
    use crate::session::MemorySession;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    fn write_scripts(dir: &Path, files: &[(&str, &str)]) {
        for (name, content) in files {
            std::fs::write(dir.join(name), content).unwrap();
        }
    }

    fn renderer() -> TemplateRenderer {
        TemplateRenderer::new(HashMap::new()).unwrap()
    }

    fn config(root: &Path) -> DeployConfig {
        DeployConfig::new().root_folder(root)
    }

    fn applied(name: &str, kind: ScriptKind, version: Option<&str>, checksum: &str, rank: i64) -> AppliedScriptRecord {
        AppliedScriptRecord {
            script_name: name.to_string(),
            kind,
            version: version.map(String::from),
            checksum: checksum.to_string(),
            installed_rank: rank,
            applied_at: Utc::now(),
            success: true,
        }
    }

    #[test]
    fn test_config_builder() {
        let config = DeployConfig::new()
            .root_folder("./scripts")
            .create_history_table(true)
            .dry_run(true);

        assert_eq!(config.root_folder, PathBuf::from("./scripts"));
        assert!(config.create_history_table);
        assert!(config.dry_run);
    }

    #[test]
    fn test_report_summary() {
        let mut report = DeployReport::default();
        report.applied = 2;
        report.skipped = 1;
        assert_eq!(report.summary(), "2 applied, 1 skipped");
        assert!(report.has_changes());

        report.drift.push(DriftObservation {
            script_name: "v1__init.sql".to_string(),
            version: Some("1".to_string()),
            recorded_checksum: "a".to_string(),
            current_checksum: "b".to_string(),
        });
        assert_eq!(report.summary(), "2 applied, 1 skipped, 1 drift warnings");
    }

    #[tokio::test]
    async fn test_empty_history_applies_everything_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(
            dir.path(),
            &[
                ("V1__init.sql", "CREATE TABLE t (id INT);"),
                ("V2__add_col.sql", "ALTER TABLE t ADD c INT;"),
                ("R__view.sql", "CREATE VIEW v AS SELECT 1;"),
            ],
        );

        let deployment = Deployment::new(config(dir.path()), MemorySession::new(), renderer());
        let report = deployment.run().await.unwrap();

        assert_eq!(report.applied, 3);
        assert_eq!(report.skipped, 0);
        assert!(report.drift.is_empty());
        assert_eq!(
            deployment.session().executed_scripts(),
            vec!["v1__init.sql", "v2__add_col.sql", "r__view.sql"]
        );
    }

    #[tokio::test]
    async fn test_partial_history_skips_below_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let v1 = "CREATE TABLE t (id INT);";
        write_scripts(
            dir.path(),
            &[
                ("V1__init.sql", v1),
                ("V2__add_col.sql", "ALTER TABLE t ADD c INT;"),
                ("R__view.sql", "CREATE VIEW v AS SELECT 1;"),
            ],
        );

        let session = MemorySession::with_applied(vec![applied(
            "v1__init.sql",
            ScriptKind::Versioned,
            Some("1"),
            &script_checksum(v1),
            1,
        )]);
        let deployment = Deployment::new(config(dir.path()), session, renderer());
        let report = deployment.run().await.unwrap();

        assert_eq!(report.applied, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.skipped_scripts, vec!["v1__init.sql"]);
        assert_eq!(
            deployment.session().executed_scripts(),
            vec!["v2__add_col.sql", "r__view.sql"]
        );
        assert!(report.drift.is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(
            dir.path(),
            &[
                ("V1__init.sql", "CREATE TABLE t (id INT);"),
                ("V2__add_col.sql", "ALTER TABLE t ADD c INT;"),
                ("R__view.sql", "CREATE VIEW v AS SELECT 1;"),
            ],
        );

        let first = Deployment::new(config(dir.path()), MemorySession::new(), renderer());
        let report = first.run().await.unwrap();
        assert_eq!(report.applied, 3);

        let second = Deployment::new(
            config(dir.path()),
            MemorySession::with_applied(first.session().records()),
            renderer(),
        );
        let report = second.run().await.unwrap();

        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, 3);
        assert!(second.session().executed_scripts().is_empty());
    }

    #[tokio::test]
    async fn test_baseline_adoption_never_applies_older_scripts() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(
            dir.path(),
            &[
                ("V0.5__legacy.sql", "CREATE TABLE legacy (id INT);"),
                ("V2__new.sql", "CREATE TABLE fresh (id INT);"),
            ],
        );

        // History knows version 1, but v0.5 was never recorded.
        let session = MemorySession::with_applied(vec![applied(
            "v1__init.sql",
            ScriptKind::Versioned,
            Some("1"),
            "whatever",
            1,
        )]);
        let deployment = Deployment::new(config(dir.path()), session, renderer());
        let report = deployment.run().await.unwrap();

        assert_eq!(report.skipped_scripts, vec!["v0.5__legacy.sql"]);
        assert_eq!(report.applied_scripts, vec!["v2__new.sql"]);
        assert!(report.drift.is_empty());
    }

    #[tokio::test]
    async fn test_drift_is_reported_but_not_corrected() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(dir.path(), &[("V1__init.sql", "SELECT 2;")]);

        let recorded = script_checksum("SELECT 1;");
        let session = MemorySession::with_applied(vec![applied(
            "v1__init.sql",
            ScriptKind::Versioned,
            Some("1"),
            &recorded,
            1,
        )]);
        let deployment = Deployment::new(config(dir.path()), session, renderer());
        let report = deployment.run().await.unwrap();

        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.drift.len(), 1);
        assert_eq!(report.drift[0].script_name, "v1__init.sql");
        assert_eq!(report.drift[0].recorded_checksum, recorded);
        assert_eq!(report.drift[0].current_checksum, script_checksum("SELECT 2;"));
        assert!(deployment.session().executed_scripts().is_empty());
    }

    #[tokio::test]
    async fn test_applied_versioned_with_matching_checksum_skips_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let sql = "CREATE TABLE t (id INT);";
        write_scripts(dir.path(), &[("V1__init.sql", sql)]);

        let session = MemorySession::with_applied(vec![applied(
            "v1__init.sql",
            ScriptKind::Versioned,
            Some("1"),
            &script_checksum(sql),
            1,
        )]);
        let deployment = Deployment::new(config(dir.path()), session, renderer());
        let report = deployment.run().await.unwrap();

        assert_eq!(report.skipped, 1);
        assert!(report.drift.is_empty());
    }

    #[tokio::test]
    async fn test_repeatable_unchanged_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let view = "CREATE VIEW v AS SELECT 1;";
        write_scripts(dir.path(), &[("R__view.sql", view)]);

        let session = MemorySession::with_applied(vec![applied(
            "r__view.sql",
            ScriptKind::Repeatable,
            None,
            &script_checksum(view),
            1,
        )]);
        let deployment = Deployment::new(config(dir.path()), session, renderer());
        let report = deployment.run().await.unwrap();

        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_repeatable_whitespace_change_forces_apply() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(dir.path(), &[("R__view.sql", "CREATE VIEW v AS SELECT 1; ")]);

        let session = MemorySession::with_applied(vec![applied(
            "r__view.sql",
            ScriptKind::Repeatable,
            None,
            &script_checksum("CREATE VIEW v AS SELECT 1;"),
            1,
        )]);
        let deployment = Deployment::new(config(dir.path()), session, renderer());
        let report = deployment.run().await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(
            deployment.session().executed_scripts(),
            vec!["r__view.sql"]
        );
    }

    #[tokio::test]
    async fn test_always_scripts_apply_every_run() {
        let dir = tempfile::tempdir().unwrap();
        let grants = "GRANT SELECT ON ALL TABLES IN SCHEMA s TO reporting;";
        write_scripts(dir.path(), &[("A__grants.sql", grants)]);

        let session = MemorySession::with_applied(vec![applied(
            "a__grants.sql",
            ScriptKind::Always,
            None,
            &script_checksum(grants),
            1,
        )]);
        let deployment = Deployment::new(config(dir.path()), session, renderer());
        let report = deployment.run().await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_failure_halts_run_and_rerun_resumes() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(
            dir.path(),
            &[
                ("V1__init.sql", "CREATE TABLE t (id INT);"),
                ("V2__add_col.sql", "ALTER TABLE t ADD c INT;"),
                ("R__view.sql", "CREATE VIEW v AS SELECT 1;"),
            ],
        );

        let session = MemorySession::new();
        session.fail_when_applying("v2__add_col.sql");
        let deployment = Deployment::new(config(dir.path()), session, renderer());

        let err = deployment.run().await.unwrap_err();
        match &err {
            DeployError::Apply { script, version, .. } => {
                assert_eq!(script, "v2__add_col.sql");
                assert_eq!(version.as_deref(), Some("2"));
            }
            other => panic!("expected Apply error, got {other:?}"),
        }

        // V1 committed and recorded; R never attempted.
        assert_eq!(deployment.session().executed_scripts(), vec!["v1__init.sql"]);
        let records = deployment.session().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].script_name, "v1__init.sql");

        // Re-run after the fix: only V2 and R are applied.
        let rerun = Deployment::new(
            config(dir.path()),
            MemorySession::with_applied(records),
            renderer(),
        );
        let report = rerun.run().await.unwrap();
        assert_eq!(report.applied_scripts, vec!["v2__add_col.sql", "r__view.sql"]);
        assert_eq!(report.skipped_scripts, vec!["v1__init.sql"]);
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(
            dir.path(),
            &[
                ("V1__init.sql", "CREATE TABLE t (id INT);"),
                ("R__view.sql", "CREATE VIEW v AS SELECT 1;"),
            ],
        );

        let deployment = Deployment::new(
            config(dir.path()).dry_run(true),
            MemorySession::new(),
            renderer(),
        );
        let report = deployment.run().await.unwrap();

        // Decisions are identical to a live run, but nothing executes and
        // nothing is recorded.
        assert_eq!(report.applied, 2);
        assert!(deployment.session().executed_scripts().is_empty());
        assert!(deployment.session().records().is_empty());
    }

    #[tokio::test]
    async fn test_render_failure_aborts_before_execution() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(dir.path(), &[("V1__init.sql", "SELECT '{{ missing }}';")]);

        let deployment = Deployment::new(config(dir.path()), MemorySession::new(), renderer());
        let err = deployment.run().await.unwrap_err();

        assert!(matches!(err, DeployError::Render { .. }));
        assert!(deployment.session().executed_scripts().is_empty());
    }

    #[tokio::test]
    async fn test_hooks_run_around_deployment() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(dir.path(), &[("V1__init.sql", "SELECT 1;")]);

        let calls = Arc::new(Mutex::new(Vec::new()));
        let pre_calls = Arc::clone(&calls);
        let post_calls = Arc::clone(&calls);
        let hooks = RunHooks::new()
            .pre_run("audit-start", move || {
                pre_calls.lock().unwrap().push("pre");
                Ok(())
            })
            .post_run("audit-end", move || {
                post_calls.lock().unwrap().push("post");
                Ok(())
            });

        let deployment = Deployment::new(config(dir.path()), MemorySession::new(), renderer())
            .with_hooks(hooks);
        deployment.run().await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["pre", "post"]);
    }

    #[tokio::test]
    async fn test_pre_hook_failure_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(dir.path(), &[("V1__init.sql", "SELECT 1;")]);

        let hooks = RunHooks::new().pre_run("guard", || Err(DeployError::session("not allowed")));
        let deployment = Deployment::new(config(dir.path()), MemorySession::new(), renderer())
            .with_hooks(hooks);

        let err = deployment.run().await.unwrap_err();
        assert!(matches!(err, DeployError::Hook { ref name, .. } if name == "guard"));
        assert!(deployment.session().executed_scripts().is_empty());
    }

    #[tokio::test]
    async fn test_post_hooks_skipped_when_deploy_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(dir.path(), &[("V1__init.sql", "SELECT 1;")]);

        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        let hooks = RunHooks::new().post_run("notify", move || {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        let session = MemorySession::new();
        session.fail_when_applying("v1__init.sql");
        let deployment =
            Deployment::new(config(dir.path()), session, renderer()).with_hooks(hooks);

        deployment.run().await.unwrap_err();
        assert!(!*ran.lock().unwrap());
    }
}
