//! Database session boundary.
//!
//! The engine never talks to a database directly. Everything it needs from
//! the target - the history snapshot at run start and the execute-and-record
//! step per script - goes through [`DatabaseSession`]. Backends implement
//! this trait; [`MemorySession`] is the in-memory implementation used by the
//! engine's own tests and by CLI tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::catalog::{ScriptDescriptor, ScriptKind};
use crate::error::{DeployError, DeployResult};
use crate::history::{AppliedScriptRecord, HistorySnapshot};
use crate::sortkey::version_cmp;

/// The engine's view of the target database.
#[async_trait]
pub trait DatabaseSession: Send + Sync {
    /// Read the change history once, at run start.
    ///
    /// `create_history_table` asks the backend to create the history table
    /// when missing. Dry-run mode must suppress that creation along with any
    /// other mutation.
    async fn get_script_metadata(
        &self,
        create_history_table: bool,
        dry_run: bool,
    ) -> DeployResult<HistorySnapshot>;

    /// Execute a rendered change script and record it in the history.
    ///
    /// The history row is written only when execution succeeds. Dry-run mode
    /// suppresses both the execution and the history write.
    async fn apply_change_script(
        &self,
        script: &ScriptDescriptor,
        rendered_sql: &str,
        checksum: &str,
        dry_run: bool,
    ) -> DeployResult<()>;
}

#[derive(Default)]
struct MemoryState {
    records: Vec<AppliedScriptRecord>,
    executed: Vec<(String, String)>,
    fail_on: Option<String>,
}

/// In-memory [`DatabaseSession`] backed by a vector of history records.
///
/// Supports preloading history (baseline scenarios) and injecting a failure
/// for a named script (halt-and-rerun scenarios).
#[derive(Default)]
pub struct MemorySession {
    state: Mutex<MemoryState>,
}

impl MemorySession {
    /// Create an empty session: no history, nothing executed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with preloaded history records.
    pub fn with_applied(records: Vec<AppliedScriptRecord>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                records,
                ..Default::default()
            }),
        }
    }

    /// Make the next application of `script_name` fail.
    pub fn fail_when_applying(&self, script_name: impl Into<String>) {
        self.state.lock().fail_on = Some(script_name.into());
    }

    /// Clear an injected failure.
    pub fn clear_failure(&self) {
        self.state.lock().fail_on = None;
    }

    /// Names of scripts whose SQL was actually executed, in order.
    pub fn executed_scripts(&self) -> Vec<String> {
        self.state
            .lock()
            .executed
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Current history records.
    pub fn records(&self) -> Vec<AppliedScriptRecord> {
        self.state.lock().records.clone()
    }
}

#[async_trait]
impl DatabaseSession for MemorySession {
    async fn get_script_metadata(
        &self,
        _create_history_table: bool,
        _dry_run: bool,
    ) -> DeployResult<HistorySnapshot> {
        let state = self.state.lock();
        let mut snapshot = HistorySnapshot::default();

        for record in state.records.iter().filter(|r| r.success) {
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
                        .insert(record.script_name.clone(), record.clone());
                }
                ScriptKind::Repeatable => {
                    snapshot
                        .repeatable_checksums
                        .insert(record.script_name.clone(), record.checksum.clone());
                }
                ScriptKind::Always => {}
            }
        }

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
            return Ok(());
        }

        let mut state = self.state.lock();
        if state.fail_on.as_deref() == Some(script.name()) {
            return Err(DeployError::session(format!(
                "injected failure for '{}'",
                script.name()
            )));
        }

        state
            .executed
            .push((script.name().to_string(), rendered_sql.to_string()));

        let next_rank = state
            .records
            .iter()
            .map(|r| r.installed_rank)
            .max()
            .unwrap_or(0)
            + 1;
        let record = AppliedScriptRecord {
            script_name: script.name().to_string(),
            kind: script.kind(),
            version: script.version().map(String::from),
            checksum: checksum.to_string(),
            installed_rank: next_rank,
            applied_at: Utc::now(),
            success: true,
        };

        // One row per script name: re-application replaces the prior record.
        match state
            .records
            .iter_mut()
            .find(|r| r.script_name == record.script_name)
        {
            Some(existing) => *existing = record,
            None => state.records.push(record),
        }

        Ok(())
    }
}
