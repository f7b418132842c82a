//! Change-history records and the per-run history snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::ScriptKind;
use crate::error::{DeployError, DeployResult};

/// One row of the change-history ledger. Owned by the session collaborator;
/// the engine only ever reads these and requests appends through
/// [`crate::session::DatabaseSession::apply_change_script`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedScriptRecord {
    /// Canonical script name, unique within the ledger.
    pub script_name: String,
    /// Script kind at the time of application.
    pub kind: ScriptKind,
    /// Version token, for versioned scripts.
    pub version: Option<String>,
    /// Checksum of the rendered content that was applied.
    pub checksum: String,
    /// Monotonic application order marker.
    pub installed_rank: i64,
    /// When the script was applied.
    pub applied_at: DateTime<Utc>,
    /// Whether the application succeeded. The engine only records successes.
    pub success: bool,
}

/// The engine's read-once view of the change history, taken at run start.
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    /// Applied versioned scripts, keyed by script name.
    pub versioned: HashMap<String, AppliedScriptRecord>,
    /// Last recorded checksum per repeatable script name.
    pub repeatable_checksums: HashMap<String, String>,
    /// Highest version among successfully applied versioned scripts.
    pub max_applied_version: Option<String>,
}

/// Qualified name of the change-history table.
///
/// Parsed from a dotted string of one to three parts: `table`,
/// `schema.table`, or `database.schema.table`. Missing parts fall back to the
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTable {
    /// Database holding the table.
    pub database: String,
    /// Schema holding the table.
    pub schema: String,
    /// Table name.
    pub table: String,
}

impl Default for HistoryTable {
    fn default() -> Self {
        Self {
            database: "metadata".to_string(),
            schema: "strata".to_string(),
            table: "change_history".to_string(),
        }
    }
}

impl HistoryTable {
    /// Parse a qualified table name, filling missing parts from the defaults.
    pub fn parse(input: &str) -> DeployResult<Self> {
        let defaults = Self::default();
        let parts: Vec<&str> = input.split('.').collect();

        if parts.iter().any(|p| p.is_empty()) {
            return Err(DeployError::config(format!(
                "invalid change history table name '{input}'"
            )));
        }

        match parts.as_slice() {
            [table] => Ok(Self {
                table: table.to_string(),
                ..defaults
            }),
            [schema, table] => Ok(Self {
                schema: schema.to_string(),
                table: table.to_string(),
                ..defaults
            }),
            [database, schema, table] => Ok(Self {
                database: database.to_string(),
                schema: schema.to_string(),
                table: table.to_string(),
            }),
            _ => Err(DeployError::config(format!(
                "invalid change history table name '{input}': expected at most \
                 database.schema.table"
            ))),
        }
    }

    /// Fully qualified `database.schema.table` form.
    pub fn fully_qualified(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.table)
    }

    /// `schema.table` form, for stores where the database is fixed by the
    /// connection.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_table() {
        let table = HistoryTable::default();
        assert_eq!(table.fully_qualified(), "metadata.strata.change_history");
    }

    #[test]
    fn test_parse_partial_names() {
        let one = HistoryTable::parse("history").unwrap();
        assert_eq!(one.fully_qualified(), "metadata.strata.history");

        let two = HistoryTable::parse("audit.history").unwrap();
        assert_eq!(two.fully_qualified(), "metadata.audit.history");

        let three = HistoryTable::parse("ops.audit.history").unwrap();
        assert_eq!(three.fully_qualified(), "ops.audit.history");
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        assert!(HistoryTable::parse("a.b.c.d").is_err());
        assert!(HistoryTable::parse("a..c").is_err());
        assert!(HistoryTable::parse("").is_err());
    }

    #[test]
    fn test_record_fields() {
        let record = AppliedScriptRecord {
            script_name: "v1__init.sql".to_string(),
            kind: ScriptKind::Versioned,
            version: Some("1".to_string()),
            checksum: "abc".to_string(),
            installed_rank: 1,
            applied_at: Utc::now(),
            success: true,
        };

        assert!(record.success);
        assert_eq!(record.kind, ScriptKind::Versioned);
        assert_eq!(record.version.as_deref(), Some("1"));
    }
}
