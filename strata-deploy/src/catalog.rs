//! Script discovery and filename parsing.
//!
//! The catalog scans a root folder recursively for change scripts and maps
//! each canonical script name to a descriptor. A filename's leading character
//! selects the script kind: `V` versioned, `R` repeatable, `A` always.
//! Files that match none of the patterns are silently excluded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DeployError, DeployResult};
use crate::sortkey::alphanum_key;

/// Kind of change script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptKind {
    /// One-time script ordered by a version token; applied at most once ever.
    Versioned,
    /// Re-applied whenever its rendered checksum changes.
    Repeatable,
    /// Applied on every run unconditionally.
    Always,
}

impl ScriptKind {
    /// Single-letter marker used in filenames and the change history.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptKind::Versioned => "V",
            ScriptKind::Repeatable => "R",
            ScriptKind::Always => "A",
        }
    }
}

impl std::fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScriptKind {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "V" | "v" => Ok(ScriptKind::Versioned),
            "R" | "r" => Ok(ScriptKind::Repeatable),
            "A" | "a" => Ok(ScriptKind::Always),
            other => Err(DeployError::config(format!(
                "unknown script kind marker '{other}'"
            ))),
        }
    }
}

/// Identity parsed from a script filename. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptIdentifier {
    /// Script kind selected by the filename's leading character.
    pub kind: ScriptKind,
    /// Version token; present only for versioned scripts.
    pub version: Option<String>,
    /// Free-text description from the filename. Non-semantic.
    pub description: String,
    /// Canonical key: the lowercased file name, unique within a run.
    pub name: String,
}

/// A discovered script: identity plus filesystem location.
#[derive(Debug, Clone)]
pub struct ScriptDescriptor {
    /// Parsed identity.
    pub identifier: ScriptIdentifier,
    /// Full path to the source file.
    pub path: PathBuf,
}

impl ScriptDescriptor {
    /// Canonical script name.
    pub fn name(&self) -> &str {
        &self.identifier.name
    }

    /// Script kind.
    pub fn kind(&self) -> ScriptKind {
        self.identifier.kind
    }

    /// Version token, for versioned scripts.
    pub fn version(&self) -> Option<&str> {
        self.identifier.version.as_deref()
    }
}

/// Compiled filename patterns for one discovery pass.
struct Patterns {
    versioned: Regex,
    repeatable: Regex,
    always: Regex,
}

impl Patterns {
    fn new() -> DeployResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| DeployError::discovery(format!("invalid filename pattern: {e}")))
        };
        Ok(Self {
            versioned: compile(r"(?i)^v(?P<version>.+?)__(?P<description>.+?)\.sql(?:\.tmpl)?$")?,
            repeatable: compile(r"(?i)^r__(?P<description>.+?)\.sql(?:\.tmpl)?$")?,
            always: compile(r"(?i)^a__(?P<description>.+?)\.sql(?:\.tmpl)?$")?,
        })
    }

    /// Parse a file name into a script identity, or `None` when the file is
    /// not a recognizable change script.
    fn parse(&self, file_name: &str) -> Option<ScriptIdentifier> {
        let name = file_name.to_lowercase();

        if let Some(caps) = self.versioned.captures(file_name) {
            return Some(ScriptIdentifier {
                kind: ScriptKind::Versioned,
                version: Some(caps.name("version")?.as_str().to_string()),
                description: caps.name("description")?.as_str().to_string(),
                name,
            });
        }

        if let Some(caps) = self.repeatable.captures(file_name) {
            return Some(ScriptIdentifier {
                kind: ScriptKind::Repeatable,
                version: None,
                description: caps.name("description")?.as_str().to_string(),
                name,
            });
        }

        if let Some(caps) = self.always.captures(file_name) {
            return Some(ScriptIdentifier {
                kind: ScriptKind::Always,
                version: None,
                description: caps.name("description")?.as_str().to_string(),
                name,
            });
        }

        None
    }
}

/// Discover all change scripts under `root`, recursively.
///
/// Fails when the root does not exist, contains no recognizable scripts, or
/// two files normalize to the same script name.
pub async fn discover(root: &Path) -> DeployResult<BTreeMap<String, ScriptDescriptor>> {
    let meta = tokio::fs::metadata(root).await.map_err(|_| {
        DeployError::discovery(format!("script root folder '{}' does not exist", root.display()))
    })?;
    if !meta.is_dir() {
        return Err(DeployError::discovery(format!(
            "script root '{}' is not a directory",
            root.display()
        )));
    }

    let patterns = Patterns::new()?;
    let mut scripts: BTreeMap<String, ScriptDescriptor> = BTreeMap::new();
    let mut dirs = vec![root.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                dirs.push(path);
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(identifier) = patterns.parse(file_name) else {
                debug!("ignoring non-script file: {}", path.display());
                continue;
            };

            if let Some(existing) = scripts.get(&identifier.name) {
                return Err(DeployError::discovery(format!(
                    "duplicate script name '{}': '{}' and '{}'",
                    identifier.name,
                    existing.path.display(),
                    path.display()
                )));
            }

            scripts.insert(identifier.name.clone(), ScriptDescriptor { identifier, path });
        }
    }

    if scripts.is_empty() {
        return Err(DeployError::discovery(format!(
            "no change scripts found under '{}'",
            root.display()
        )));
    }

    debug!("discovered {} change scripts", scripts.len());
    Ok(scripts)
}

/// Deployment order over a discovered catalog: versioned scripts first,
/// ascending by version; then repeatable, then always, each ascending by
/// name. Returns canonical script names.
pub fn deployment_order(scripts: &BTreeMap<String, ScriptDescriptor>) -> Vec<String> {
    let by_kind = |kind: ScriptKind| -> Vec<&ScriptDescriptor> {
        scripts.values().filter(|s| s.kind() == kind).collect()
    };

    let mut versioned = by_kind(ScriptKind::Versioned);
    versioned.sort_by(|a, b| {
        alphanum_key(a.version().unwrap_or(""))
            .cmp(&alphanum_key(b.version().unwrap_or("")))
            .then_with(|| a.name().cmp(b.name()))
    });

    let mut repeatable = by_kind(ScriptKind::Repeatable);
    repeatable.sort_by_key(|s| alphanum_key(s.name()));

    let mut always = by_kind(ScriptKind::Always);
    always.sort_by_key(|s| alphanum_key(s.name()));

    versioned
        .into_iter()
        .chain(repeatable)
        .chain(always)
        .map(|s| s.name().to_string())
        .collect()
}
