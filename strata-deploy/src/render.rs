//! Script rendering.
//!
//! Every script passes through a renderer before checksumming and execution,
//! whether or not it carries template placeholders. The engine calls the
//! renderer once per script, synchronously, and treats it as a black box
//! producing final SQL text.

use std::collections::HashMap;
use std::path::Path;

use regex_lite::Regex;

use crate::catalog::ScriptDescriptor;
use crate::error::{DeployError, DeployResult};

/// Turns a script's raw source into final executable SQL.
///
/// Implementations must be deterministic: the same source file and variable
/// context always produce the same text.
pub trait ScriptRenderer: Send + Sync {
    /// Render one script to its final SQL text.
    fn render(&self, script: &ScriptDescriptor) -> DeployResult<String>;
}

/// Renderer substituting `{{ name }}` placeholders from a variable map.
///
/// An unresolved placeholder is fatal for the run.
pub struct TemplateRenderer {
    vars: HashMap<String, String>,
    placeholder: Regex,
}

impl TemplateRenderer {
    /// Create a renderer over the given variable context.
    pub fn new(vars: HashMap<String, String>) -> DeployResult<Self> {
        let placeholder = Regex::new(r"\{\{[^{}]*\}\}")
            .map_err(|e| DeployError::config(format!("invalid placeholder pattern: {e}")))?;
        Ok(Self { vars, placeholder })
    }

    /// Render source text directly, without reading a file. `script_name` is
    /// used for error context only.
    pub fn render_str(&self, source: &str, script_name: &str) -> DeployResult<String> {
        let mut out = String::with_capacity(source.len());
        let mut last = 0;

        for found in self.placeholder.find_iter(source) {
            out.push_str(&source[last..found.start()]);

            let key = found
                .as_str()
                .trim_start_matches("{{")
                .trim_end_matches("}}")
                .trim();
            match self.vars.get(key) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(DeployError::render(
                        script_name,
                        format!("unresolved variable '{key}'"),
                    ));
                }
            }

            last = found.end();
        }
        out.push_str(&source[last..]);

        Ok(out)
    }

    /// Render a file at an arbitrary path, outside any catalog.
    pub fn render_path(&self, path: &Path) -> DeployResult<String> {
        let source = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("script");
        self.render_str(&source, name)
    }
}

impl ScriptRenderer for TemplateRenderer {
    fn render(&self, script: &ScriptDescriptor) -> DeployResult<String> {
        let source = std::fs::read_to_string(&script.path)?;
        self.render_str(&source, script.name())
    }
}
