//! Error types for the deployment engine.

use thiserror::Error;

/// Result type alias for deployment operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that can occur during a deployment run.
#[derive(Debug, Error)]
pub enum DeployError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Script discovery failed (bad root, empty catalog, duplicate names).
    #[error("Script discovery failed: {0}")]
    Discovery(String),

    /// Template rendering failed for a script.
    #[error("Failed to render script '{script}': {reason}")]
    Render {
        /// Canonical script name.
        script: String,
        /// What went wrong.
        reason: String,
    },

    /// Applying a change script failed. Halts the run; everything already
    /// recorded in the change history stays recorded.
    #[error("Failed to apply script '{script}': {source}")]
    Apply {
        /// Canonical script name.
        script: String,
        /// Script version, when the script is versioned.
        version: Option<String>,
        /// The underlying session error.
        #[source]
        source: Box<DeployError>,
    },

    /// Database session error.
    #[error("Database session error: {0}")]
    Session(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pre- or post-run hook failed.
    #[error("Hook '{name}' failed: {source}")]
    Hook {
        /// Registered hook name.
        name: String,
        /// The hook's own error.
        #[source]
        source: Box<DeployError>,
    },
}

impl DeployError {
    /// Create a discovery error.
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create a render error.
    pub fn render(script: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Render {
            script: script.into(),
            reason: reason.into(),
        }
    }

    /// Create a session error.
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap a session failure with the script it occurred on.
    pub fn apply(script: impl Into<String>, version: Option<String>, source: DeployError) -> Self {
        Self::Apply {
            script: script.into(),
            version,
            source: Box::new(source),
        }
    }
}
