//! # strata-deploy
//!
//! Deployment engine for Strata.
//!
//! This crate provides functionality for:
//! - Discovering SQL change scripts on the filesystem and parsing their
//!   filenames into typed, ordered identifiers
//! - Checksum-based change detection over rendered script content
//! - The apply / skip / warn-drift decision procedure for versioned,
//!   repeatable, and always-run scripts
//! - Change-history bookkeeping through a pluggable database session
//! - Run orchestration with optional pre/post hooks
//!
//! ## Architecture
//!
//! Scripts are version-controlled as plain files and replayed
//! deterministically: versioned scripts apply exactly once, repeatable
//! scripts re-apply when their content checksum changes, always scripts
//! apply on every run. Applied state is tracked in a change-history table
//! inside the target database itself.
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Script Root  │────▶│ Catalog        │────▶│ Renderer    │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                              │                     │
//!                              ▼                     ▼
//!                      ┌────────────────┐     ┌─────────────┐
//!                      │ Reconciliation │◀────│ Checksum    │
//!                      └────────────────┘     └─────────────┘
//!                              │
//!                              ▼
//!                      ┌────────────────┐     ┌─────────────┐
//!                      │ Session        │────▶│ History Tbl │
//!                      └────────────────┘     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_deploy::{DeployConfig, Deployment, TemplateRenderer};
//!
//! async fn run_deploy() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DeployConfig::new()
//!         .root_folder("./scripts")
//!         .create_history_table(true);
//!
//!     let renderer = TemplateRenderer::new(Default::default())?;
//!     let session = /* your DatabaseSession implementation */;
//!
//!     let deployment = Deployment::new(config, session, renderer);
//!     let report = deployment.run().await?;
//!     println!("{}", report.summary());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Script naming
//!
//! ```text
//! scripts/
//! ├── V1.1__initial_tables.sql     # versioned: applied at most once ever
//! ├── V1.2__add_orders.sql
//! ├── R__current_orders_view.sql   # repeatable: applied on checksum change
//! └── A__session_grants.sql        # always: applied every run
//! ```

pub mod catalog;
pub mod checksum;
pub mod engine;
pub mod error;
pub mod history;
pub mod render;
pub mod session;
pub mod sortkey;

// Re-exports
pub use catalog::{ScriptDescriptor, ScriptIdentifier, ScriptKind, deployment_order, discover};
pub use checksum::script_checksum;
pub use engine::{DeployConfig, DeployReport, Deployment, DriftObservation, Hook, RunHooks};
pub use error::{DeployError, DeployResult};
pub use history::{AppliedScriptRecord, HistorySnapshot, HistoryTable};
pub use render::{ScriptRenderer, TemplateRenderer};
pub use session::{DatabaseSession, MemorySession};
pub use sortkey::{KeyPart, alphanum_key, version_cmp};
