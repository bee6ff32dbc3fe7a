//! # Grove Migration Library
//!
//! Moves a GitLab organization from one instance to another: the group
//! hierarchy is rebuilt under a chosen root group on the target, then every
//! project is carried over through GitLab's export/import archives.
//!
//! ## Features
//!
//! - **Group replication**: Parent-before-child creation with reuse of groups that already exist
//! - **Project migration**: Export, download, and multipart import with rate-limit backoff
//! - **Root aliasing**: A source group standing for the root merges into it instead of nesting
//! - **Progress Tracking**: Phase and item progress for console reporting
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use grove_migrate::{GitLabClient, InstanceConfig, Migration, MigrationConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MigrationConfig::new(
//!         InstanceConfig { url: "https://old.example.com".into(), token: "glpat-src".into() },
//!         InstanceConfig { url: "https://new.example.com".into(), token: "glpat-dst".into() },
//!         "acme",
//!     );
//!
//!     let source = Arc::new(GitLabClient::new(&config.source, config.request_timeout())?);
//!     let target = Arc::new(GitLabClient::new(&config.target, config.request_timeout())?);
//!
//!     let report = Migration::new(source, target, config)?.run().await?;
//!     report.print_summary();
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod gitlab;
pub mod mapping;
pub mod migration;
pub mod migrator;
pub mod progress;
pub mod replicator;
pub mod retry;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types
pub use api::{ImportForm, ImportResponse, Page, SourceApi, TargetApi};
pub use config::{InstanceConfig, MigrationConfig, RetrySettings};
pub use error::{MigrationError, Result};
pub use gitlab::GitLabClient;
pub use mapping::{GroupMapping, MappedGroup};
pub use migration::{ensure_target_root, Migration};
pub use migrator::ProjectMigrator;
pub use progress::{ConsoleProgressReporter, MigrationPhase, MigrationProgress, ProgressCallback};
pub use replicator::{
    plan_tree, ExcludedPaths, GroupTreeReplicator, NamespaceFilter, NoPersonalNamespaces,
    PlannedAction, PlannedGroup, RootLayout,
};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use types::*;

/// Version of the migration library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
