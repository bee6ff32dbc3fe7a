//! Migration configuration.
//!
//! A [`MigrationConfig`] is built by the caller (the CLI layers a YAML file,
//! `GROVE_*` environment variables and flags) and passed by value into the
//! replicator and the migrator. Nothing here reads global state.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{MigrationError, Result};
use crate::replicator::{ExcludedPaths, NamespaceFilter, NoPersonalNamespaces, RootLayout};
use crate::retry::RetryPolicy;

/// Connection settings for one GitLab instance.
#[derive(Clone, Default, Deserialize, Serialize, Validate)]
pub struct InstanceConfig {
    /// Base URL, e.g. `https://gitlab.example.com`.
    #[validate(url)]
    pub url: String,

    /// Personal access token sent as `PRIVATE-TOKEN`.
    #[validate(length(min = 1, message = "token must not be empty"))]
    pub token: String,
}

impl std::fmt::Debug for InstanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Backoff settings for the import call.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct RetrySettings {
    #[validate(range(min = 1))]
    pub max_retries: u32,
    pub initial_delay_secs: u64,
    #[validate(range(min = 1))]
    pub multiplier: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_secs: 10,
            multiplier: 2,
        }
    }
}

/// Configuration for a migration run.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MigrationConfig {
    /// Instance groups are read from.
    #[validate(nested)]
    pub source: InstanceConfig,

    /// Instance groups are created on.
    #[validate(nested)]
    pub target: InstanceConfig,

    /// Full path of the target root group, created if missing.
    #[validate(length(min = 1, message = "target_root must not be empty"))]
    pub target_root: String,

    /// Source namespace stripped from group paths. Defaults to `target_root`.
    #[serde(default)]
    pub source_root: Option<String>,

    /// Source group path prefixes treated as personal and skipped.
    #[serde(default)]
    pub exclude_groups: Vec<String>,

    /// Page size for listings.
    #[serde(default = "default_per_page")]
    #[validate(range(min = 1, max = 100))]
    pub per_page: u32,

    /// Seconds between export status checks.
    #[serde(default = "default_poll_interval")]
    pub export_poll_interval_secs: u64,

    /// Status checks before an export is abandoned.
    #[serde(default = "default_max_polls")]
    #[validate(range(min = 1))]
    pub export_max_polls: u32,

    #[serde(default)]
    #[validate(nested)]
    pub retry: RetrySettings,

    /// Directory for temporary export archives. System temp dir if unset.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,

    /// Replicate groups only, do not move projects.
    #[serde(default)]
    pub groups_only: bool,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}

fn default_per_page() -> u32 {
    100
}

fn default_poll_interval() -> u64 {
    1
}

fn default_max_polls() -> u32 {
    3600
}

fn default_request_timeout() -> u64 {
    300
}

impl MigrationConfig {
    /// Create a configuration with defaults for everything but the endpoints.
    pub fn new(source: InstanceConfig, target: InstanceConfig, target_root: impl Into<String>) -> Self {
        Self {
            source,
            target,
            target_root: target_root.into(),
            source_root: None,
            exclude_groups: Vec::new(),
            per_page: default_per_page(),
            export_poll_interval_secs: default_poll_interval(),
            export_max_polls: default_max_polls(),
            retry: RetrySettings::default(),
            archive_dir: None,
            groups_only: false,
            request_timeout_secs: default_request_timeout(),
        }
    }

    /// Set the source root namespace.
    pub fn with_source_root(mut self, root: impl Into<String>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    /// Skip source groups under the given path prefix.
    pub fn with_excluded_group(mut self, prefix: impl Into<String>) -> Self {
        self.exclude_groups.push(prefix.into());
        self
    }

    /// Store temporary archives in `dir`.
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    /// Enable or disable project migration.
    pub fn with_groups_only(mut self, groups_only: bool) -> Self {
        self.groups_only = groups_only;
        self
    }

    /// Check field constraints, returning the config unchanged on success.
    pub fn validated(self) -> Result<Self> {
        self.validate()
            .map_err(|e| MigrationError::InvalidConfig(e.to_string()))?;

        let root = self.target_root.trim_matches('/');
        if root.is_empty() || root != self.target_root {
            return Err(MigrationError::InvalidConfig(format!(
                "target_root must be a group path without leading or trailing '/': {:?}",
                self.target_root
            )));
        }

        Ok(self)
    }

    /// Source namespace stripped from group paths.
    pub fn source_root(&self) -> &str {
        self.source_root.as_deref().unwrap_or(&self.target_root)
    }

    pub fn root_layout(&self) -> RootLayout {
        RootLayout::new(self.source_root(), &self.target_root)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_secs(self.retry.initial_delay_secs),
            self.retry.multiplier,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.export_poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Personal-namespace classification derived from `exclude_groups`.
    pub fn namespace_filter(&self) -> Box<dyn NamespaceFilter> {
        if self.exclude_groups.is_empty() {
            Box::new(NoPersonalNamespaces)
        } else {
            Box::new(ExcludedPaths::new(self.exclude_groups.clone()))
        }
    }
}
