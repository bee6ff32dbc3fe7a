//! Common types for migration operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Group visibility level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to members only.
    #[default]
    Private,
    /// Visible to any signed-in user.
    Internal,
    /// Visible to everyone.
    Public,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Internal => write!(f, "internal"),
            Self::Public => write!(f, "public"),
        }
    }
}

/// A group as read from the source instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGroup {
    pub id: u64,
    /// Parent group id, `0` for top-level groups.
    pub parent_id: u64,
    pub full_path: String,
    pub name: String,
    pub path: String,
    pub description: String,
    pub visibility: Visibility,
}

/// A group as returned by the target instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub id: u64,
    pub name: String,
    pub full_path: String,
}

/// A project as read from the source instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProject {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub path_with_namespace: String,
    /// Source group that owns the project.
    pub group_id: u64,
}

/// Reference to a target group, either by numeric id or by full path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupRef {
    Id(u64),
    Path(String),
}

impl std::fmt::Display for GroupRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Path(path) => write!(f, "{path}"),
        }
    }
}

/// Parameters for creating a group on the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateGroup {
    pub name: String,
    pub path: String,
    pub description: String,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
}

impl CreateGroup {
    /// Mirror a source group under the given target parent.
    pub fn mirror(group: &SourceGroup, parent_id: u64) -> Self {
        Self {
            name: group.name.clone(),
            path: group.path.clone(),
            description: group.description.clone(),
            visibility: group.visibility,
            parent_id: Some(parent_id),
        }
    }
}

/// Status of a project export job on the source instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    None,
    Queued,
    Started,
    RegenerationInProgress,
    Finished,
    Failed,
    #[serde(other)]
    Unknown,
}

impl ExportStatus {
    /// Whether the job may still reach `finished`.
    pub fn is_pending(self) -> bool {
        !matches!(self, Self::Finished | Self::Failed)
    }
}

/// Where a single project migration currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStage {
    Requested,
    ExportScheduled,
    ExportFinished,
    Downloaded,
    Uploading,
    Imported,
}

impl std::fmt::Display for ProjectStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::ExportScheduled => write!(f, "export scheduled"),
            Self::ExportFinished => write!(f, "export finished"),
            Self::Downloaded => write!(f, "downloaded"),
            Self::Uploading => write!(f, "uploading"),
            Self::Imported => write!(f, "imported"),
        }
    }
}

/// A project that was accepted by the target import endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedProject {
    pub source_path: String,
    /// Full path of the group the project was imported into.
    pub namespace: String,
    pub path: String,
}

/// Counters produced by one replication pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationSummary {
    /// Groups newly created on the target.
    pub created: usize,
    /// Groups that already existed on the target and were reused.
    pub reused: usize,
    /// Source groups merged into the target root.
    pub aliased: usize,
    /// Groups skipped as personal namespaces.
    pub skipped_personal: usize,
    /// Groups with no mapped parent.
    pub skipped_orphaned: usize,
    /// Full paths of groups that could be neither created nor found.
    pub unresolved: Vec<String>,
}

/// Report of a completed migration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Full path of the target root group.
    pub target_root: String,

    /// Number of groups read from the source.
    pub source_groups: usize,

    /// Group replication counters.
    pub groups: ReplicationSummary,

    /// Projects imported successfully.
    pub imported: Vec<ImportedProject>,

    /// Number of projects whose migration failed.
    pub projects_failed: usize,

    /// Errors encountered during migration.
    pub errors: Vec<MigrationErrorInfo>,

    /// Start time of migration.
    pub started_at: Option<DateTime<Utc>>,

    /// End time of migration.
    pub completed_at: Option<DateTime<Utc>>,
}

impl MigrationReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Mark the migration as complete.
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Check if the migration finished without any per-entity failure.
    pub fn is_successful(&self) -> bool {
        self.errors.is_empty() && self.groups.unresolved.is_empty()
    }

    /// Add an error to the report.
    pub fn add_error(&mut self, category: &str, message: &str) {
        self.errors.push(MigrationErrorInfo {
            category: category.to_string(),
            message: message.to_string(),
        });
    }

    /// Get the duration of the migration.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Print a summary of the migration.
    pub fn print_summary(&self) {
        println!("\n=== Migration Summary ===\n");
        println!("Target root:        {}", self.target_root);
        println!("Source groups:      {}", self.source_groups);
        println!("Groups created:     {}", self.groups.created);
        println!("Groups reused:      {}", self.groups.reused);
        println!("Merged into root:   {}", self.groups.aliased);
        println!(
            "Groups skipped:     {}",
            self.groups.skipped_personal + self.groups.skipped_orphaned
        );
        println!("Projects imported:  {}", self.imported.len());
        println!("Projects failed:    {}", self.projects_failed);

        if let Some(duration) = self.duration() {
            println!("\nCompleted in {} seconds", duration.num_seconds());
        }

        if !self.groups.unresolved.is_empty() {
            println!("\nUnresolved groups ({}):", self.groups.unresolved.len());
            for path in &self.groups.unresolved {
                println!("  - {path}");
            }
        }

        if !self.errors.is_empty() {
            println!("\nErrors ({}):", self.errors.len());
            for error in &self.errors {
                println!("  [{}] {}", error.category, error.message);
            }
        }

        let status = if self.is_successful() {
            "SUCCESS"
        } else {
            "COMPLETED WITH ERRORS"
        };
        println!("\nOverall Status: {status}");
    }
}

/// Information about an error that occurred during migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationErrorInfo {
    /// Category of the error (e.g., "group", "project", "listing").
    pub category: String,

    /// Error message.
    pub message: String,
}
