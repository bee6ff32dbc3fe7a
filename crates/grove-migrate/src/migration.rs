//! End-to-end migration run: root resolution, group replication, projects.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{list_all_group_projects, list_all_groups, SourceApi, TargetApi};
use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};
use crate::mapping::GroupMapping;
use crate::migrator::ProjectMigrator;
use crate::progress::{MigrationPhase, MigrationProgress};
use crate::replicator::GroupTreeReplicator;
use crate::retry::Sleeper;
use crate::types::{CreateGroup, GroupRef, MigrationReport, SourceGroup, TargetGroup, Visibility};

/// A configured migration between two instances.
pub struct Migration {
    source: Arc<dyn SourceApi>,
    target: Arc<dyn TargetApi>,
    config: MigrationConfig,
    replicator: GroupTreeReplicator,
    migrator: ProjectMigrator,
    progress: MigrationProgress,
}

impl Migration {
    /// Create a migration. The config is validated first.
    pub fn new(
        source: Arc<dyn SourceApi>,
        target: Arc<dyn TargetApi>,
        config: MigrationConfig,
    ) -> Result<Self> {
        let config = config.validated()?;
        let replicator = GroupTreeReplicator::new(target.clone(), &config);
        let migrator = ProjectMigrator::new(source.clone(), target.clone(), &config);

        Ok(Self {
            source,
            target,
            config,
            replicator,
            migrator,
            progress: MigrationProgress::new(),
        })
    }

    /// Set a progress tracker.
    pub fn with_progress(mut self, progress: MigrationProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the sleeper used by the project pipeline.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.migrator = self.migrator.with_sleeper(sleeper);
        self
    }

    /// Run the migration.
    ///
    /// Errors are returned only for startup failures (target root, source
    /// group listing). Per-group and per-project failures are recorded in
    /// the report.
    pub async fn run(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::new();

        self.progress.set_phase(MigrationPhase::ResolvingRoot, 1);
        let root = ensure_target_root(self.target.as_ref(), &self.config.target_root).await?;
        info!(root = %root.full_path, id = root.id, "Target group created/retrieved");
        report.target_root = root.full_path.clone();

        self.progress.set_phase(MigrationPhase::ListingGroups, 1);
        let groups = list_all_groups(self.source.as_ref(), self.config.per_page).await?;
        report.source_groups = groups.len();

        self.progress.set_phase(MigrationPhase::ReplicatingGroups, 1);
        let mut mapping = GroupMapping::new(&root);
        report.groups = self.replicator.replicate(&groups, &mut mapping).await;
        self.progress.increment(None);

        let unresolved = report.groups.unresolved.clone();
        for path in &unresolved {
            report.add_error("group", &format!("{path}: could not be created or found"));
        }

        if self.config.groups_only {
            info!("Group-only run, skipping projects");
        } else {
            self.migrate_projects(&groups, &mapping, &mut report).await;
        }

        self.progress.set_phase(MigrationPhase::Complete, 1);
        report.complete();
        Ok(report)
    }

    async fn migrate_projects(
        &self,
        groups: &[SourceGroup],
        mapping: &GroupMapping,
        report: &mut MigrationReport,
    ) {
        self.progress.set_phase(MigrationPhase::MigratingProjects, 0);
        let filter = self.replicator.filter();

        for group in groups {
            if filter.is_personal(group) {
                continue;
            }
            let Some(target_group) = mapping.get(group.id) else {
                debug!(group = %group.full_path, "Group has no target, skipping its projects");
                continue;
            };

            let projects =
                match list_all_group_projects(self.source.as_ref(), group.id, self.config.per_page)
                    .await
                {
                    Ok(projects) => projects,
                    Err(e) => {
                        warn!(group = %group.full_path, error = %e, "Failed to get projects");
                        report.add_error("listing", &format!("{}: {e}", group.full_path));
                        continue;
                    }
                };

            self.progress.add_total(projects.len() as u64);
            for project in &projects {
                self.progress.message(&project.path_with_namespace);
                match self.migrator.migrate(project, target_group.target_id).await {
                    Ok(imported) => report.imported.push(imported),
                    Err(e) => {
                        report.projects_failed += 1;
                        report.add_error(
                            "project",
                            &format!("{}: {e}", project.path_with_namespace),
                        );
                    }
                }
                self.progress.increment(Some(&project.path_with_namespace));
            }
        }
    }
}

/// Get the target root group by path, creating it when missing.
///
/// For a nested path the parent must already exist.
pub async fn ensure_target_root<T>(target: &T, path: &str) -> Result<TargetGroup>
where
    T: TargetApi + ?Sized,
{
    if let Some(group) = target.get_group(&GroupRef::Path(path.to_string())).await? {
        return Ok(group);
    }

    let (parent_path, name) = match path.rsplit_once('/') {
        Some((parent, name)) => (Some(parent), name),
        None => (None, path),
    };

    let parent_id = match parent_path {
        Some(parent_path) => {
            let parent = target
                .get_group(&GroupRef::Path(parent_path.to_string()))
                .await?
                .ok_or_else(|| {
                    MigrationError::NotFound(format!("failed to get parent group {parent_path}"))
                })?;
            Some(parent.id)
        }
        None => None,
    };

    target
        .create_group(&CreateGroup {
            name: name.to_string(),
            path: name.to_string(),
            description: String::new(),
            visibility: Visibility::Private,
            parent_id,
        })
        .await
}
