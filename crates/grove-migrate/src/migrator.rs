//! Export/import pipeline for a single project.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::api::{ImportForm, SourceApi, TargetApi};
use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::types::{ExportStatus, GroupRef, ImportedProject, ProjectStage, SourceProject};

/// Export archive held on local disk for the duration of an upload.
///
/// The file is deleted when this value is dropped, whichever way the
/// surrounding function exits.
struct ExportArchive {
    file: NamedTempFile,
    len: u64,
}

impl ExportArchive {
    fn write(dir: Option<&Path>, data: &[u8]) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("grove-export-").suffix(".tar.gz");
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(data)?;
        file.flush()?;

        Ok(Self {
            file,
            len: data.len() as u64,
        })
    }

    fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Moves one project from the source to the target through export/import.
pub struct ProjectMigrator {
    source: Arc<dyn SourceApi>,
    target: Arc<dyn TargetApi>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    poll_interval: Duration,
    max_polls: u32,
    archive_dir: Option<PathBuf>,
}

impl ProjectMigrator {
    /// Create a new project migrator.
    pub fn new(
        source: Arc<dyn SourceApi>,
        target: Arc<dyn TargetApi>,
        config: &MigrationConfig,
    ) -> Self {
        Self {
            source,
            target,
            retry: config.retry_policy(),
            sleeper: Arc::new(TokioSleeper),
            poll_interval: config.poll_interval(),
            max_polls: config.export_max_polls,
            archive_dir: config.archive_dir.clone(),
        }
    }

    /// Replace the sleeper used for export polling and rate-limit backoff.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Export `project` from the source and import it into the target group
    /// with id `target_group_id`.
    pub async fn migrate(
        &self,
        project: &SourceProject,
        target_group_id: u64,
    ) -> Result<ImportedProject> {
        let mut stage = ProjectStage::Requested;
        let result = self.run(project, target_group_id, &mut stage).await;

        match &result {
            Ok(imported) => info!(
                project = %project.path_with_namespace,
                namespace = %imported.namespace,
                "Project imported"
            ),
            Err(e) => warn!(
                project = %project.path_with_namespace,
                %stage,
                error = %e,
                "Project migration failed"
            ),
        }

        result
    }

    async fn run(
        &self,
        project: &SourceProject,
        target_group_id: u64,
        stage: &mut ProjectStage,
    ) -> Result<ImportedProject> {
        let target_group = self
            .target
            .get_group(&GroupRef::Id(target_group_id))
            .await?
            .ok_or_else(|| {
                MigrationError::NotFound(format!(
                    "target namespace {target_group_id} is not a valid group"
                ))
            })?;

        self.source.schedule_export(project.id).await?;
        self.advance(project, stage, ProjectStage::ExportScheduled);

        self.wait_for_export(project).await?;
        self.advance(project, stage, ProjectStage::ExportFinished);

        let data = self.source.download_export(project.id).await?;
        self.advance(project, stage, ProjectStage::Downloaded);

        let archive = ExportArchive::write(self.archive_dir.as_deref(), &data)?;
        drop(data);
        debug!(
            project = %project.path_with_namespace,
            archive = %archive.path().display(),
            bytes = archive.len,
            "Export archive written"
        );

        let form = ImportForm {
            name: project.name.clone(),
            path: project.path.clone(),
            namespace: target_group.full_path.clone(),
            archive: archive.path().to_path_buf(),
        };

        self.advance(project, stage, ProjectStage::Uploading);
        let response = self
            .retry
            .execute(self.sleeper.as_ref(), || self.target.submit_import(&form))
            .await?;

        if response.status >= 300 {
            return Err(MigrationError::ImportRejected {
                status: response.status,
                body: response.body,
            });
        }

        self.advance(project, stage, ProjectStage::Imported);
        Ok(ImportedProject {
            source_path: project.path_with_namespace.clone(),
            namespace: target_group.full_path,
            path: project.path.clone(),
        })
    }

    /// Poll until the export job reports `finished`.
    async fn wait_for_export(&self, project: &SourceProject) -> Result<()> {
        for poll in 1..=self.max_polls {
            match self.source.export_status(project.id).await? {
                ExportStatus::Finished => return Ok(()),
                ExportStatus::Failed => {
                    return Err(MigrationError::ExportFailed(
                        project.path_with_namespace.clone(),
                    ))
                }
                status => {
                    debug!(project = %project.path_with_namespace, ?status, poll, "Export pending");
                    if poll < self.max_polls {
                        self.sleeper.sleep(self.poll_interval).await;
                    }
                }
            }
        }

        Err(MigrationError::ExportTimedOut {
            project: project.path_with_namespace.clone(),
            polls: self.max_polls,
        })
    }

    fn advance(&self, project: &SourceProject, stage: &mut ProjectStage, next: ProjectStage) {
        debug!(project = %project.path_with_namespace, from = %stage, to = %next, "Stage change");
        *stage = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::InstantSleeper;
    use crate::testing::{config, project, FakeSource, FakeTarget};
    use crate::types::TargetGroup;
    use tempfile::TempDir;

    struct Harness {
        source: Arc<FakeSource>,
        target: Arc<FakeTarget>,
        sleeper: Arc<InstantSleeper>,
        archive_dir: TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let target = FakeTarget::with_root(TargetGroup {
                id: 1000,
                name: "acme".to_string(),
                full_path: "acme".to_string(),
            });
            target.add_existing(TargetGroup {
                id: 1001,
                name: "platform".to_string(),
                full_path: "acme/platform".to_string(),
            });

            Self {
                source: Arc::new(FakeSource::new(Vec::new())),
                target: Arc::new(target),
                sleeper: Arc::new(InstantSleeper::new()),
                archive_dir: TempDir::new().unwrap(),
            }
        }

        fn migrator(&self) -> ProjectMigrator {
            let config = config("acme").with_archive_dir(self.archive_dir.path());
            let source: Arc<dyn SourceApi> = self.source.clone();
            let target: Arc<dyn TargetApi> = self.target.clone();
            let sleeper: Arc<dyn Sleeper> = self.sleeper.clone();
            ProjectMigrator::new(source, target, &config).with_sleeper(sleeper)
        }

        fn leftover_archives(&self) -> usize {
            std::fs::read_dir(self.archive_dir.path()).unwrap().count()
        }
    }

    #[tokio::test]
    async fn test_migrates_project_into_group_path() {
        let harness = Harness::new();
        let api = project(42, 7, "platform/api");
        harness.source.script_export(
            42,
            vec![ExportStatus::Queued, ExportStatus::Started, ExportStatus::Finished],
        );

        let imported = harness.migrator().migrate(&api, 1001).await.unwrap();

        assert_eq!(imported.namespace, "acme/platform");
        assert_eq!(harness.source.scheduled(), vec![42]);
        assert_eq!(harness.sleeper.delays(), vec![Duration::from_secs(1); 2]);

        let imports = harness.target.imports();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].form.name, "api");
        assert_eq!(imports[0].form.path, "api");
        assert_eq!(imports[0].form.namespace, "acme/platform");
        assert_eq!(imports[0].archive_bytes, Some(harness.source.archive().to_vec()));
        assert_eq!(harness.leftover_archives(), 0);
    }

    #[tokio::test]
    async fn test_unknown_target_group_fails_before_export() {
        let harness = Harness::new();
        let api = project(42, 7, "platform/api");

        let result = harness.migrator().migrate(&api, 4242).await;

        assert!(matches!(result, Err(MigrationError::NotFound(_))));
        assert!(harness.source.scheduled().is_empty());
    }

    #[tokio::test]
    async fn test_failed_export_aborts_project() {
        let harness = Harness::new();
        let api = project(42, 7, "platform/api");
        harness
            .source
            .script_export(42, vec![ExportStatus::Started, ExportStatus::Failed]);

        let result = harness.migrator().migrate(&api, 1001).await;

        assert!(matches!(result, Err(MigrationError::ExportFailed(_))));
        assert!(harness.target.imports().is_empty());
    }

    #[tokio::test]
    async fn test_status_check_error_is_not_retried() {
        let harness = Harness::new();
        let api = project(42, 7, "platform/api");
        harness.source.fail_status_checks(42);

        let result = harness.migrator().migrate(&api, 1001).await;

        assert!(matches!(result, Err(MigrationError::ApiError { .. })));
        assert!(harness.sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_export_poll_is_bounded() {
        let harness = Harness::new();
        let api = project(42, 7, "platform/api");
        harness.source.script_export(42, vec![ExportStatus::Started]);

        let mut config = config("acme").with_archive_dir(harness.archive_dir.path());
        config.export_max_polls = 3;
        let source: Arc<dyn SourceApi> = harness.source.clone();
        let target: Arc<dyn TargetApi> = harness.target.clone();
        let sleeper: Arc<dyn Sleeper> = harness.sleeper.clone();
        let migrator = ProjectMigrator::new(source, target, &config).with_sleeper(sleeper);

        let result = migrator.migrate(&api, 1001).await;

        assert!(matches!(
            result,
            Err(MigrationError::ExportTimedOut { polls: 3, .. })
        ));
        assert_eq!(harness.sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_import_retries_once() {
        let harness = Harness::new();
        let api = project(42, 7, "platform/api");
        harness.target.script_imports(vec![429, 201]);

        let imported = harness.migrator().migrate(&api, 1001).await;

        assert!(imported.is_ok());
        assert_eq!(harness.target.imports().len(), 2);
        assert_eq!(harness.sleeper.delays(), vec![Duration::from_secs(10)]);
        assert_eq!(harness.leftover_archives(), 0);
    }

    #[tokio::test]
    async fn test_rejected_import_surfaces_body_and_cleans_up() {
        let harness = Harness::new();
        let api = project(42, 7, "platform/api");
        harness.target.script_imports(vec![400]);

        let result = harness.migrator().migrate(&api, 1001).await;

        match result {
            Err(MigrationError::ImportRejected { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("400"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(harness.leftover_archives(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_rate_limit_cleans_up() {
        let harness = Harness::new();
        let api = project(42, 7, "platform/api");
        harness.target.script_imports(vec![429; 5]);

        let result = harness.migrator().migrate(&api, 1001).await;

        assert!(matches!(
            result,
            Err(MigrationError::RateLimitExhausted { attempts: 5 })
        ));
        assert_eq!(harness.target.imports().len(), 5);
        assert_eq!(harness.leftover_archives(), 0);
    }

    #[test]
    fn test_archive_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = {
            let archive = ExportArchive::write(Some(dir.path()), b"archive").unwrap();
            assert!(archive.path().exists());
            assert_eq!(archive.len, 7);
            archive.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
