//! Source and target facades used by the replicator and the migrator.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::retry::StatusCode;
use crate::types::{CreateGroup, ExportStatus, GroupRef, SourceGroup, SourceProject, TargetGroup};

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Next page number, `None` on the last page.
    pub next_page: Option<u32>,
}

/// Read side: the instance groups and projects are migrated from.
#[async_trait]
pub trait SourceApi: Send + Sync {
    async fn list_groups(&self, page: u32, per_page: u32) -> Result<Page<SourceGroup>>;

    async fn get_group(&self, path: &str) -> Result<Option<SourceGroup>>;

    /// Projects directly owned by `group_id`, subgroups excluded.
    async fn list_group_projects(
        &self,
        group_id: u64,
        page: u32,
        per_page: u32,
    ) -> Result<Page<SourceProject>>;

    async fn schedule_export(&self, project_id: u64) -> Result<()>;

    async fn export_status(&self, project_id: u64) -> Result<ExportStatus>;

    async fn download_export(&self, project_id: u64) -> Result<Bytes>;
}

/// Write side: the instance the tree is rebuilt on.
#[async_trait]
pub trait TargetApi: Send + Sync {
    async fn get_group(&self, group: &GroupRef) -> Result<Option<TargetGroup>>;

    /// Create a group. A taken path yields [`MigrationError::GroupConflict`].
    ///
    /// [`MigrationError::GroupConflict`]: crate::MigrationError::GroupConflict
    async fn create_group(&self, request: &CreateGroup) -> Result<TargetGroup>;

    /// Send one import request. Rate limiting is handled by the caller.
    async fn submit_import(&self, form: &ImportForm) -> Result<ImportResponse>;
}

/// Fields of the multipart import request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportForm {
    pub name: String,
    pub path: String,
    /// Full path of the destination group.
    pub namespace: String,
    /// Export archive on local disk, re-read for each attempt.
    pub archive: PathBuf,
}

impl ImportForm {
    /// File name sent for the archive part.
    pub fn file_name(&self) -> String {
        self.archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export.tar.gz".to_string())
    }
}

/// Raw answer of the import endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResponse {
    pub status: u16,
    pub body: String,
}

impl StatusCode for ImportResponse {
    fn status_code(&self) -> u16 {
        self.status
    }
}

/// Read every source group, following `next_page` until exhausted.
pub async fn list_all_groups<S>(source: &S, per_page: u32) -> Result<Vec<SourceGroup>>
where
    S: SourceApi + ?Sized,
{
    let mut all_groups = Vec::new();
    let mut page = 1;

    loop {
        let batch = source.list_groups(page, per_page).await?;
        all_groups.extend(batch.items);

        match batch.next_page {
            Some(next) if next > page => page = next,
            _ => break,
        }
    }

    tracing::debug!(count = all_groups.len(), "Listed source groups");
    Ok(all_groups)
}

/// Read every project directly owned by `group_id`.
pub async fn list_all_group_projects<S>(
    source: &S,
    group_id: u64,
    per_page: u32,
) -> Result<Vec<SourceProject>>
where
    S: SourceApi + ?Sized,
{
    let mut all_projects = Vec::new();
    let mut page = 1;

    loop {
        let batch = source.list_group_projects(group_id, page, per_page).await?;
        all_projects.extend(batch.items);

        match batch.next_page {
            Some(next) if next > page => page = next,
            _ => break,
        }
    }

    Ok(all_projects)
}
