//! In-memory facades shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::api::{ImportForm, ImportResponse, Page, SourceApi, TargetApi};
use crate::config::{InstanceConfig, MigrationConfig};
use crate::error::{MigrationError, Result};
use crate::types::{
    CreateGroup, ExportStatus, GroupRef, SourceGroup, SourceProject, TargetGroup, Visibility,
};

pub fn config(target_root: &str) -> MigrationConfig {
    let instance = |url: &str| InstanceConfig {
        url: url.to_string(),
        token: "token".to_string(),
    };
    MigrationConfig::new(
        instance("https://source.example.com"),
        instance("https://target.example.com"),
        target_root,
    )
}

/// Source group whose name and path are the last segment of `full_path`.
pub fn group(id: u64, parent_id: u64, full_path: &str) -> SourceGroup {
    let path = full_path.rsplit('/').next().unwrap_or(full_path).to_string();
    SourceGroup {
        id,
        parent_id,
        full_path: full_path.to_string(),
        name: path.clone(),
        path,
        description: String::new(),
        visibility: Visibility::Private,
    }
}

pub fn project(id: u64, group_id: u64, path_with_namespace: &str) -> SourceProject {
    let path = path_with_namespace
        .rsplit('/')
        .next()
        .unwrap_or(path_with_namespace)
        .to_string();
    SourceProject {
        id,
        name: path.clone(),
        path,
        path_with_namespace: path_with_namespace.to_string(),
        group_id,
    }
}

#[derive(Default)]
struct SourceState {
    exports: HashMap<u64, VecDeque<ExportStatus>>,
    scheduled: Vec<u64>,
    listed: Vec<u64>,
    failing_status: HashSet<u64>,
    failing_listing: HashSet<u64>,
}

/// Source facade backed by fixed groups and projects.
pub struct FakeSource {
    groups: Vec<SourceGroup>,
    projects: Mutex<HashMap<u64, Vec<SourceProject>>>,
    archive: Bytes,
    state: Mutex<SourceState>,
}

impl FakeSource {
    pub fn new(groups: Vec<SourceGroup>) -> Self {
        Self {
            groups,
            projects: Mutex::new(HashMap::new()),
            archive: Bytes::from_static(b"\x1f\x8bfake-export-archive"),
            state: Mutex::new(SourceState::default()),
        }
    }

    pub fn add_project(&self, project: SourceProject) {
        self.projects
            .lock()
            .entry(project.group_id)
            .or_default()
            .push(project);
    }

    /// Statuses returned by successive checks; the last one repeats.
    pub fn script_export(&self, project_id: u64, statuses: Vec<ExportStatus>) {
        self.state.lock().exports.insert(project_id, statuses.into());
    }

    pub fn fail_status_checks(&self, project_id: u64) {
        self.state.lock().failing_status.insert(project_id);
    }

    pub fn fail_project_listing(&self, group_id: u64) {
        self.state.lock().failing_listing.insert(group_id);
    }

    /// Group ids whose projects were requested, once per page.
    pub fn listed(&self) -> Vec<u64> {
        self.state.lock().listed.clone()
    }

    pub fn scheduled(&self) -> Vec<u64> {
        self.state.lock().scheduled.clone()
    }

    pub fn archive(&self) -> Bytes {
        self.archive.clone()
    }
}

fn paginate<T: Clone>(items: &[T], page: u32, per_page: u32) -> Page<T> {
    let per_page = per_page.max(1) as usize;
    let start = (page.max(1) as usize - 1) * per_page;
    let end = (start + per_page).min(items.len());
    let slice = items.get(start..end).unwrap_or_default().to_vec();
    let next_page = (end < items.len()).then_some(page + 1);
    Page {
        items: slice,
        next_page,
    }
}

#[async_trait]
impl SourceApi for FakeSource {
    async fn list_groups(&self, page: u32, per_page: u32) -> Result<Page<SourceGroup>> {
        Ok(paginate(&self.groups, page, per_page))
    }

    async fn get_group(&self, path: &str) -> Result<Option<SourceGroup>> {
        Ok(self.groups.iter().find(|g| g.full_path == path).cloned())
    }

    async fn list_group_projects(
        &self,
        group_id: u64,
        page: u32,
        per_page: u32,
    ) -> Result<Page<SourceProject>> {
        let mut state = self.state.lock();
        state.listed.push(group_id);
        if state.failing_listing.contains(&group_id) {
            return Err(MigrationError::ApiError {
                status: 500,
                body: "listing failed".to_string(),
            });
        }
        drop(state);
        let projects = self.projects.lock().get(&group_id).cloned().unwrap_or_default();
        Ok(paginate(&projects, page, per_page))
    }

    async fn schedule_export(&self, project_id: u64) -> Result<()> {
        self.state.lock().scheduled.push(project_id);
        Ok(())
    }

    async fn export_status(&self, project_id: u64) -> Result<ExportStatus> {
        let mut state = self.state.lock();
        if state.failing_status.contains(&project_id) {
            return Err(MigrationError::ApiError {
                status: 500,
                body: "status unavailable".to_string(),
            });
        }
        let Some(queue) = state.exports.get_mut(&project_id) else {
            return Ok(ExportStatus::Finished);
        };
        let status = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        Ok(status.unwrap_or(ExportStatus::Finished))
    }

    async fn download_export(&self, _project_id: u64) -> Result<Bytes> {
        Ok(self.archive.clone())
    }
}

/// Import request as seen by [`FakeTarget`].
#[derive(Debug, Clone)]
pub struct RecordedImport {
    pub form: ImportForm,
    /// Archive contents at submission time, `None` if the file was missing.
    pub archive_bytes: Option<Vec<u8>>,
}

#[derive(Default)]
struct TargetState {
    groups: HashMap<u64, TargetGroup>,
    next_id: u64,
    created: Vec<CreateGroup>,
    failing: HashSet<String>,
    import_statuses: VecDeque<u16>,
    imports: Vec<RecordedImport>,
}

/// Target facade that keeps groups in memory.
pub struct FakeTarget {
    state: Mutex<TargetState>,
}

impl FakeTarget {
    pub fn with_root(root: TargetGroup) -> Self {
        let mut state = TargetState {
            next_id: 5000,
            ..Default::default()
        };
        state.groups.insert(root.id, root);
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn add_existing(&self, group: TargetGroup) {
        self.state.lock().groups.insert(group.id, group);
    }

    /// Creation of a group with this path fails with a server error.
    pub fn fail_creation_of(&self, path: &str) {
        self.state.lock().failing.insert(path.to_string());
    }

    /// Statuses answered by successive imports; 201 once exhausted.
    pub fn script_imports(&self, statuses: Vec<u16>) {
        self.state.lock().import_statuses = statuses.into();
    }

    /// Successful creations, in order.
    pub fn created(&self) -> Vec<CreateGroup> {
        self.state.lock().created.clone()
    }

    pub fn imports(&self) -> Vec<RecordedImport> {
        self.state.lock().imports.clone()
    }

    pub fn group_by_path(&self, full_path: &str) -> Option<TargetGroup> {
        self.state
            .lock()
            .groups
            .values()
            .find(|g| g.full_path == full_path)
            .cloned()
    }
}

#[async_trait]
impl TargetApi for FakeTarget {
    async fn get_group(&self, group: &GroupRef) -> Result<Option<TargetGroup>> {
        let state = self.state.lock();
        Ok(match group {
            GroupRef::Id(id) => state.groups.get(id).cloned(),
            GroupRef::Path(path) => state.groups.values().find(|g| &g.full_path == path).cloned(),
        })
    }

    async fn create_group(&self, request: &CreateGroup) -> Result<TargetGroup> {
        let mut state = self.state.lock();
        if state.failing.contains(&request.path) {
            return Err(MigrationError::ApiError {
                status: 500,
                body: "internal error".to_string(),
            });
        }

        let full_path = match request.parent_id.and_then(|id| state.groups.get(&id)) {
            Some(parent) => format!("{}/{}", parent.full_path, request.path),
            None => request.path.clone(),
        };
        if state.groups.values().any(|g| g.full_path == full_path) {
            return Err(MigrationError::GroupConflict {
                path: full_path,
                message: "has already been taken".to_string(),
            });
        }

        state.next_id += 1;
        let group = TargetGroup {
            id: state.next_id,
            name: request.name.clone(),
            full_path,
        };
        state.groups.insert(group.id, group.clone());
        state.created.push(request.clone());
        Ok(group)
    }

    async fn submit_import(&self, form: &ImportForm) -> Result<ImportResponse> {
        let archive_bytes = std::fs::read(&form.archive).ok();
        let mut state = self.state.lock();
        state.imports.push(RecordedImport {
            form: form.clone(),
            archive_bytes,
        });
        let status = state.import_statuses.pop_front().unwrap_or(201);
        Ok(ImportResponse {
            status,
            body: format!("status {status}"),
        })
    }
}
