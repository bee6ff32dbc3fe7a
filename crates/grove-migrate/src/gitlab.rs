//! GitLab REST (v4) client implementing both facades.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::api::{ImportForm, ImportResponse, Page, SourceApi, TargetApi};
use crate::config::InstanceConfig;
use crate::error::{MigrationError, Result};
use crate::types::{
    CreateGroup, ExportStatus, GroupRef, SourceGroup, SourceProject, TargetGroup, Visibility,
};

const NEXT_PAGE_HEADER: &str = "x-next-page";
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

#[derive(Debug, Deserialize)]
struct GitLabGroup {
    id: u64,
    #[serde(default)]
    parent_id: Option<u64>,
    full_path: String,
    name: String,
    path: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    visibility: Visibility,
}

impl From<GitLabGroup> for SourceGroup {
    fn from(group: GitLabGroup) -> Self {
        Self {
            id: group.id,
            parent_id: group.parent_id.unwrap_or(0),
            full_path: group.full_path,
            name: group.name,
            path: group.path,
            description: group.description.unwrap_or_default(),
            visibility: group.visibility,
        }
    }
}

impl From<GitLabGroup> for TargetGroup {
    fn from(group: GitLabGroup) -> Self {
        Self {
            id: group.id,
            name: group.name,
            full_path: group.full_path,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    id: u64,
    name: String,
    path: String,
    path_with_namespace: String,
}

#[derive(Debug, Deserialize)]
struct GitLabExport {
    export_status: ExportStatus,
}

#[derive(Debug, Deserialize)]
struct GitLabUser {
    username: String,
}

/// Escape a full path for use as a single URL path segment.
fn encode_path(path: &str) -> String {
    path.replace('/', "%2F")
}

/// Authenticated client for one GitLab instance.
#[derive(Clone)]
pub struct GitLabClient {
    client: Client,
    base_url: String,
    token: String,
}

impl GitLabClient {
    /// Create a client for `instance`.
    pub fn new(instance: &InstanceConfig, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(&instance.url)
            .map_err(|e| MigrationError::InvalidConfig(format!("{}: {e}", instance.url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MigrationError::InvalidConfig(format!(
                "{}: expected an http(s) URL",
                instance.url
            )));
        }

        let client = Client::builder()
            .user_agent("grove-migrate")
            .timeout(timeout)
            .build()
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: instance.url.trim_end_matches('/').to_string(),
            token: instance.token.clone(),
        })
    }

    /// Instance base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Username the token belongs to.
    pub async fn current_user(&self) -> Result<String> {
        let user: GitLabUser = self.get_json("/user").await?;
        Ok(user.username)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/api/v4{path}", self.base_url);
        self.client
            .request(method, url)
            .header(TOKEN_HEADER, &self.token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| MigrationError::NetworkError(e.to_string()))
    }

    /// Map non-success statuses to errors.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 401 {
            return Err(MigrationError::AuthenticationFailed(body));
        }
        Err(MigrationError::ApiError {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| MigrationError::InvalidResponse(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path)).await?;
        Self::decode(Self::check(response).await?).await
    }

    /// GET that maps 404 to `None`.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self.send(self.request(Method::GET, path)).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(Self::check(response).await?).await.map(Some)
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Page<T>> {
        let response = self
            .send(self.request(Method::GET, path).query(query))
            .await?;
        let response = Self::check(response).await?;

        let next_page = response
            .headers()
            .get(NEXT_PAGE_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok());
        let items = Self::decode(response).await?;

        Ok(Page { items, next_page })
    }

    async fn get_group_json(&self, group: &GroupRef) -> Result<Option<GitLabGroup>> {
        let id = match group {
            GroupRef::Id(id) => id.to_string(),
            GroupRef::Path(path) => encode_path(path),
        };
        self.get_optional(&format!("/groups/{id}")).await
    }

    async fn archive_part(archive: &Path, file_name: String) -> Result<Part> {
        let file = tokio::fs::File::open(archive).await?;
        let len = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        Ok(Part::stream_with_length(body, len)
            .file_name(file_name)
            .mime_str("application/gzip")?)
    }
}

#[async_trait]
impl SourceApi for GitLabClient {
    async fn list_groups(&self, page: u32, per_page: u32) -> Result<Page<SourceGroup>> {
        let query = [
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
            ("all_available", "false".to_string()),
        ];
        let page: Page<GitLabGroup> = self.get_page("/groups", &query).await?;
        Ok(Page {
            items: page.items.into_iter().map(SourceGroup::from).collect(),
            next_page: page.next_page,
        })
    }

    async fn get_group(&self, path: &str) -> Result<Option<SourceGroup>> {
        Ok(self
            .get_group_json(&GroupRef::Path(path.to_string()))
            .await?
            .map(SourceGroup::from))
    }

    async fn list_group_projects(
        &self,
        group_id: u64,
        page: u32,
        per_page: u32,
    ) -> Result<Page<SourceProject>> {
        let query = [
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
            ("include_subgroups", "false".to_string()),
        ];
        let page: Page<GitLabProject> = self
            .get_page(&format!("/groups/{group_id}/projects"), &query)
            .await?;

        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|p| SourceProject {
                    id: p.id,
                    name: p.name,
                    path: p.path,
                    path_with_namespace: p.path_with_namespace,
                    group_id,
                })
                .collect(),
            next_page: page.next_page,
        })
    }

    async fn schedule_export(&self, project_id: u64) -> Result<()> {
        let path = format!("/projects/{project_id}/export");
        let response = self.send(self.request(Method::POST, &path)).await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn export_status(&self, project_id: u64) -> Result<ExportStatus> {
        let export: GitLabExport = self
            .get_json(&format!("/projects/{project_id}/export"))
            .await?;
        Ok(export.export_status)
    }

    async fn download_export(&self, project_id: u64) -> Result<Bytes> {
        let path = format!("/projects/{project_id}/export/download");
        let response = self.send(self.request(Method::GET, &path)).await?;
        let response = Self::check(response).await?;
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl TargetApi for GitLabClient {
    async fn get_group(&self, group: &GroupRef) -> Result<Option<TargetGroup>> {
        Ok(self.get_group_json(group).await?.map(TargetGroup::from))
    }

    async fn create_group(&self, request: &CreateGroup) -> Result<TargetGroup> {
        let response = self
            .send(self.request(Method::POST, "/groups").json(request))
            .await?;

        match response.status().as_u16() {
            400 | 409 | 422 => {
                let message = response.text().await.unwrap_or_default();
                Err(MigrationError::GroupConflict {
                    path: request.path.clone(),
                    message,
                })
            }
            _ => {
                let group: GitLabGroup = Self::decode(Self::check(response).await?).await?;
                debug!(path = %group.full_path, id = group.id, "Group created");
                Ok(group.into())
            }
        }
    }

    async fn submit_import(&self, form: &ImportForm) -> Result<ImportResponse> {
        let multipart = Form::new()
            .text("name", form.name.clone())
            .text("path", form.path.clone())
            .text("namespace", form.namespace.clone())
            .part("file", Self::archive_part(&form.archive, form.file_name()).await?);

        let response = self
            .send(self.request(Method::POST, "/projects/import").multipart(multipart))
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(ImportResponse { status, body })
    }
}
