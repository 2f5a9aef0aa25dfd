use std::{fs, io, path::Path};

use chrono::{DateTime, Utc};
use reqwest::{
    StatusCode,
    blocking::{Body, Client, RequestBuilder},
    header::{CONTENT_TYPE, LOCATION},
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::config::CloudConfig;

use super::{BackendFailure, ContainerId, Entry, StorageBackend, StorageError, StorageSession};

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, createdTime, modifiedTime)";
const PAGE_SIZE: &str = "1000";

/// Backups in a cloud drive, one folder per dataset under a root folder.
///
/// Every operation is an independent authorized request, no connection state is held.
#[derive(Debug)]
pub struct CloudBackend {
    config: CloudConfig,
    client: Client,
    token: String,
}

impl CloudBackend {
    /// A backend using the access token stored in the configured token file.
    pub fn new(config: CloudConfig) -> Result<Self, CreateCloudBackendError> {
        let token = fs::read_to_string(&config.token_file)
            .map_err(CreateCloudBackendError::ReadToken)?
            .trim()
            .to_string();

        Self::with_token(config, token)
    }

    /// A backend using an already authorized access token.
    pub fn with_token(config: CloudConfig, token: String) -> Result<Self, CreateCloudBackendError> {
        if token.is_empty() {
            return Err(CreateCloudBackendError::EmptyToken);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(CreateCloudBackendError::CreateClient)?;

        Ok(Self {
            config,
            client,
            token,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{path}", self.config.api_url))
            .bearer_auth(&self.token)
            .query(&[("supportsAllDrives", "true")])
    }

    /// All files matching `query`, following pagination.
    fn list(&self, query: &str) -> Result<Vec<DriveFile>, reqwest::Error> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.get("/files").query(&[
                ("q", query),
                ("fields", LIST_FIELDS),
                ("pageSize", PAGE_SIZE),
                ("includeItemsFromAllDrives", "true"),
            ]);
            if let Some(page_token) = &page_token {
                request = request.query(&[("pageToken", page_token.as_str())]);
            }

            let page: FileList = request.send()?.error_for_status()?.json()?;
            files.extend(page.files);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(files)
    }

    fn create_folder(&self, name: &str, parent: &str) -> Result<String, reqwest::Error> {
        let created: CreatedFile = self
            .client
            .post(format!("{}/files", self.config.api_url))
            .bearer_auth(&self.token)
            .query(&[("supportsAllDrives", "true"), ("fields", "id")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": [parent],
            }))
            .send()?
            .error_for_status()?
            .json()?;

        Ok(created.id)
    }

    fn upload(&self, local_path: &Path, folder: &str, name: &str) -> Result<(), BackendFailure> {
        let file = fs::File::open(local_path)?;
        let length = file.metadata()?.len();

        // Start a resumable upload session with the file's metadata.
        let session = self
            .client
            .post(format!("{}/files", self.config.upload_url))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "resumable"), ("supportsAllDrives", "true")])
            .header("X-Upload-Content-Type", "application/octet-stream")
            .header("X-Upload-Content-Length", length.to_string())
            .json(&json!({
                "name": name,
                "parents": [folder],
            }))
            .send()?
            .error_for_status()?;

        let location = session
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                BackendFailure::Unexpected("Upload session had no location".to_string())
            })?
            .to_string();

        // Send the whole file in one request.
        self.client
            .put(location)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::sized(file, length))
            .send()?
            .error_for_status()?;

        Ok(())
    }
}

impl StorageBackend for CloudBackend {
    fn name(&self) -> &str {
        "cloud"
    }

    fn open(&self) -> Result<Box<dyn StorageSession + '_>, StorageError> {
        Ok(Box::new(CloudSession { backend: self }))
    }
}

struct CloudSession<'a> {
    backend: &'a CloudBackend,
}

impl StorageSession for CloudSession<'_> {
    fn root(&self) -> ContainerId {
        ContainerId(self.backend.config.root_folder_id.clone())
    }

    fn list_containers(&mut self, parent: &ContainerId) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self
            .backend
            .list(&children_query(&parent.0, true))
            .map_err(|e| {
                classify(e, |failure| StorageError::ListFailed(parent.0.clone(), failure))
            })?
            .into_iter()
            .map(|folder| folder.name)
            .collect();
        names.sort();

        Ok(names)
    }

    fn list_entries(&mut self, container: &ContainerId) -> Result<Vec<Entry>, StorageError> {
        let entries = self
            .backend
            .list(&children_query(&container.0, false))
            .map_err(|e| {
                classify(e, |failure| StorageError::ListFailed(container.0.clone(), failure))
            })?
            .into_iter()
            .map(|file| Entry {
                modified: file.created_time.or(file.modified_time),
                name: file.name,
                id: file.id,
            })
            .collect();

        Ok(entries)
    }

    fn ensure_container(
        &mut self,
        name: &str,
        parent: &ContainerId,
    ) -> Result<ContainerId, StorageError> {
        let failed = |error: reqwest::Error| {
            classify(error, |failure| {
                StorageError::EnsureContainerFailed(name.to_string(), failure)
            })
        };

        // Folder names are not unique, so look before creating.
        let existing = self
            .backend
            .list(&folder_query(name, &parent.0))
            .map_err(failed)?;

        if let Some(folder) = existing.into_iter().next() {
            return Ok(ContainerId(folder.id));
        }

        let id = self.backend.create_folder(name, &parent.0).map_err(failed)?;
        info!("Created folder '{name}' with id {id}");

        Ok(ContainerId(id))
    }

    fn delete(&mut self, entry: &Entry) -> Result<(), StorageError> {
        self.backend
            .client
            .delete(format!("{}/files/{}", self.backend.config.api_url, entry.id))
            .bearer_auth(&self.backend.token)
            .query(&[("supportsAllDrives", "true")])
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                classify(e, |failure| {
                    StorageError::DeleteFailed(entry.name.clone(), failure)
                })
            })?;

        Ok(())
    }

    fn put(
        &mut self,
        local_path: &Path,
        container: &ContainerId,
        name: &str,
    ) -> Result<(), StorageError> {
        self.backend
            .upload(local_path, &container.0, name)
            .map_err(|failure| match failure {
                BackendFailure::Http(error) => classify(error, |failure| {
                    StorageError::UploadFailed(local_path.to_path_buf(), name.to_string(), failure)
                }),
                failure => {
                    StorageError::UploadFailed(local_path.to_path_buf(), name.to_string(), failure)
                }
            })
    }
}

/// Connection failures, timeouts and a rejected token make the whole backend unavailable.
///
/// A 403 is per item: the drive uses it for missing file permissions and rate limits.
fn classify(
    error: reqwest::Error,
    otherwise: impl FnOnce(BackendFailure) -> StorageError,
) -> StorageError {
    let unavailable = error.is_connect()
        || error.is_timeout()
        || error.status() == Some(StatusCode::UNAUTHORIZED);

    if unavailable {
        StorageError::Unavailable(error.into())
    } else {
        otherwise(error.into())
    }
}

/// Escape a value for use inside a single quoted query literal.
fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Query for the folder called `name` directly inside `parent`.
fn folder_query(name: &str, parent: &str) -> String {
    format!(
        "mimeType = '{FOLDER_MIME_TYPE}' and name = '{}' and '{}' in parents and trashed = false",
        escape_literal(name),
        escape_literal(parent)
    )
}

/// Query for the folders, or the non-folders, directly inside `parent`.
fn children_query(parent: &str, folders: bool) -> String {
    let comparison = if folders { "=" } else { "!=" };
    format!(
        "'{}' in parents and trashed = false and mimeType {comparison} '{FOLDER_MIME_TYPE}'",
        escape_literal(parent)
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    created_time: Option<DateTime<Utc>>,
    modified_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum CreateCloudBackendError {
    #[error("Failed to read the token file:\n{0}")]
    ReadToken(#[source] io::Error),

    #[error("The token file was empty")]
    EmptyToken,

    #[error("Failed to create the HTTP client:\n{0}")]
    CreateClient(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::{FileList, children_query, escape_literal, folder_query};

    #[test]
    fn escape() {
        assert_eq!(escape_literal("it's"), "it\\'s");
        assert_eq!(escape_literal("a\\b"), "a\\\\b");
    }

    #[test]
    fn folder() {
        assert_eq!(
            folder_query("orders", "root-id"),
            "mimeType = 'application/vnd.google-apps.folder' and name = 'orders' \
             and 'root-id' in parents and trashed = false"
        );
    }

    #[test]
    fn children() {
        assert_eq!(
            children_query("folder-id", false),
            "'folder-id' in parents and trashed = false \
             and mimeType != 'application/vnd.google-apps.folder'"
        );
        assert!(
            children_query("folder-id", true)
                .ends_with("mimeType = 'application/vnd.google-apps.folder'")
        );
    }

    #[test]
    fn file_list() {
        let body = r#"{
            "nextPageToken": "next",
            "files": [
                {
                    "id": "1",
                    "name": "orders_20240309_070501.sql",
                    "mimeType": "application/octet-stream",
                    "createdTime": "2024-03-09T07:05:02.000Z"
                },
                { "id": "2", "name": "orders_unknown.sql" }
            ]
        }"#;

        let list: FileList = serde_json::from_str(body).unwrap();
        assert_eq!(list.next_page_token.as_deref(), Some("next"));
        assert_eq!(list.files.len(), 2);

        let first = list.files.first().unwrap();
        assert_eq!(first.id, "1");
        assert_eq!(first.created_time.unwrap().timestamp(), 1_709_967_902);

        let second = list.files.get(1).unwrap();
        assert!(second.created_time.is_none());
    }

    #[test]
    fn empty_file_list() {
        let list: FileList = serde_json::from_str("{}").unwrap();
        assert!(list.files.is_empty());
        assert!(list.next_page_token.is_none());
    }
}
