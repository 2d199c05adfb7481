//! Object storage collaborator (Supabase-style storage REST API)
//!
//! Usage accounting has no dedicated endpoint, so objects are enumerated page
//! by page, descending into folders, and their `metadata.size` summed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use super::http::{auth_header, build_client, ensure_success, join_url};
use super::DependencyError;
use crate::config::{defaults, AuthScheme};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Full path inside the bucket
    pub path: String,
    /// `None` when the object has no readable metadata
    pub size: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Zero-byte marker Supabase keeps in otherwise empty folders.
pub const FOLDER_PLACEHOLDER: &str = ".emptyFolderPlaceholder";

impl StoredObject {
    pub fn is_folder_placeholder(&self) -> bool {
        self.path.rsplit('/').next() == Some(FOLDER_PLACEHOLDER)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, DependencyError>;

    /// Every object under `prefix`, up to `max_objects`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max_objects: usize,
    ) -> Result<Vec<StoredObject>, DependencyError>;

    /// Delete `paths`; returns how many the store reported as removed.
    async fn delete_objects(&self, bucket: &str, paths: &[String]) -> Result<usize, DependencyError>;
}

#[derive(Debug, Deserialize)]
struct BucketEntry {
    name: String,
    #[serde(default)]
    public: bool,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    /// Folders are returned with a null id
    id: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    metadata: Option<EntryMetadata>,
}

#[derive(Debug, Deserialize)]
struct EntryMetadata {
    size: Option<u64>,
}

pub struct StorageRestClient {
    http: reqwest::Client,
    api_base: String,
}

impl StorageRestClient {
    pub fn new(base_url: &str, service_key: &str, timeout_ms: u64) -> Result<Self, DependencyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            auth_header(AuthScheme::Bearer, service_key)?,
        );
        let mut apikey = HeaderValue::from_str(service_key.trim())
            .map_err(|_| DependencyError::Unauthorized("storage key contains invalid characters".into()))?;
        apikey.set_sensitive(true);
        headers.insert(HeaderName::from_static("apikey"), apikey);
        Ok(Self {
            http: build_client(timeout_ms, headers)?,
            api_base: join_url(base_url, "storage/v1"),
        })
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        offset: usize,
    ) -> Result<Vec<ListEntry>, DependencyError> {
        let response = self
            .http
            .post(join_url(&self.api_base, &format!("object/list/{bucket}")))
            .json(&json!({
                "prefix": prefix,
                "limit": defaults::STORAGE_LIST_PAGE_SIZE,
                "offset": offset,
                "sortBy": { "column": "name", "order": "asc" },
            }))
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

#[async_trait]
impl ObjectStore for StorageRestClient {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, DependencyError> {
        let response = self.http.get(join_url(&self.api_base, "bucket")).send().await?;
        let entries: Vec<BucketEntry> = ensure_success(response).await?.json().await?;
        Ok(entries
            .into_iter()
            .map(|b| BucketInfo {
                name: b.name,
                public: b.public,
            })
            .collect())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max_objects: usize,
    ) -> Result<Vec<StoredObject>, DependencyError> {
        let mut objects = Vec::new();
        let mut folders = vec![prefix.trim_matches('/').to_string()];

        while let Some(folder) = folders.pop() {
            let mut offset = 0;
            loop {
                let page = self.list_page(bucket, &folder, offset).await?;
                let page_len = page.len();
                for entry in page {
                    let path = if folder.is_empty() {
                        entry.name.clone()
                    } else {
                        format!("{folder}/{}", entry.name)
                    };
                    if entry.id.is_none() {
                        folders.push(path);
                        continue;
                    }
                    objects.push(StoredObject {
                        path,
                        size: entry.metadata.and_then(|m| m.size),
                        updated_at: entry.updated_at,
                    });
                    if objects.len() >= max_objects {
                        return Ok(objects);
                    }
                }
                if page_len < defaults::STORAGE_LIST_PAGE_SIZE {
                    break;
                }
                offset += page_len;
            }
        }
        Ok(objects)
    }

    async fn delete_objects(&self, bucket: &str, paths: &[String]) -> Result<usize, DependencyError> {
        if paths.is_empty() {
            return Ok(0);
        }
        let response = self
            .http
            .delete(join_url(&self.api_base, &format!("object/{bucket}")))
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;
        let removed: Vec<serde_json::Value> = ensure_success(response).await?.json().await?;
        Ok(removed.len())
    }
}
