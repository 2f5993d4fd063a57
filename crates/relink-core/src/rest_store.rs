use crate::doc_store::{DocumentDescriptor, DocumentStore, StoreError};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const NOTE_JSON: &str = "application/vnd.olrapi.note+json";
const DATAVIEW_DQL: &str = "application/vnd.olrapi.dataview.dql+txt";
const MARKDOWN: &str = "text/markdown";

pub const DEFAULT_BASE_URL: &str = "https://127.0.0.1:27124";

#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    /// The Local REST API plugin serves a self-signed certificate.
    pub accept_invalid_certs: bool,
}

impl RestStoreConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
            accept_invalid_certs: true,
        }
    }
}

/// `DocumentStore` over the Obsidian Local REST API.
pub struct RestStore {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct NoteJson {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct SearchHit {
    filename: String,
}

impl RestStore {
    pub fn new(config: RestStoreConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| StoreError::Transport {
            message: format!("invalid base URL {}: {}", config.base_url, e),
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| StoreError::Transport {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            timeout: config.timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), suffix)
    }

    fn vault_url(&self, path: &str) -> String {
        self.endpoint(&format!("vault/{}", encode_vault_path(path)))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    fn transport_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout {
                timeout: self.timeout,
            }
        } else {
            StoreError::Transport {
                message: e.to_string(),
            }
        }
    }

    async fn expect_success(&self, response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

/// Percent-encode each path segment, keeping the `/` separators.
pub fn encode_vault_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Dataview query listing the documents that link to `note_name`.
pub fn backlinks_query(note_name: &str) -> String {
    let name = note_name.strip_suffix(".md").unwrap_or(note_name);
    format!("TABLE file.path, file.inlinks FROM [[{}]]", name)
}

#[async_trait]
impl DocumentStore for RestStore {
    async fn fetch_content(&self, path: &str) -> Result<Option<String>, StoreError> {
        let response = self
            .client
            .get(self.vault_url(path))
            .header(AUTHORIZATION, self.bearer())
            .header(ACCEPT, NOTE_JSON)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.expect_success(response).await?;
        let note: NoteJson = response.json().await.map_err(|e| StoreError::Decode {
            message: e.to_string(),
        })?;
        Ok(Some(note.content))
    }

    async fn write_content(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.vault_url(path))
            .header(AUTHORIZATION, self.bearer())
            .header(CONTENT_TYPE, MARKDOWN)
            .body(content.as_bytes().to_vec())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.expect_success(response).await.map(|_| ())
    }

    async fn delete_document(&self, path: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.vault_url(path))
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        self.expect_success(response).await.map(|_| ())
    }

    async fn find_referencing_documents(
        &self,
        note_name: &str,
    ) -> Result<Vec<DocumentDescriptor>, StoreError> {
        let response = self
            .client
            .post(self.endpoint("search/"))
            .header(AUTHORIZATION, self.bearer())
            .header(CONTENT_TYPE, DATAVIEW_DQL)
            .body(backlinks_query(note_name))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = self.expect_success(response).await?;
        let hits: Vec<SearchHit> = response.json().await.map_err(|e| StoreError::Decode {
            message: e.to_string(),
        })?;
        Ok(hits
            .into_iter()
            .map(|hit| DocumentDescriptor::new(hit.filename))
            .collect())
    }
}
