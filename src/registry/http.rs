//! HTTP implementation of [`ModelRegistry`] on top of `reqwest`.
//!
//! Every registry response is wrapped in `{code, message, data}`; a `code`
//! other than [`SUCCESS_CODE`] is surfaced as [`RegistryError::Remote`] and
//! the handlers only ever see the unwrapped `data`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{ModelDraft, ModelQuery, Page, QueryMode};
use super::{FetchOutcome, FilenameEntry, ModelRegistry, RegistryError};
use crate::config::RegistrySection;
use crate::metrics;

/// Application-level success code of the registry envelope.
pub const SUCCESS_CODE: i64 = 20000;

/// Maximum number of body bytes carried into a [`RegistryError::Status`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct RawFileEntry {
    label_path: String,
    real_path: String,
}

/// `reqwest`-backed registry client.
///
/// ## Example
///
/// ```no_run
/// use model_hub_router::registry::HttpRegistry;
/// use std::time::Duration;
///
/// let registry = HttpRegistry::new("https://models.example.com/x/v1")
///     .with_api_key("secret")
///     .with_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
    files_path: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpRegistry {
    /// Create a client for the registry rooted at `base_url`.
    ///
    /// A trailing `/` on `base_url` is ignored.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            files_path: "/models/files".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Build a client from the `[registry]` config section.
    pub fn from_config(section: &RegistrySection, api_key: Option<String>) -> Self {
        let mut registry = Self::new(section.base_url.clone())
            .with_timeout(Duration::from_millis(section.timeout_ms))
            .with_files_path(section.files_path.clone());
        registry.api_key = api_key.filter(|k| !k.is_empty());
        registry
    }

    /// Attach a bearer token to every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the path of the file listing endpoint.
    pub fn with_files_path(mut self, path: impl Into<String>) -> Self {
        self.files_path = path.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base}/{share}/models/files` with `share` pushed as one encoded segment.
    fn share_files_url(&self, share: &str) -> Result<reqwest::Url, RegistryError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| RegistryError::Transport(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| RegistryError::Transport("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(share)
            .push("models")
            .push("files");
        Ok(url)
    }

    /// Send a request and unwrap the registry envelope.
    async fn call(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, RegistryError> {
        let mut request = request.timeout(self.timeout);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let started = Instant::now();
        let result = self.exchange(request).await;
        metrics::record_registry_call(operation, result.is_ok(), started.elapsed());
        if let Err(e) = &result {
            warn!(operation, error = %e, "registry call failed");
        }
        result
    }

    async fn exchange(&self, request: reqwest::RequestBuilder) -> Result<Value, RegistryError> {
        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| RegistryError::Decode(e.to_string()))?;

        if envelope.code != SUCCESS_CODE {
            return Err(RegistryError::Remote {
                code: envelope.code,
                message: envelope.message,
            });
        }
        Ok(envelope.data)
    }
}

/// Turn the `data` of a listing response into a [`FetchOutcome`].
///
/// Missing `data`, missing `files`, or a malformed entry list all count as
/// [`FetchOutcome::Empty`]. Entries with an empty label are skipped.
fn parse_listing(data: Value) -> FetchOutcome {
    let files = match data.get("files") {
        Some(files) if files.is_array() => files.clone(),
        _ => return FetchOutcome::Empty,
    };
    match serde_json::from_value::<Vec<RawFileEntry>>(files) {
        Ok(raw) => FetchOutcome::Files(
            raw.into_iter()
                .filter(|e| !e.label_path.is_empty())
                .map(|e| FilenameEntry::new(e.label_path, e.real_path))
                .collect(),
        ),
        Err(e) => {
            debug!(error = %e, "malformed file listing treated as empty");
            FetchOutcome::Empty
        }
    }
}

#[async_trait]
impl ModelRegistry for HttpRegistry {
    async fn fetch_files(
        &self,
        model_type: &str,
        share_id: Option<&str>,
    ) -> Result<FetchOutcome, RegistryError> {
        let request = match share_id {
            Some(share) => self.client.get(self.share_files_url(share)?),
            None => self.client.get(self.url(&self.files_path)),
        };
        let request = request.query(&[("type", model_type)]);
        match self.call("fetch_files", request).await {
            Ok(data) => Ok(parse_listing(data)),
            Err(RegistryError::Decode(reason)) => {
                warn!(model_type, %reason, "undecodable file listing, treating as empty");
                Ok(FetchOutcome::Empty)
            }
            Err(e) => Err(e),
        }
    }

    async fn user_info(&self) -> Result<Value, RegistryError> {
        let request = self.client.get(self.url("/user/info"));
        self.call("user_info", request).await
    }

    async fn commit_model(&self, draft: &ModelDraft) -> Result<Value, RegistryError> {
        let request = self.client.post(self.url("/models")).json(draft);
        self.call("commit_model", request).await
    }

    async fn update_model(
        &self,
        model_id: u64,
        draft: &ModelDraft,
    ) -> Result<Value, RegistryError> {
        let request = self
            .client
            .put(self.url(&format!("/models/{model_id}")))
            .json(draft);
        self.call("update_model", request).await
    }

    async fn delete_model(&self, model_id: u64) -> Result<Value, RegistryError> {
        let request = self.client.delete(self.url(&format!("/models/{model_id}")));
        self.call("delete_model", request).await
    }

    async fn model_detail(&self, model_id: u64, source: &str) -> Result<Value, RegistryError> {
        let request = self
            .client
            .get(self.url(&format!("/models/{model_id}/detail")))
            .query(&[("source", source)]);
        self.call("model_detail", request).await
    }

    async fn fork_model_version(&self, version_id: u64) -> Result<Value, RegistryError> {
        let request = self
            .client
            .post(self.url(&format!("/models/fork/{version_id}")));
        self.call("fork_model_version", request).await
    }

    async fn query_models(
        &self,
        mode: QueryMode,
        page: Page,
        query: &ModelQuery,
    ) -> Result<Value, RegistryError> {
        let request = self
            .client
            .post(self.url(&format!("/models/query/{mode}")))
            .query(&[("current", page.current), ("page_size", page.page_size)])
            .json(query);
        self.call("query_models", request).await
    }
}
