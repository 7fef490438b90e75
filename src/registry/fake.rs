//! In-memory registry used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::types::{ModelDraft, ModelQuery, Page, QueryMode};
use super::{FetchOutcome, FilenameEntry, ModelRegistry, RegistryError};

/// Scripted listings per `(model_type, share_id)` plus call counters.
#[derive(Default)]
pub(crate) struct FakeRegistry {
    listings: Mutex<HashMap<(String, Option<String>), Result<FetchOutcome, String>>>,
    fetches: AtomicUsize,
    commits: AtomicUsize,
}

impl FakeRegistry {
    pub(crate) fn with_files(self, model_type: &str, entries: &[(&str, &str)]) -> Self {
        self.set_files(model_type, entries);
        self
    }

    pub(crate) fn set_files(&self, model_type: &str, entries: &[(&str, &str)]) {
        let files = entries
            .iter()
            .map(|(l, r)| FilenameEntry::new(*l, *r))
            .collect();
        self.listings
            .lock()
            .insert((model_type.to_string(), None), Ok(FetchOutcome::Files(files)));
    }

    pub(crate) fn with_share(self, model_type: &str, share: &str, entries: &[(&str, &str)]) -> Self {
        let files = entries
            .iter()
            .map(|(l, r)| FilenameEntry::new(*l, *r))
            .collect();
        self.listings.lock().insert(
            (model_type.to_string(), Some(share.to_string())),
            Ok(FetchOutcome::Files(files)),
        );
        self
    }

    pub(crate) fn with_empty(self, model_type: &str) -> Self {
        self.listings
            .lock()
            .insert((model_type.to_string(), None), Ok(FetchOutcome::Empty));
        self
    }

    pub(crate) fn with_failure(self, model_type: &str) -> Self {
        self.listings
            .lock()
            .insert((model_type.to_string(), None), Err("connection refused".into()));
        self
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelRegistry for FakeRegistry {
    async fn fetch_files(
        &self,
        model_type: &str,
        share_id: Option<&str>,
    ) -> Result<FetchOutcome, RegistryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let key = (model_type.to_string(), share_id.map(str::to_string));
        match self.listings.lock().get(&key) {
            Some(Ok(outcome)) => Ok(outcome.clone()),
            Some(Err(msg)) => Err(RegistryError::Transport(msg.clone())),
            None => Ok(FetchOutcome::Empty),
        }
    }

    async fn user_info(&self) -> Result<Value, RegistryError> {
        Ok(json!({"name": "tester"}))
    }

    async fn commit_model(&self, draft: &ModelDraft) -> Result<Value, RegistryError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"name": draft.name}))
    }

    async fn update_model(&self, model_id: u64, _: &ModelDraft) -> Result<Value, RegistryError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"id": model_id}))
    }

    async fn delete_model(&self, model_id: u64) -> Result<Value, RegistryError> {
        Ok(json!({"id": model_id}))
    }

    async fn model_detail(&self, model_id: u64, source: &str) -> Result<Value, RegistryError> {
        Ok(json!({"id": model_id, "source": source}))
    }

    async fn fork_model_version(&self, version_id: u64) -> Result<Value, RegistryError> {
        Ok(json!({"version_id": version_id}))
    }

    async fn query_models(
        &self,
        mode: QueryMode,
        page: Page,
        query: &ModelQuery,
    ) -> Result<Value, RegistryError> {
        Ok(json!({
            "mode": mode.as_str(),
            "current": page.current,
            "page_size": page.page_size,
            "keyword": query.keyword,
        }))
    }
}
