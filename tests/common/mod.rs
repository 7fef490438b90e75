//! Shared fixtures for integration tests: a scripted registry and a live hub
//! server bound on an ephemeral port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::{json, Value};

use model_hub_router::registry::{ModelDraft, ModelQuery, Page, QueryMode};
use model_hub_router::upload::DigestProcessor;
use model_hub_router::{FetchOutcome, FilenameEntry, Hub, HubConfig, ModelRegistry, RegistryError};

/// Registry answering from scripted listings and counting every call.
#[derive(Default)]
pub struct ScriptedRegistry {
    listings: Mutex<HashMap<String, Vec<FilenameEntry>>>,
    calls: Mutex<Vec<String>>,
    fetches: AtomicUsize,
}

impl ScriptedRegistry {
    pub fn with_files(self, model_type: &str, entries: &[(&str, &str)]) -> Self {
        self.listings.lock().insert(
            model_type.to_string(),
            entries
                .iter()
                .map(|(label, real)| FilenameEntry::new(*label, *real))
                .collect(),
        );
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Names of the non-listing calls, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }
}

#[async_trait]
impl ModelRegistry for ScriptedRegistry {
    async fn fetch_files(
        &self,
        model_type: &str,
        share_id: Option<&str>,
    ) -> Result<FetchOutcome, RegistryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if share_id.is_some() {
            return Ok(FetchOutcome::Empty);
        }
        Ok(match self.listings.lock().get(model_type) {
            Some(files) => FetchOutcome::Files(files.clone()),
            None => FetchOutcome::Empty,
        })
    }

    async fn user_info(&self) -> Result<Value, RegistryError> {
        self.record("user_info");
        Ok(json!({"name": "tester"}))
    }

    async fn commit_model(&self, draft: &ModelDraft) -> Result<Value, RegistryError> {
        self.record("commit_model");
        Ok(json!({"id": 7, "name": draft.name}))
    }

    async fn update_model(&self, _model_id: u64, _draft: &ModelDraft) -> Result<Value, RegistryError> {
        self.record("update_model");
        Ok(Value::Null)
    }

    async fn delete_model(&self, _model_id: u64) -> Result<Value, RegistryError> {
        self.record("delete_model");
        Ok(Value::Null)
    }

    async fn model_detail(&self, model_id: u64, source: &str) -> Result<Value, RegistryError> {
        self.record("model_detail");
        Ok(json!({"id": model_id, "source": source}))
    }

    async fn fork_model_version(&self, _version_id: u64) -> Result<Value, RegistryError> {
        self.record("fork_model_version");
        Err(RegistryError::Remote {
            code: 40_301,
            message: "cannot fork own model".into(),
        })
    }

    async fn query_models(
        &self,
        mode: QueryMode,
        page: Page,
        query: &ModelQuery,
    ) -> Result<Value, RegistryError> {
        self.record("query_models");
        Ok(json!({
            "mode": mode.as_str(),
            "current": page.current,
            "page_size": page.page_size,
            "keyword": query.keyword,
        }))
    }
}

/// A running hub server.
pub struct TestServer {
    pub base: String,
    pub ws_base: String,
    pub hub: Arc<Hub>,
    pub registry: Arc<ScriptedRegistry>,
}

/// Start a hub over `registry` with a digest worker, on an ephemeral port.
pub async fn spawn_server(registry: ScriptedRegistry) -> TestServer {
    spawn_server_with(HubConfig::default(), registry).await
}

pub async fn spawn_server_with(config: HubConfig, registry: ScriptedRegistry) -> TestServer {
    let registry = Arc::new(registry);
    let (hub, queue_rx) = Hub::new(config, registry.clone()).expect("test: hub");
    let hub = Arc::new(hub);
    hub.spawn_worker(queue_rx, Arc::new(DigestProcessor::default()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test: bind");
    let addr = listener.local_addr().expect("test: addr");
    let serving = hub.clone();
    tokio::spawn(async move {
        let _ = model_hub_router::web_api::serve(listener, serving).await;
    });

    TestServer {
        base: format!("http://{addr}"),
        ws_base: format!("ws://{addr}"),
        hub,
        registry,
    }
}

pub fn client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client must build in tests")
}
