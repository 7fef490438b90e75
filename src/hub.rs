//! Assembly of the owned state objects into one shareable [`Hub`].
//!
//! Every mutable table (cache entries, refresh flags, pending uploads,
//! connected clients) lives in exactly one component constructed here and is
//! handed out by `Arc`; nothing is global.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::{FilenameCache, RefreshRegistry};
use crate::config::HubConfig;
use crate::graph::PipelineGraph;
use crate::notify::ClientNotifier;
use crate::registry::ModelRegistry;
use crate::rewrite::{PromptRewriter, RewriteError};
use crate::routing::{ModelRouter, NodeRoute, RoutingTable};
use crate::upload::{spawn_upload_worker, UploadCoordinator, UploadDeclaration, UploadProcessor};
use crate::HubError;

/// A rewritten graph together with the endpoints chosen for its loaders.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedPrompt {
    /// Graph with labels replaced by real paths and overrides applied.
    pub prompt: PipelineGraph,
    /// Endpoint per routed loader node.
    pub routes: Vec<NodeRoute>,
}

/// All hub components, wired from one [`HubConfig`].
pub struct Hub {
    /// Configuration the hub was built from.
    pub config: HubConfig,
    /// RPC boundary to the model registry.
    pub registry: Arc<dyn ModelRegistry>,
    /// Per-category refresh flags.
    pub refresh: Arc<RefreshRegistry>,
    /// Filename cache.
    pub cache: Arc<FilenameCache>,
    /// Loader endpoint router.
    pub router: ModelRouter,
    /// Graph label rewriter.
    pub rewriter: PromptRewriter,
    /// Upload declaration table and queue producer.
    pub uploads: Arc<UploadCoordinator>,
    /// Connected WebSocket clients.
    pub notifier: Arc<ClientNotifier>,
}

impl Hub {
    /// Build every component from `config`.
    ///
    /// Returns the hub and the receiving end of the upload queue, to be passed
    /// to [`Hub::spawn_worker`].
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Routing`] if the routing section does not compile.
    pub fn new(
        config: HubConfig,
        registry: Arc<dyn ModelRegistry>,
    ) -> Result<(Self, mpsc::Receiver<UploadDeclaration>), HubError> {
        let table = RoutingTable::from_config(&config.routing)?;
        let refresh = Arc::new(RefreshRegistry::new(config.refresh.clone()));
        let cache = Arc::new(FilenameCache::new(
            registry.clone(),
            refresh.clone(),
            &config.catalog,
        ));
        let (uploads, queue_rx) = UploadCoordinator::with_queue(
            config.upload.queue_capacity,
            config.upload.allowed_extensions.clone(),
        );

        info!(
            rules = table.rule_count(),
            categories = config.catalog.model_types.len(),
            queue_capacity = config.upload.queue_capacity,
            "hub assembled"
        );

        let hub = Self {
            router: ModelRouter::new(Arc::new(table)),
            rewriter: PromptRewriter::new(cache.clone()),
            uploads: Arc::new(uploads),
            notifier: Arc::new(ClientNotifier::default()),
            config,
            registry,
            refresh,
            cache,
        };
        Ok((hub, queue_rx))
    }

    /// Spawn the upload worker on `queue_rx`.
    pub fn spawn_worker(
        &self,
        queue_rx: mpsc::Receiver<UploadDeclaration>,
        processor: Arc<dyn UploadProcessor>,
    ) -> JoinHandle<()> {
        spawn_upload_worker(queue_rx, processor, self.notifier.clone())
    }

    /// Rewrite file labels in `graph`, then route its loader nodes.
    ///
    /// # Errors
    ///
    /// Propagates [`RewriteError`] from the rewrite step.
    pub async fn prepare(&self, graph: &PipelineGraph) -> Result<PreparedPrompt, RewriteError> {
        let mut prompt = self.rewriter.rewrite(graph).await?;
        let routes = self.router.route_graph(&mut prompt);
        Ok(PreparedPrompt { prompt, routes })
    }

    /// Mark the category of a freshly published `model_type` for refresh.
    ///
    /// Returns the category when one maps to the type.
    pub fn on_model_published(&self, model_type: &str) -> Option<String> {
        let category = self.cache.category_for_model_type(model_type)?.to_string();
        self.refresh.enable([category.as_str()]);
        info!(model_type, category = %category, "published model marks category stale");
        Some(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuleSpec, ServiceSpec};
    use crate::graph::PipelineNode;
    use crate::registry::fake::FakeRegistry;

    fn config() -> HubConfig {
        let mut config = HubConfig::default();
        config.routing.rules.push(RuleSpec {
            pattern: "flux1-dev".into(),
            config: "flux-dev".into(),
        });
        config.routing.configs.insert(
            "flux-dev".into(),
            ServiceSpec {
                service_address: None,
                route: "/supernode/flux-dev".into(),
            },
        );
        config
    }

    #[tokio::test]
    async fn test_prepare_rewrites_then_routes() {
        let fake = Arc::new(
            FakeRegistry::default().with_files("LoRA", &[("style.safetensors", "r/style")]),
        );
        let (hub, _rx) = Hub::new(config(), fake).expect("test: hub");

        let mut graph = PipelineGraph::new();
        graph.insert(
            "1".into(),
            PipelineNode::new("UNETLoader").with_input("unet_name", "flux1-dev.sft"),
        );
        graph.insert(
            "2".into(),
            PipelineNode::new("LoraLoader").with_input("lora_name", "style.safetensors"),
        );

        let prepared = hub.prepare(&graph).await.expect("test: prepare");
        assert_eq!(prepared.prompt["2"].str_input("lora_name"), Some("r/style"));
        assert_eq!(prepared.routes.len(), 1);
        assert_eq!(
            prepared.routes[0].endpoint,
            "http://localhost:9000/supernode/flux-dev-bizyair-comfy-ksampler-fp8-v2"
        );
        assert!(graph["1"].str_input("weight_dtype").is_none(), "input untouched");
    }

    #[tokio::test]
    async fn test_published_model_type_enables_its_category() {
        let (hub, _rx) = Hub::new(config(), Arc::new(FakeRegistry::default())).expect("test: hub");
        hub.refresh.disable(["controlnet"]);
        assert_eq!(hub.on_model_published("Controlnet").as_deref(), Some("controlnet"));
        assert!(hub.refresh.get("controlnet"));
        assert_eq!(hub.on_model_published("Checkpoint"), None);
    }

    #[test]
    fn test_bad_routing_config_fails_assembly() {
        let mut cfg = config();
        cfg.routing.rules[0].config = "missing".into();
        assert!(matches!(
            Hub::new(cfg, Arc::new(FakeRegistry::default())),
            Err(HubError::Routing(_))
        ));
    }
}
