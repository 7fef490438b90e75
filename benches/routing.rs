//! Routing benchmarks: measures per-prompt routing and rewrite overhead.
//!
//! Targets:
//! - Single loader resolve: P99 <5μs
//! - 50-node graph route:   P99 <100μs

use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::Value;
use tokio::runtime::Runtime;

use model_hub_router::config::{RoutingSection, RuleSpec, ServiceSpec};
use model_hub_router::registry::{ModelDraft, ModelQuery, Page, QueryMode};
use model_hub_router::{
    ClassTypeFlags, FetchOutcome, FilenameEntry, Hub, HubConfig, ModelRegistry, ModelRouter,
    PipelineGraph, PipelineNode, RegistryError, RoutingTable,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn routing_section(rules: usize) -> RoutingSection {
    let mut section = RoutingSection::default();
    for i in 0..rules {
        section.rules.push(RuleSpec {
            pattern: format!("family-{i}"),
            config: format!("cfg-{i}"),
        });
        section.configs.insert(
            format!("cfg-{i}"),
            ServiceSpec {
                service_address: None,
                route: format!("/supernode/family-{i}"),
            },
        );
    }
    section.rules.push(RuleSpec {
        pattern: "flux1-dev".into(),
        config: "flux-dev".into(),
    });
    section.configs.insert(
        "flux-dev".into(),
        ServiceSpec {
            service_address: None,
            route: "/supernode/flux-dev".into(),
        },
    );
    section
}

fn router(rules: usize) -> ModelRouter {
    let table = RoutingTable::from_config(&routing_section(rules)).expect("table");
    ModelRouter::new(Arc::new(table))
}

fn graph(nodes: usize) -> PipelineGraph {
    let mut graph = PipelineGraph::new();
    for i in 0..nodes {
        let node = match i % 3 {
            0 => PipelineNode::new("UNETLoader").with_input("unet_name", "flux1-dev.sft"),
            1 => PipelineNode::new("LoraLoader").with_input("lora_name", "style.safetensors"),
            _ => PipelineNode::new("KSampler"),
        };
        graph.insert(i.to_string(), node);
    }
    graph
}

/// Registry answering every listing from memory.
struct StaticRegistry;

#[async_trait]
impl ModelRegistry for StaticRegistry {
    async fn fetch_files(&self, _: &str, _: Option<&str>) -> Result<FetchOutcome, RegistryError> {
        Ok(FetchOutcome::Files(vec![FilenameEntry::new(
            "style.safetensors",
            "remote/style.safetensors",
        )]))
    }
    async fn user_info(&self) -> Result<Value, RegistryError> {
        Ok(Value::Null)
    }
    async fn commit_model(&self, _: &ModelDraft) -> Result<Value, RegistryError> {
        Ok(Value::Null)
    }
    async fn update_model(&self, _: u64, _: &ModelDraft) -> Result<Value, RegistryError> {
        Ok(Value::Null)
    }
    async fn delete_model(&self, _: u64) -> Result<Value, RegistryError> {
        Ok(Value::Null)
    }
    async fn model_detail(&self, _: u64, _: &str) -> Result<Value, RegistryError> {
        Ok(Value::Null)
    }
    async fn fork_model_version(&self, _: u64) -> Result<Value, RegistryError> {
        Ok(Value::Null)
    }
    async fn query_models(
        &self,
        _: QueryMode,
        _: Page,
        _: &ModelQuery,
    ) -> Result<Value, RegistryError> {
        Ok(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Bench: single loader resolve against growing rule tables
// ---------------------------------------------------------------------------

fn bench_resolve_endpoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_endpoint");
    let flags: ClassTypeFlags = ["UNETLoader", "LoraLoader"].into_iter().collect();

    for rules in [1usize, 16, 128] {
        let router = router(rules);
        group.bench_with_input(BenchmarkId::from_parameter(rules), &rules, |b, _| {
            b.iter(|| {
                let mut node =
                    PipelineNode::new("UNETLoader").with_input("unet_name", "flux1-dev.sft");
                black_box(router.resolve_endpoint(&mut node, &flags))
            })
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Bench: whole-graph routing
// ---------------------------------------------------------------------------

fn bench_route_graph(c: &mut Criterion) {
    let router = router(16);
    let template = graph(50);

    c.bench_function("route_graph_50_nodes", |b| {
        b.iter(|| {
            let mut g = template.clone();
            black_box(router.route_graph(&mut g))
        })
    });
}

// ---------------------------------------------------------------------------
// Bench: rewrite + route on a warm cache
// ---------------------------------------------------------------------------

fn bench_prepare_warm_cache(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut config = HubConfig::default();
    config.routing = routing_section(16);
    let (hub, _rx) = Hub::new(config, Arc::new(StaticRegistry)).expect("hub");
    let template = graph(50);
    rt.block_on(hub.prepare(&template)).expect("warm-up");

    c.bench_function("prepare_50_nodes_warm", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(hub.prepare(&template).await.expect("prepare")) })
    });
}

criterion_group!(
    benches,
    bench_resolve_endpoint,
    bench_route_graph,
    bench_prepare_warm_cache
);
criterion_main!(benches);
