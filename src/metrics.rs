//! Prometheus metrics for the hub.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup before serving traffic. The
//! helper functions (`record_registry_call`, `inc_cache_read`, …) are no-ops
//! if `init_metrics` was never called, so library users and tests can run
//! without a metrics registry.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `model_hub_registry_calls_total` | Counter | `operation`, `outcome` |
//! | `model_hub_registry_call_duration_seconds` | Histogram | `operation` |
//! | `model_hub_cache_reads_total` | Counter | `category`, `outcome` |
//! | `model_hub_connected_clients` | Gauge | |
//! | `model_hub_delivery_failures_total` | Counter | `reason` |
//! | `model_hub_uploads_total` | Counter | `stage` |

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    core::Collector, CounterVec, Encoder, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::HubError;

// ── Internal metrics bundle ────────────────────────────────────────────────

/// All hub metrics, stored together in a single [`OnceLock`].
pub struct Metrics {
    /// Prometheus registry that owns all metric descriptors.
    pub registry: Registry,
    /// Registry RPCs by operation and outcome (`ok` / `error`).
    pub registry_calls: CounterVec,
    /// Registry RPC latency by operation.
    pub registry_duration: HistogramVec,
    /// Filename cache reads by category and outcome.
    pub cache_reads: CounterVec,
    /// Currently registered WebSocket clients.
    pub connected_clients: IntGauge,
    /// Notifier deliveries that were dropped.
    pub delivery_failures: CounterVec,
    /// Upload lifecycle transitions by stage.
    pub uploads: CounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn register<C>(registry: &Registry, collector: C) -> Result<C, HubError>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| HubError::Other(format!("metrics registration failed: {e}")))?;
    Ok(collector)
}

fn build(prefix: &str) -> Result<Metrics, HubError> {
    let init_err = |e: prometheus::Error| HubError::Other(format!("metrics init failed: {e}"));
    let registry = Registry::new();

    let registry_calls = register(
        &registry,
        CounterVec::new(
            Opts::new(
                format!("{prefix}_registry_calls_total"),
                "Registry RPCs by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .map_err(init_err)?,
    )?;

    let registry_duration = register(
        &registry,
        HistogramVec::new(
            HistogramOpts::new(
                format!("{prefix}_registry_call_duration_seconds"),
                "Registry RPC latency",
            ),
            &["operation"],
        )
        .map_err(init_err)?,
    )?;

    let cache_reads = register(
        &registry,
        CounterVec::new(
            Opts::new(
                format!("{prefix}_cache_reads_total"),
                "Filename cache reads by category and outcome",
            ),
            &["category", "outcome"],
        )
        .map_err(init_err)?,
    )?;

    let connected_clients = register(
        &registry,
        IntGauge::new(
            format!("{prefix}_connected_clients"),
            "Currently registered WebSocket clients",
        )
        .map_err(init_err)?,
    )?;

    let delivery_failures = register(
        &registry,
        CounterVec::new(
            Opts::new(
                format!("{prefix}_delivery_failures_total"),
                "Client notifications that could not be delivered",
            ),
            &["reason"],
        )
        .map_err(init_err)?,
    )?;

    let uploads = register(
        &registry,
        CounterVec::new(
            Opts::new(format!("{prefix}_uploads_total"), "Upload transitions by stage"),
            &["stage"],
        )
        .map_err(init_err)?,
    )?;

    Ok(Metrics {
        registry,
        registry_calls,
        registry_duration,
        cache_reads,
        connected_clients,
        delivery_failures,
        uploads,
    })
}

// ── Initialisation ─────────────────────────────────────────────────────────

/// Initialise all Prometheus metrics and register them with a private registry.
///
/// Calling it a second time is a no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`HubError::Other`] if metric construction or registration fails.
///
/// # Panics
///
/// This function never panics.
pub fn init_metrics() -> Result<(), HubError> {
    if METRICS.get().is_some() {
        return Ok(());
    }
    // A racing initialiser builds identical descriptors; first one wins.
    let _ = METRICS.set(build("model_hub")?);
    Ok(())
}

fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

// ── Public helper functions ────────────────────────────────────────────────

/// Record one registry RPC with its outcome and latency.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn record_registry_call(operation: &str, ok: bool, elapsed: Duration) {
    if let Some(m) = metrics() {
        let outcome = if ok { "ok" } else { "error" };
        if let Ok(c) = m
            .registry_calls
            .get_metric_with_label_values(&[operation, outcome])
        {
            c.inc();
        }
        if let Ok(h) = m.registry_duration.get_metric_with_label_values(&[operation]) {
            h.observe(elapsed.as_secs_f64());
        }
    }
}

/// Count a filename cache read (`hit`, `fetch`, `empty`, `error`).
///
/// # Panics
///
/// This function never panics.
pub fn inc_cache_read(category: &str, outcome: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m
            .cache_reads
            .get_metric_with_label_values(&[category, outcome])
        {
            c.inc();
        }
    }
}

/// Set the connected-clients gauge.
///
/// # Panics
///
/// This function never panics.
pub fn set_connected_clients(count: usize) {
    if let Some(m) = metrics() {
        m.connected_clients
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

/// Count a dropped notification (`full`, `closed`).
///
/// # Panics
///
/// This function never panics.
pub fn inc_delivery_failure(reason: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.delivery_failures.get_metric_with_label_values(&[reason]) {
            c.inc();
        }
    }
}

/// Count an upload lifecycle transition.
///
/// # Panics
///
/// This function never panics.
pub fn inc_upload(stage: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.uploads.get_metric_with_label_values(&[stage]) {
            c.inc();
        }
    }
}

/// Gather all registered metrics as a raw list of metric families.
///
/// Returns an empty `Vec` if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    metrics().map_or_else(Vec::new, |m| m.registry.gather())
}

/// Gather and encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or if
/// encoding fails.
///
/// # Panics
///
/// This function never panics.
pub fn gather_metrics() -> String {
    let families = gather();
    if families.is_empty() {
        return String::new();
    }
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Snapshot of counters reported by the health endpoint.
#[derive(Debug, Default, serde::Serialize)]
pub struct MetricsSummary {
    /// Registry calls keyed by `"operation:outcome"`.
    pub registry_calls: HashMap<String, u64>,
    /// Uploads keyed by stage.
    pub uploads: HashMap<String, u64>,
    /// Delivery failures keyed by reason.
    pub delivery_failures: HashMap<String, u64>,
}

fn collect_counter(vec: &CounterVec, labels: &[&str]) -> HashMap<String, u64> {
    let mut out = HashMap::new();
    for family in vec.collect() {
        for metric in family.get_metric() {
            let key = labels
                .iter()
                .map(|name| {
                    metric
                        .get_label()
                        .iter()
                        .find(|l| l.get_name() == *name)
                        .map_or("unknown", |l| l.get_value())
                })
                .collect::<Vec<_>>()
                .join(":");
            out.insert(key, metric.get_counter().get_value() as u64);
        }
    }
    out
}

/// Return a structured summary of current counter values.
///
/// Returns an empty [`MetricsSummary`] if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn get_metrics_summary() -> MetricsSummary {
    let Some(m) = metrics() else {
        return MetricsSummary::default();
    };
    MetricsSummary {
        registry_calls: collect_counter(&m.registry_calls, &["operation", "outcome"]),
        uploads: collect_counter(&m.uploads, &["stage"]),
        delivery_failures: collect_counter(&m.delivery_failures, &["reason"]),
    }
}
