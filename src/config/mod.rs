//! # Stage: Static Hub Configuration
//!
//! ## Responsibility
//! Parse and validate the TOML file consumed once at startup: server binding,
//! registry client settings, the category catalog, refresh defaults, routing
//! rules and endpoint overrides, and upload settings.
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same `HubConfig`
//! - Validated: every regex compiles and every referenced config key exists
//!   before a config is accepted
//! - Complete defaults: an empty file yields a runnable configuration
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - Compiling routing rules (that belongs to `routing::table`)
//! - Holding mutable refresh state (that belongs to `cache::refresh`)

pub mod loader;
pub mod validation;

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ── Default value functions ──────────────────────────────────────────────

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8288
}

/// Default maximum request body: 10 MiB.
fn default_max_request_size() -> usize {
    10 * 1024 * 1024
}

fn default_registry_base_url() -> String {
    "http://localhost:9000/x/v1".to_string()
}

/// Default registry request timeout: 30 000 ms.
fn default_registry_timeout_ms() -> u64 {
    30_000
}

fn default_files_path() -> String {
    "/models/files".to_string()
}

fn default_model_types() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("loras".to_string(), "LoRA".to_string()),
        ("controlnet".to_string(), "Controlnet".to_string()),
    ])
}

fn default_accepted_types() -> Vec<String> {
    ["LoRA", "Controlnet", "Checkpoint"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_base_model_types() -> Vec<String> {
    [
        "FLUX.1", "SD1.5", "SDXL", "SD3.5", "Pony", "Kolors", "Hunyuan 1", "Other",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_refresh() -> BTreeMap<String, bool> {
    BTreeMap::from([("loras".to_string(), true), ("controlnet".to_string(), true)])
}

fn default_service_address() -> String {
    "http://localhost:9000".to_string()
}

fn default_overrides() -> Vec<OverrideSpec> {
    vec![
        OverrideSpec {
            config: "flux-dev".to_string(),
            companions: vec!["ApplyPulidFlux".to_string()],
            route: "/supernode/bizyair-flux-dev-comfy-pulid".to_string(),
            inputs: BTreeMap::new(),
        },
        OverrideSpec {
            config: "flux-dev".to_string(),
            companions: vec!["LoraLoader".to_string(), "ControlNetLoader".to_string()],
            route: "/supernode/flux-dev-bizyair-comfy-ksampler-fp8-v2".to_string(),
            inputs: BTreeMap::from([("weight_dtype".to_string(), "fp8_e4m3fn".to_string())]),
        },
    ]
}

/// Default processing queue capacity.
fn default_queue_capacity() -> usize {
    64
}

/// Extensions accepted for both cache listings and upload declarations.
pub(crate) fn default_model_extensions() -> Vec<String> {
    [".ckpt", ".pt", ".bin", ".pth", ".safetensors", ".pkl", ".sft"]
        .into_iter()
        .map(String::from)
        .collect()
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for a hub instance.
///
/// Every section is optional in the TOML source; missing sections fall back
/// to the documented defaults.
///
/// # Example
///
/// ```toml
/// [registry]
/// base_url = "https://models.example.com/x/v1"
///
/// [[routing.rules]]
/// pattern = "flux1-dev"
/// config = "flux-dev"
///
/// [routing.configs.flux-dev]
/// service_address = "https://compute.example.com"
/// route = "/supernode/flux-dev"
/// ```
///
/// # Panics
///
/// This type never panics during construction or access.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct HubConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSection,
    /// Remote model registry client settings.
    #[serde(default)]
    pub registry: RegistrySection,
    /// Category catalog and accepted identifiers.
    #[serde(default)]
    pub catalog: CatalogSection,
    /// Per-category refresh flag defaults.
    #[serde(default = "default_refresh")]
    pub refresh: BTreeMap<String, bool>,
    /// Loader routing rules, service configs and endpoint overrides.
    #[serde(default)]
    pub routing: RoutingSection,
    /// Upload declaration settings.
    #[serde(default)]
    pub upload: UploadSection,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            registry: RegistrySection::default(),
            catalog: CatalogSection::default(),
            refresh: default_refresh(),
            routing: RoutingSection::default(),
            upload: UploadSection::default(),
        }
    }
}

// ── Server ───────────────────────────────────────────────────────────────

/// HTTP listener settings.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ServerSection {
    /// Interface to bind (e.g. `"0.0.0.0"`).
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_request_size: default_max_request_size(),
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Remote model registry client settings.
///
/// The bearer token is never stored in the file; it is read from
/// `MODEL_HUB_API_KEY` at startup.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RegistrySection {
    /// Base URL every registry path is appended to.
    #[serde(default = "default_registry_base_url")]
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_registry_timeout_ms")]
    pub timeout_ms: u64,
    /// Path (relative to `base_url`) of the file listing endpoint.
    #[serde(default = "default_files_path")]
    pub files_path: String,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            base_url: default_registry_base_url(),
            timeout_ms: default_registry_timeout_ms(),
            files_path: default_files_path(),
        }
    }
}

// ── Catalog ──────────────────────────────────────────────────────────────

/// Category catalog.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CatalogSection {
    /// Category key → remote model type sent to the registry.
    #[serde(default = "default_model_types")]
    pub model_types: BTreeMap<String, String>,
    /// Category key → filenames always available locally.
    #[serde(default)]
    pub static_files: BTreeMap<String, Vec<String>>,
    /// Model types accepted by the create/update endpoints.
    #[serde(default = "default_accepted_types")]
    pub accepted_types: Vec<String>,
    /// Base-model identifiers offered to clients.
    #[serde(default = "default_base_model_types")]
    pub base_model_types: Vec<String>,
    /// Filename suffixes that pass the listing filter.
    #[serde(default = "default_model_extensions")]
    pub extensions: Vec<String>,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            model_types: default_model_types(),
            static_files: BTreeMap::new(),
            accepted_types: default_accepted_types(),
            base_model_types: default_base_model_types(),
            extensions: default_model_extensions(),
        }
    }
}

// ── Routing ──────────────────────────────────────────────────────────────

/// Loader routing configuration.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RoutingSection {
    /// Address used when a service config omits `service_address`.
    #[serde(default = "default_service_address")]
    pub default_service_address: String,
    /// Ordered pattern rules; first match wins.
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    /// Named service configs referenced by rules and overrides.
    #[serde(default)]
    pub configs: BTreeMap<String, ServiceSpec>,
    /// Ordered companion-node overrides evaluated after the rule match.
    #[serde(default = "default_overrides")]
    pub overrides: Vec<OverrideSpec>,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            default_service_address: default_service_address(),
            rules: Vec::new(),
            configs: BTreeMap::new(),
            overrides: default_overrides(),
        }
    }
}

/// A single `pattern → config` routing rule.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RuleSpec {
    /// Regex matched against the start of the lowercased model name.
    pub pattern: String,
    /// Key into [`RoutingSection::configs`].
    pub config: String,
}

/// Address bundle for one family of models.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Compute service address; `None` uses the routing default.
    #[serde(default)]
    pub service_address: Option<String>,
    /// Path appended to the service address for the generic endpoint.
    #[serde(default)]
    pub route: String,
}

/// Endpoint override applied when a companion node type is present.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct OverrideSpec {
    /// Config key this override refines.
    pub config: String,
    /// Any of these class types being present in the graph triggers the override.
    pub companions: Vec<String>,
    /// Route appended to the config's service address.
    pub route: String,
    /// Node inputs forced when the override fires.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

// ── Upload ───────────────────────────────────────────────────────────────

/// Upload declaration settings.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct UploadSection {
    /// Capacity of the processing queue between handlers and the worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Filename suffixes accepted for upload.
    #[serde(default = "default_model_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            allowed_extensions: default_model_extensions(),
        }
    }
}

/// Export the JSON Schema for `HubConfig`.
///
/// # Errors
///
/// Returns `serde_json::Error` if schema serialization fails.
///
/// # Panics
///
/// This function never panics.
pub fn export_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(HubConfig);
    serde_json::to_string_pretty(&schema)
}
