//! Configuration file loading.
//!
//! ## Responsibility
//! Read a TOML file from disk, parse it into a [`HubConfig`], and run
//! validation before returning. This is the only entry point for loading
//! hub configuration at startup.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//!
//! ## NOT Responsible For
//! - Defining the config schema (that belongs to `mod.rs`)

use std::path::Path;

use super::validation::{self, ConfigError};
use super::HubConfig;

/// Load a [`HubConfig`] from a TOML file.
///
/// # Returns
///
/// - `Ok(HubConfig)` if the file is readable, well-formed, and valid.
/// - `Err(ConfigError::Io)` if the file cannot be read.
/// - `Err(ConfigError::Parse)` if the TOML is malformed.
/// - `Err(ConfigError::Validation)` if semantic constraints are violated.
///
/// # Panics
///
/// This function never panics.
///
/// # Example
///
/// ```rust,no_run
/// use model_hub_router::config::loader::load_from_file;
/// use std::path::Path;
///
/// let config = load_from_file(Path::new("hub.toml"))?;
/// println!("listening on port {}", config.server.port);
/// # Ok::<(), model_hub_router::config::validation::ConfigError>(())
/// ```
pub fn load_from_file(path: &Path) -> Result<HubConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// Load a [`HubConfig`] from a TOML string.
///
/// # Arguments
///
/// * `content`: TOML content as a string.
/// * `source_name`: Identifier for the source (used in error messages).
///
/// # Panics
///
/// This function never panics.
pub fn load_from_str(content: &str, source_name: &str) -> Result<HubConfig, ConfigError> {
    let config: HubConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    validation::validate(&config).map_err(|errors| {
        ConfigError::Validation(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID_TOML: &str = r#"
[server]
host = "0.0.0.0"
port = 9100

[registry]
base_url = "https://models.example.com/x/v1"
timeout_ms = 5000

[catalog.model_types]
loras = "LoRA"
controlnet = "Controlnet"
checkpoints = "Checkpoint"

[catalog.static_files]
checkpoints = ["sdxl/base.safetensors"]

[refresh]
loras = true
checkpoints = false

[[routing.rules]]
pattern = "flux1-dev"
config = "flux-dev"

[[routing.rules]]
pattern = "sdxl"
config = "sdxl"

[routing.configs.flux-dev]
service_address = "https://compute.example.com"
route = "/supernode/flux-dev"

[routing.configs.sdxl]
route = "/supernode/sdxl"
"#;

    #[test]
    fn test_load_from_str_valid_toml_succeeds() {
        let config = load_from_str(VALID_TOML, "test").expect("test: valid config");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.routing.rules.len(), 2);
        assert_eq!(config.refresh.get("checkpoints"), Some(&false));
    }

    #[test]
    fn test_load_from_str_invalid_toml_returns_parse_error() {
        let result = load_from_str("not valid toml [[[", "bad.toml");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_from_str_validation_failure_returns_validation_error() {
        let toml_str = r#"
[[routing.rules]]
pattern = "flux1-dev"
config = "nowhere"
"#;
        let err = load_from_str(toml_str, "dangling.toml").expect_err("test: must fail");
        assert!(
            matches!(&err, ConfigError::Validation(msg) if msg.contains("routing.rules[0].config")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_load_from_file_valid_toml_succeeds() {
        let dir = tempfile::tempdir().expect("test: create tempdir");
        let path = dir.path().join("hub.toml");
        let mut f = std::fs::File::create(&path).expect("test: create file");
        f.write_all(VALID_TOML.as_bytes()).expect("test: write");
        drop(f);

        let config = load_from_file(&path).expect("test: load");
        assert_eq!(config.registry.timeout_ms, 5000);
    }

    #[test]
    fn test_load_from_file_missing_returns_io_error() {
        let err = load_from_file(Path::new("/definitely/not/here/hub.toml"))
            .expect_err("test: must fail");
        assert!(matches!(&err, ConfigError::Io { file, .. } if file.contains("hub.toml")));
    }
}
