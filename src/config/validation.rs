//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`HubConfig`] that cannot be
//! expressed through the type system alone (regex syntax, cross-references
//! between rules, overrides and service configs, non-zero capacities).
//!
//! ## Guarantees
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - File I/O (that belongs to `loader`)

use super::HubConfig;

/// Errors arising from configuration parsing, validation, or I/O.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "routing.rules[0].pattern").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

fn invalid(field: String, value: impl Into<String>, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        field,
        value: value.into(),
        reason: reason.to_string(),
    }
}

/// Validate all semantic constraints on a [`HubConfig`].
///
/// # Returns
///
/// - `Ok(())` if all constraints pass.
/// - `Err(Vec<ConfigError>)` with every violation found.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &HubConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Server ───────────────────────────────────────────────────────
    if config.server.host.trim().is_empty() {
        errors.push(invalid("server.host".into(), "", "host must not be empty"));
    }
    if config.server.max_request_size == 0 {
        errors.push(invalid(
            "server.max_request_size".into(),
            "0",
            "must be at least 1 byte",
        ));
    }

    // ── Registry ─────────────────────────────────────────────────────
    let base = &config.registry.base_url;
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        errors.push(invalid(
            "registry.base_url".into(),
            base.clone(),
            "must be an http(s) URL",
        ));
    }
    if config.registry.timeout_ms == 0 {
        errors.push(invalid(
            "registry.timeout_ms".into(),
            "0",
            "timeout must be at least 1ms",
        ));
    }
    if !config.registry.files_path.starts_with('/') {
        errors.push(invalid(
            "registry.files_path".into(),
            config.registry.files_path.clone(),
            "must start with '/'",
        ));
    }

    // ── Catalog ──────────────────────────────────────────────────────
    for (category, model_type) in &config.catalog.model_types {
        if model_type.trim().is_empty() {
            errors.push(invalid(
                format!("catalog.model_types.{category}"),
                "",
                "remote model type must not be empty",
            ));
        }
    }
    for (i, ext) in config.catalog.extensions.iter().enumerate() {
        if !ext.starts_with('.') {
            errors.push(invalid(
                format!("catalog.extensions[{i}]"),
                ext.clone(),
                "extension must start with '.'",
            ));
        }
    }

    // ── Routing ──────────────────────────────────────────────────────
    for (i, rule) in config.routing.rules.iter().enumerate() {
        if let Err(e) = regex::Regex::new(&rule.pattern) {
            errors.push(ConfigError::InvalidField {
                field: format!("routing.rules[{i}].pattern"),
                value: rule.pattern.clone(),
                reason: format!("invalid regex: {e}"),
            });
        }
        if !config.routing.configs.contains_key(&rule.config) {
            errors.push(invalid(
                format!("routing.rules[{i}].config"),
                rule.config.clone(),
                "no routing config with this key",
            ));
        }
    }

    // Overrides may name families that have no rule yet; they simply never fire.
    for (i, ov) in config.routing.overrides.iter().enumerate() {
        if ov.companions.is_empty() {
            errors.push(invalid(
                format!("routing.overrides[{i}].companions"),
                "[]",
                "at least one companion class type is required",
            ));
        }
        if !ov.route.starts_with('/') {
            errors.push(invalid(
                format!("routing.overrides[{i}].route"),
                ov.route.clone(),
                "must start with '/'",
            ));
        }
    }

    // ── Upload ───────────────────────────────────────────────────────
    if config.upload.queue_capacity == 0 {
        errors.push(invalid(
            "upload.queue_capacity".into(),
            "0",
            "queue capacity must be at least 1",
        ));
    }
    for (i, ext) in config.upload.allowed_extensions.iter().enumerate() {
        if !ext.starts_with('.') {
            errors.push(invalid(
                format!("upload.allowed_extensions[{i}]"),
                ext.clone(),
                "extension must start with '.'",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuleSpec, ServiceSpec};

    fn field_names(errors: &[ConfigError]) -> Vec<String> {
        errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::InvalidField { field, .. } => Some(field.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&HubConfig::default()).is_ok());
    }

    #[test]
    fn test_bad_regex_is_reported_with_index() {
        let mut cfg = HubConfig::default();
        cfg.routing
            .configs
            .insert("sdxl".into(), ServiceSpec::default());
        cfg.routing.rules.push(RuleSpec {
            pattern: "sdxl(".into(),
            config: "sdxl".into(),
        });
        let errors = validate(&cfg).expect_err("test: must fail");
        assert!(field_names(&errors).contains(&"routing.rules[0].pattern".to_string()));
    }

    #[test]
    fn test_rule_with_unknown_config_key_fails() {
        let mut cfg = HubConfig::default();
        cfg.routing.rules.push(RuleSpec {
            pattern: "^sdxl".into(),
            config: "missing".into(),
        });
        let errors = validate(&cfg).expect_err("test: must fail");
        assert!(field_names(&errors).contains(&"routing.rules[0].config".to_string()));
    }

    #[test]
    fn test_validation_collects_multiple_errors() {
        let mut cfg = HubConfig::default();
        cfg.registry.base_url = "ftp://nowhere".into();
        cfg.registry.timeout_ms = 0;
        cfg.upload.queue_capacity = 0;
        cfg.upload.allowed_extensions = vec!["exe".into()];
        let errors = validate(&cfg).expect_err("test: must fail");
        assert!(errors.len() >= 4, "expected >=4 errors, got {}", errors.len());
    }

    #[test]
    fn test_override_without_companions_fails() {
        let mut cfg = HubConfig::default();
        cfg.routing.overrides[0].companions.clear();
        let errors = validate(&cfg).expect_err("test: must fail");
        assert!(field_names(&errors)
            .iter()
            .any(|f| f.ends_with("companions")));
    }

    #[test]
    fn test_error_display_includes_field_and_reason() {
        let err = invalid("upload.queue_capacity".into(), "0", "must be at least 1");
        let text = err.to_string();
        assert!(text.contains("upload.queue_capacity"));
        assert!(text.contains("must be at least 1"));
    }
}
