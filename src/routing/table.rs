//! Compiled routing table.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use thiserror::Error;

use crate::config::RoutingSection;

/// Errors raised while compiling a [`RoutingSection`].
#[derive(Debug, Error)]
pub enum RoutingError {
    /// A rule pattern is not a valid regex.
    #[error("routing rule {index} has invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Position of the rule in the table.
        index: usize,
        /// The offending pattern.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// A rule references a config key that does not exist.
    #[error("routing rule {index} references unknown config '{key}'")]
    UnknownConfig {
        /// Position of the rule in the table.
        index: usize,
        /// The dangling key.
        key: String,
    },
}

/// `pattern → config key`, matched at the start of a lowercased model name.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pattern: Regex,
    config_key: String,
}

impl RoutingRule {
    /// Compile a rule; the pattern is anchored at the start of the value.
    ///
    /// # Errors
    ///
    /// Returns the regex error if `pattern` does not compile.
    pub fn new(pattern: &str, config_key: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(&format!("^(?:{pattern})"))?,
            config_key: config_key.into(),
        })
    }

    /// `true` if the rule matches `value` (already lowercased).
    pub fn matches(&self, value: &str) -> bool {
        self.pattern.is_match(value)
    }

    /// The config key this rule selects.
    pub fn config_key(&self) -> &str {
        &self.config_key
    }
}

/// Service address bundle for one model family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Compute service base address.
    pub service_address: String,
    /// Route of the generic endpoint.
    pub route: String,
}

impl ServiceConfig {
    /// `service_address + route`.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.service_address, self.route)
    }
}

/// Companion-triggered endpoint override for one config key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointOverride {
    /// Config key the override refines.
    pub config_key: String,
    /// Any of these class types being present triggers the override.
    pub companions: Vec<String>,
    /// Route appended to the config's service address.
    pub route: String,
    /// Inputs forced on the loader node when the override fires.
    pub inputs: BTreeMap<String, String>,
}

/// Immutable table of rules, service configs and overrides.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    rules: Vec<RoutingRule>,
    configs: HashMap<String, ServiceConfig>,
    overrides: Vec<EndpointOverride>,
}

impl RoutingTable {
    /// Compile the `[routing]` section.
    ///
    /// Configs without a `service_address` inherit `default_service_address`.
    ///
    /// # Errors
    ///
    /// - [`RoutingError::InvalidPattern`] if a rule's regex fails to compile.
    /// - [`RoutingError::UnknownConfig`] if a rule names a missing config.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn from_config(section: &RoutingSection) -> Result<Self, RoutingError> {
        let configs: HashMap<String, ServiceConfig> = section
            .configs
            .iter()
            .map(|(key, spec)| {
                let service_address = spec
                    .service_address
                    .clone()
                    .unwrap_or_else(|| section.default_service_address.clone());
                (
                    key.clone(),
                    ServiceConfig {
                        service_address,
                        route: spec.route.clone(),
                    },
                )
            })
            .collect();

        let mut rules = Vec::with_capacity(section.rules.len());
        for (index, spec) in section.rules.iter().enumerate() {
            if !configs.contains_key(&spec.config) {
                return Err(RoutingError::UnknownConfig {
                    index,
                    key: spec.config.clone(),
                });
            }
            let rule = RoutingRule::new(&spec.pattern, spec.config.clone()).map_err(|source| {
                RoutingError::InvalidPattern {
                    index,
                    pattern: spec.pattern.clone(),
                    source,
                }
            })?;
            rules.push(rule);
        }

        let overrides = section
            .overrides
            .iter()
            .map(|o| EndpointOverride {
                config_key: o.config.clone(),
                companions: o.companions.clone(),
                route: o.route.clone(),
                inputs: o.inputs.clone(),
            })
            .collect();

        Ok(Self {
            rules,
            configs,
            overrides,
        })
    }

    /// Config key of the first rule matching `value` (already lowercased).
    pub fn match_config(&self, value: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.matches(value))
            .map(RoutingRule::config_key)
    }

    /// Service config registered under `key`.
    pub fn service(&self, key: &str) -> Option<&ServiceConfig> {
        self.configs.get(key)
    }

    /// Overrides refining `key`, in table order.
    pub fn overrides_for<'a>(
        &'a self,
        key: &'a str,
    ) -> impl Iterator<Item = &'a EndpointOverride> + 'a {
        self.overrides.iter().filter(move |o| o.config_key == key)
    }

    /// Number of compiled rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuleSpec, ServiceSpec};

    fn section() -> RoutingSection {
        let mut section = RoutingSection::default();
        section.rules = vec![
            RuleSpec {
                pattern: "flux1-dev".into(),
                config: "flux-dev".into(),
            },
            RuleSpec {
                pattern: "flux".into(),
                config: "flux-other".into(),
            },
        ];
        section.configs.insert(
            "flux-dev".into(),
            ServiceSpec {
                service_address: Some("https://dev.example.com".into()),
                route: "/supernode/flux-dev".into(),
            },
        );
        section.configs.insert(
            "flux-other".into(),
            ServiceSpec {
                service_address: None,
                route: "/supernode/flux".into(),
            },
        );
        section
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let table = RoutingTable::from_config(&section()).expect("test: table");
        assert_eq!(table.match_config("flux1-dev.safetensors"), Some("flux-dev"));
        assert_eq!(table.match_config("flux1-schnell.sft"), Some("flux-other"));
    }

    #[test]
    fn test_rules_are_anchored_at_start() {
        let table = RoutingTable::from_config(&section()).expect("test: table");
        assert_eq!(table.match_config("my-flux1-dev.safetensors"), None);
    }

    #[test]
    fn test_missing_service_address_uses_default() {
        let table = RoutingTable::from_config(&section()).expect("test: table");
        let svc = table.service("flux-other").expect("test: config");
        assert_eq!(svc.endpoint(), "http://localhost:9000/supernode/flux");
    }

    #[test]
    fn test_dangling_rule_config_is_rejected() {
        let mut bad = section();
        bad.rules.push(RuleSpec {
            pattern: "sd3".into(),
            config: "sd3".into(),
        });
        let err = RoutingTable::from_config(&bad).expect_err("test: must fail");
        assert!(matches!(err, RoutingError::UnknownConfig { index: 2, .. }));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let mut bad = section();
        bad.rules[0].pattern = "flux(".into();
        let err = RoutingTable::from_config(&bad).expect_err("test: must fail");
        assert!(matches!(err, RoutingError::InvalidPattern { index: 0, .. }));
    }

    #[test]
    fn test_overrides_for_preserves_order() {
        let table = RoutingTable::from_config(&section()).expect("test: table");
        let routes: Vec<&str> = table
            .overrides_for("flux-dev")
            .map(|o| o.route.as_str())
            .collect();
        assert_eq!(
            routes,
            vec![
                "/supernode/bizyair-flux-dev-comfy-pulid",
                "/supernode/flux-dev-bizyair-comfy-ksampler-fp8-v2"
            ]
        );
        assert_eq!(table.overrides_for("flux-other").count(), 0);
    }
}
