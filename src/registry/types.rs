//! Request types exchanged with the registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One version of a model being created or updated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Version name, unique within the model; must not contain `/`.
    #[serde(default)]
    pub version: Option<String>,
    /// Base-model identifier (e.g. `"FLUX.1"`).
    #[serde(default)]
    pub base_model: Option<String>,
    /// Uploaded object path.
    #[serde(default)]
    pub path: Option<String>,
    /// Content signature of the uploaded file.
    #[serde(default)]
    pub sign: Option<String>,
    /// Optional free-form fields forwarded as-is (intro, cover urls, …).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of the create/update model endpoints.
///
/// Every field is optional at the type level so that missing values surface
/// as the dedicated validation error instead of a generic decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDraft {
    /// Model name; must not contain `/`.
    #[serde(default)]
    pub name: Option<String>,
    /// Model type, one of the accepted types.
    #[serde(default, rename = "type")]
    pub model_type: Option<String>,
    /// Versions; `None` when the field is absent or not a list.
    #[serde(default, deserialize_with = "versions_or_none")]
    pub versions: Option<Vec<ModelVersion>>,
}

fn versions_or_none<'de, D>(de: D) -> Result<Option<Vec<ModelVersion>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(de)?;
    match raw {
        serde_json::Value::Array(_) => serde_json::from_value(raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

/// Listing mode of the model query endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Models owned by the caller.
    My,
    /// Models the caller forked.
    MyFork,
    /// Public community models.
    Publicity,
}

impl QueryMode {
    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::My => "my",
            Self::MyFork => "my_fork",
            Self::Publicity => "publicity",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "my" => Ok(Self::My),
            "my_fork" => Ok(Self::MyFork),
            "publicity" => Ok(Self::Publicity),
            other => Err(format!("unknown query mode '{other}'")),
        }
    }
}

/// Pagination cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub current: u32,
    /// Entries per page.
    pub page_size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            current: 1,
            page_size: 10,
        }
    }
}

/// Body of the model query endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelQuery {
    /// Free-text keyword; may be empty.
    #[serde(default)]
    pub keyword: String,
    /// Restrict to these model types.
    #[serde(default)]
    pub model_types: Vec<String>,
    /// Restrict to these base models.
    #[serde(default)]
    pub base_models: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_mode_parses_exactly_three_modes() {
        assert_eq!("my".parse::<QueryMode>(), Ok(QueryMode::My));
        assert_eq!("my_fork".parse::<QueryMode>(), Ok(QueryMode::MyFork));
        assert_eq!("publicity".parse::<QueryMode>(), Ok(QueryMode::Publicity));
        assert!("MY".parse::<QueryMode>().is_err());
        assert!("".parse::<QueryMode>().is_err());
    }

    #[test]
    fn test_draft_with_non_list_versions_decodes_as_none() {
        let draft: ModelDraft =
            serde_json::from_value(json!({"name": "m", "type": "LoRA", "versions": "v1"}))
                .expect("test: draft");
        assert_eq!(draft.versions, None);
        assert_eq!(draft.model_type.as_deref(), Some("LoRA"));
    }

    #[test]
    fn test_draft_serializes_type_field_name() {
        let draft = ModelDraft {
            name: Some("m".into()),
            model_type: Some("LoRA".into()),
            versions: Some(vec![]),
        };
        let value = serde_json::to_value(&draft).expect("test: ser");
        assert_eq!(value["type"], "LoRA");
    }

    #[test]
    fn test_model_query_optional_lists_default_empty() {
        let query: ModelQuery =
            serde_json::from_value(json!({"keyword": "flux"})).expect("test: query");
        assert!(query.model_types.is_empty());
        assert!(query.base_models.is_empty());
    }
}
