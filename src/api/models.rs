//! Validation of model create/update/query requests.
//!
//! Every check here runs before any registry call, so a rejected draft never
//! reaches the network.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::json;

use super::{ErrorBody, ErrorCode};
use crate::registry::{ModelDraft, Page, QueryMode};

fn blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Check a create/update body against the accepted model types.
///
/// Checks run in order: name, type, versions list, then per version the
/// duplicate check, the version name, and `base_model`, `path`, `sign`.
///
/// # Errors
///
/// Returns the envelope of the first failing check.
///
/// # Panics
///
/// This function never panics.
pub fn validate_draft(draft: &ModelDraft, accepted_types: &[String]) -> Result<(), ErrorBody> {
    let name = draft.name.as_deref();
    if blank(name) {
        return Err(ErrorBody::new(ErrorCode::EmptyModelName));
    }
    if name.is_some_and(|n| n.contains('/')) {
        return Err(ErrorBody::new(ErrorCode::InvalidModelName));
    }

    match draft.model_type.as_deref() {
        Some(t) if accepted_types.iter().any(|a| a == t) => {}
        other => {
            return Err(ErrorBody::new(ErrorCode::InvalidModelType)
                .with_data(json!({"type": other, "accepted": accepted_types})))
        }
    }

    let versions = draft
        .versions
        .as_ref()
        .ok_or_else(|| ErrorBody::new(ErrorCode::InvalidVersions))?;

    let mut seen: HashSet<Option<&str>> = HashSet::new();
    for version in versions {
        let name = version.version.as_deref();
        if seen.contains(&name) {
            return Err(ErrorBody::new(ErrorCode::DuplicateVersion).with_data(json!({"version": name})));
        }
        if blank(name) {
            return Err(ErrorBody::new(ErrorCode::EmptyVersion));
        }
        if name.is_some_and(|n| n.contains('/')) {
            return Err(ErrorBody::new(ErrorCode::InvalidVersionName).with_data(json!({"version": name})));
        }
        seen.insert(name);

        let fields = [
            ("base_model", version.base_model.as_deref(), ErrorCode::EmptyBaseModel),
            ("path", version.path.as_deref(), ErrorCode::EmptyVersionPath),
            ("sign", version.sign.as_deref(), ErrorCode::EmptySign),
        ];
        for (field, value, code) in fields {
            if blank(value) {
                return Err(ErrorBody::new(code).with_data(json!({"version": name, "field": field})));
            }
        }
    }
    Ok(())
}

/// Raw query string of the model query endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    /// Listing mode.
    #[serde(default)]
    pub mode: Option<String>,
    /// 1-based page, default 1.
    #[serde(default)]
    pub current: Option<u32>,
    /// Page size, default 10.
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl QueryParams {
    /// Validate mode and paging.
    ///
    /// # Errors
    ///
    /// - [`ErrorCode::InvalidQueryMode`] if `mode` is missing or unknown.
    /// - [`ErrorCode::InvalidPage`] if `current` or `page_size` is zero.
    pub fn parse(&self) -> Result<(QueryMode, Page), ErrorBody> {
        let mode = self
            .mode
            .as_deref()
            .unwrap_or_default()
            .parse::<QueryMode>()
            .map_err(|e| ErrorBody::new(ErrorCode::InvalidQueryMode).with_data(json!(e)))?;

        let defaults = Page::default();
        let page = Page {
            current: self.current.unwrap_or(defaults.current),
            page_size: self.page_size.unwrap_or(defaults.page_size),
        };
        if page.current == 0 || page.page_size == 0 {
            return Err(ErrorBody::new(ErrorCode::InvalidPage));
        }
        Ok((mode, page))
    }
}

/// Parse a positive integer path id.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidModelId`] for zero, negatives and non-numbers.
pub fn parse_id(raw: &str) -> Result<u64, ErrorBody> {
    match raw.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ErrorBody::new(ErrorCode::InvalidModelId).with_data(json!({"id": raw}))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelVersion;

    fn accepted() -> Vec<String> {
        vec!["LoRA".into(), "Controlnet".into()]
    }

    fn version(name: &str) -> ModelVersion {
        ModelVersion {
            version: Some(name.into()),
            base_model: Some("FLUX.1".into()),
            path: Some("uploads/a.safetensors".into()),
            sign: Some("abc".into()),
            ..ModelVersion::default()
        }
    }

    fn draft(versions: Vec<ModelVersion>) -> ModelDraft {
        ModelDraft {
            name: Some("my-model".into()),
            model_type: Some("LoRA".into()),
            versions: Some(versions),
        }
    }

    fn code_of(result: Result<(), ErrorBody>) -> u32 {
        result.expect_err("test: must fail").code
    }

    #[test]
    fn test_valid_draft_passes() {
        assert!(validate_draft(&draft(vec![version("v1"), version("v2")]), &accepted()).is_ok());
    }

    #[test]
    fn test_name_checks() {
        let mut d = draft(vec![version("v1")]);
        d.name = Some("  ".into());
        assert_eq!(code_of(validate_draft(&d, &accepted())), ErrorCode::EmptyModelName.code());
        d.name = Some("a/b".into());
        assert_eq!(code_of(validate_draft(&d, &accepted())), ErrorCode::InvalidModelName.code());
    }

    #[test]
    fn test_unaccepted_type_fails() {
        let mut d = draft(vec![version("v1")]);
        d.model_type = Some("Checkpoint".into());
        assert_eq!(code_of(validate_draft(&d, &accepted())), ErrorCode::InvalidModelType.code());
    }

    #[test]
    fn test_missing_versions_fails() {
        let mut d = draft(vec![]);
        d.versions = None;
        assert_eq!(code_of(validate_draft(&d, &accepted())), ErrorCode::InvalidVersions.code());
    }

    #[test]
    fn test_duplicate_version_fails() {
        let d = draft(vec![version("v1"), version("v1")]);
        assert_eq!(code_of(validate_draft(&d, &accepted())), ErrorCode::DuplicateVersion.code());
    }

    #[test]
    fn test_version_field_checks_name_the_field() {
        let mut v = version("v1");
        v.sign = Some(String::new());
        let err = validate_draft(&draft(vec![v]), &accepted()).expect_err("test: must fail");
        assert_eq!(err.code, ErrorCode::EmptySign.code());
        assert_eq!(err.data["field"], "sign");

        let mut v = version("v/1");
        v.path = None;
        assert_eq!(
            code_of(validate_draft(&draft(vec![v]), &accepted())),
            ErrorCode::InvalidVersionName.code()
        );
    }

    #[test]
    fn test_query_params_defaults_and_mode() {
        let params = QueryParams {
            mode: Some("my_fork".into()),
            ..QueryParams::default()
        };
        let (mode, page) = params.parse().expect("test: parse");
        assert_eq!(mode, QueryMode::MyFork);
        assert_eq!(page, Page::default());

        let bad = QueryParams {
            mode: Some("everyone".into()),
            ..QueryParams::default()
        };
        assert_eq!(
            bad.parse().expect_err("test: must fail").code,
            ErrorCode::InvalidQueryMode.code()
        );
        assert!(QueryParams::default().parse().is_err());
    }

    #[test]
    fn test_parse_id_rejects_zero_and_garbage() {
        assert_eq!(parse_id("42").expect("test: id"), 42);
        assert!(parse_id("0").is_err());
        assert!(parse_id("-3").is_err());
        assert!(parse_id("abc").is_err());
    }
}
