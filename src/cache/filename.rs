//! Lazily populated `label → real_path` cache per category.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use super::{has_accepted_extension, is_valid_share_id, CacheError, RefreshRegistry};
use crate::config::CatalogSection;
use crate::metrics;
use crate::registry::{FetchOutcome, FilenameEntry, ModelRegistry};

/// One fully populated category snapshot.
#[derive(Debug, Default)]
struct CategoryEntry {
    /// Labels in registry order, deduplicated.
    labels: Vec<String>,
    paths: HashMap<String, String>,
}

impl CategoryEntry {
    fn from_entries(entries: Vec<FilenameEntry>) -> Self {
        let mut snapshot = Self::default();
        for entry in entries {
            if !snapshot.paths.contains_key(&entry.label) {
                snapshot.labels.push(entry.label.clone());
            }
            snapshot.paths.insert(entry.label, entry.real_path);
        }
        snapshot
    }
}

/// Per-category filename cache backed by a [`ModelRegistry`].
///
/// Reads are served from the last snapshot unless the category's refresh flag
/// is set (or the caller forces a refresh), in which case exactly one registry
/// fetch replaces the snapshot wholesale and clears the flag.
///
/// Two concurrent stale reads of the same category may both fetch; the later
/// write wins.
pub struct FilenameCache {
    registry: Arc<dyn ModelRegistry>,
    refresh: Arc<RefreshRegistry>,
    model_types: BTreeMap<String, String>,
    static_files: BTreeMap<String, Vec<String>>,
    extensions: Vec<String>,
    entries: RwLock<HashMap<String, Arc<CategoryEntry>>>,
}

impl FilenameCache {
    /// Build a cache for the categories described by `catalog`.
    pub fn new(
        registry: Arc<dyn ModelRegistry>,
        refresh: Arc<RefreshRegistry>,
        catalog: &CatalogSection,
    ) -> Self {
        Self {
            registry,
            refresh,
            model_types: catalog.model_types.clone(),
            static_files: catalog.static_files.clone(),
            extensions: catalog.extensions.clone(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The refresh flags this cache consults.
    pub fn refresh_registry(&self) -> &Arc<RefreshRegistry> {
        &self.refresh
    }

    /// Remote model type of `category`, if it has one.
    pub fn model_type(&self, category: &str) -> Option<&str> {
        self.model_types.get(category).map(String::as_str)
    }

    /// Category whose remote model type is `model_type`.
    pub fn category_for_model_type(&self, model_type: &str) -> Option<&str> {
        self.model_types
            .iter()
            .find(|(_, t)| t.as_str() == model_type)
            .map(|(c, _)| c.as_str())
    }

    fn filtered<'a>(&self, labels: impl Iterator<Item = &'a String>) -> Vec<String> {
        labels
            .filter(|l| has_accepted_extension(l, &self.extensions))
            .cloned()
            .collect()
    }

    /// List the labels of `category`.
    ///
    /// `refresh = None` consults the [`RefreshRegistry`]. When a fetch is
    /// needed and the registry answers [`FetchOutcome::Empty`], an empty list
    /// is returned, nothing is stored and the flag stays set.
    ///
    /// # Errors
    ///
    /// - [`CacheError::UnknownCategory`] if the category has no remote type.
    /// - [`CacheError::Registry`] if the fetch fails.
    ///
    /// # Panics
    ///
    /// This function never panics.
    #[instrument(skip(self), level = "debug")]
    pub async fn list_files(
        &self,
        category: &str,
        refresh: Option<bool>,
    ) -> Result<Vec<String>, CacheError> {
        let model_type = self
            .model_types
            .get(category)
            .ok_or_else(|| CacheError::UnknownCategory(category.to_string()))?;

        let refresh = refresh.unwrap_or_else(|| self.refresh.get(category));
        if !refresh {
            let cached = self.entries.read().get(category).cloned();
            if let Some(entry) = cached {
                metrics::inc_cache_read(category, "hit");
                return Ok(self.filtered(entry.labels.iter()));
            }
        }

        let outcome = match self.registry.fetch_files(model_type, None).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::inc_cache_read(category, "error");
                return Err(e.into());
            }
        };

        match outcome {
            FetchOutcome::Files(files) => {
                let entry = Arc::new(CategoryEntry::from_entries(files));
                let labels = self.filtered(entry.labels.iter());
                self.entries.write().insert(category.to_string(), entry);
                self.refresh.disable([category]);
                metrics::inc_cache_read(category, "fetch");
                info!(category, count = labels.len(), "category refreshed");
                Ok(labels)
            }
            FetchOutcome::Empty => {
                metrics::inc_cache_read(category, "empty");
                warn!(category, "registry returned no file data");
                Ok(Vec::new())
            }
        }
    }

    /// List the labels a share namespace exposes for `category`.
    ///
    /// Always fetches. Never reads or writes the shared snapshot or the
    /// refresh flags.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidShareId`] if `share_id` is not `[A-Za-z0-9_-]+`.
    /// - Otherwise the same as [`list_files`](Self::list_files).
    pub async fn list_share_files(
        &self,
        category: &str,
        share_id: &str,
    ) -> Result<Vec<String>, CacheError> {
        if !is_valid_share_id(share_id) {
            warn!(category, share_id, "rejected share id");
            return Err(CacheError::InvalidShareId(share_id.to_string()));
        }
        let model_type = self
            .model_types
            .get(category)
            .ok_or_else(|| CacheError::UnknownCategory(category.to_string()))?;

        match self.registry.fetch_files(model_type, Some(share_id)).await? {
            FetchOutcome::Files(files) => {
                let entry = CategoryEntry::from_entries(files);
                Ok(self.filtered(entry.labels.iter()))
            }
            FetchOutcome::Empty => {
                debug!(category, share_id, "share listing empty");
                Ok(Vec::new())
            }
        }
    }

    /// Real path of `label` in the current snapshot of `category`.
    pub fn resolve(&self, category: &str, label: &str) -> Option<String> {
        self.entries
            .read()
            .get(category)
            .and_then(|entry| entry.paths.get(label).cloned())
    }

    /// Remote labels (when the category has a remote type) followed by the
    /// configured static entries, both extension-filtered.
    ///
    /// # Errors
    ///
    /// - [`CacheError::UnknownCategory`] if the category is neither remote nor static.
    /// - [`CacheError::Registry`] if the remote fetch fails.
    pub async fn filename_list(&self, category: &str) -> Result<Vec<String>, CacheError> {
        let statics = self.static_files.get(category);
        if statics.is_none() && !self.model_types.contains_key(category) {
            return Err(CacheError::UnknownCategory(category.to_string()));
        }

        let mut out = if self.model_types.contains_key(category) {
            self.list_files(category, None).await?
        } else {
            Vec::new()
        };
        if let Some(statics) = statics {
            for label in self.filtered(statics.iter()) {
                if !out.contains(&label) {
                    out.push(label);
                }
            }
        }
        Ok(out)
    }
}
