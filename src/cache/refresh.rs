//! Per-category refresh flags.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use tracing::debug;

/// Flags deciding whether the next read of a category must go to the registry.
///
/// A category never touched by [`enable`](Self::enable) or
/// [`disable`](Self::disable) reports its configured default, and `true` when
/// it has none.
#[derive(Debug, Default)]
pub struct RefreshRegistry {
    defaults: BTreeMap<String, bool>,
    flags: RwLock<HashMap<String, bool>>,
}

impl RefreshRegistry {
    /// Create a registry with the given default table.
    pub fn new(defaults: BTreeMap<String, bool>) -> Self {
        Self {
            defaults,
            flags: RwLock::new(HashMap::new()),
        }
    }

    /// Current flag for `category`.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn get(&self, category: &str) -> bool {
        if let Some(flag) = self.flags.read().get(category) {
            return *flag;
        }
        self.defaults.get(category).copied().unwrap_or(true)
    }

    /// Mark every category in `categories` as stale.
    pub fn enable<I, S>(&self, categories: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_all(categories, true);
    }

    /// Mark every category in `categories` as fresh.
    pub fn disable<I, S>(&self, categories: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_all(categories, false);
    }

    fn set_all<I, S>(&self, categories: I, value: bool)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut flags = self.flags.write();
        for category in categories {
            let category = category.into();
            debug!(category = %category, refresh = value, "refresh flag set");
            flags.insert(category, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RefreshRegistry {
        RefreshRegistry::new(BTreeMap::from([
            ("loras".to_string(), true),
            ("checkpoints".to_string(), false),
        ]))
    }

    #[test]
    fn test_defaults_apply_until_touched() {
        let r = registry();
        assert!(r.get("loras"));
        assert!(!r.get("checkpoints"));
        assert!(r.get("never-configured"));
    }

    #[test]
    fn test_disable_then_enable_round_trips() {
        let r = registry();
        r.disable(["loras"]);
        assert!(!r.get("loras"));
        r.enable(vec!["loras".to_string(), "checkpoints".to_string()]);
        assert!(r.get("loras"));
        assert!(r.get("checkpoints"));
    }

    #[test]
    fn test_mutation_is_idempotent() {
        let r = registry();
        r.disable(["controlnet"]);
        r.disable(["controlnet"]);
        assert!(!r.get("controlnet"));
        r.enable(["controlnet"]);
        r.enable(["controlnet"]);
        assert!(r.get("controlnet"));
    }

    #[test]
    fn test_empty_iterator_is_noop() {
        let r = registry();
        r.enable(Vec::<String>::new());
        assert!(!r.get("checkpoints"));
    }
}
