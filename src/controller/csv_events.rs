//! CSV → Addon event remap table.
//!
//! ClusterServiceVersions carry no owner reference back to the Addon that
//! produced them, so CSV watch events are remapped through this table. The
//! Subscription phase installs the mapping; deletion frees it.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Namespaced key of a ClusterServiceVersion
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CsvKey {
    pub namespace: String,
    pub name: String,
}

impl CsvKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Default)]
struct Indices {
    by_addon: HashMap<String, HashSet<CsvKey>>,
    by_csv: HashMap<CsvKey, String>,
}

/// Concurrency-safe two-way index between Addons and the CSVs they produced.
#[derive(Default)]
pub struct CsvEventTable {
    inner: RwLock<Indices>,
}

impl CsvEventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the mapping for `addon` with the given keys.
    ///
    /// Returns whether the reverse index changed. A change means CSV events
    /// may have been observed before the mapping existed, so the caller must
    /// retry the addon to close the gap.
    pub fn replace_map(&self, addon: &str, keys: &[CsvKey]) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        let new_set: HashSet<CsvKey> = keys.iter().cloned().collect();
        let old_set = inner.by_addon.get(addon).cloned().unwrap_or_default();
        if new_set == old_set {
            return false;
        }

        for key in old_set.difference(&new_set) {
            inner.by_csv.remove(key);
        }
        for key in new_set.iter() {
            inner.by_csv.insert(key.clone(), addon.to_string());
        }
        inner.by_addon.insert(addon.to_string(), new_set);
        true
    }

    /// Drop all entries for this addon.
    pub fn free(&self, addon: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(keys) = inner.by_addon.remove(addon) {
            for key in keys {
                inner.by_csv.remove(&key);
            }
        }
    }

    /// Addon mapped to a CSV, consulted on every CSV watch event.
    pub fn addon_for(&self, key: &CsvKey) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_csv.get(key).cloned()
    }
}
