//! Process-local cache store.

use super::{CacheEntry, CacheStore};
use crate::budget::ProviderClass;
use crate::error::CacheError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type Entries = HashMap<(ProviderClass, String), CacheEntry>;

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<RwLock<Entries>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, category: ProviderClass, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(&(category, key.to_string())).cloned())
    }

    fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.insert((entry.category, entry.key.clone()), entry.clone());
        Ok(())
    }

    fn remove(&self, category: ProviderClass, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.remove(&(category, key.to_string()));
        Ok(())
    }

    fn clear(&self, category: Option<ProviderClass>) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        let before = entries.len();
        match category {
            Some(category) => entries.retain(|(c, _), _| *c != category),
            None => entries.clear(),
        }
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::SystemTime;

    fn entry(category: ProviderClass, key: &str) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            category,
            payload: json!({ "k": key }),
            written_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_store_load_remove() {
        let store = MemoryCacheStore::new();
        store.store(&entry(ProviderClass::Search, "a")).unwrap();
        let loaded = store.load(ProviderClass::Search, "a").unwrap().unwrap();
        assert_eq!(loaded.payload, json!({ "k": "a" }));
        assert!(store.load(ProviderClass::Answer, "a").unwrap().is_none());

        store.remove(ProviderClass::Search, "a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_by_category() {
        let store = MemoryCacheStore::new();
        store.store(&entry(ProviderClass::Search, "a")).unwrap();
        store.store(&entry(ProviderClass::Search, "b")).unwrap();
        store.store(&entry(ProviderClass::LanguageModel, "c")).unwrap();

        assert_eq!(store.clear(Some(ProviderClass::Search)).unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.clear(None).unwrap(), 1);
    }

    #[test]
    fn test_clones_share_entries() {
        let store = MemoryCacheStore::new();
        let other = store.clone();
        store.store(&entry(ProviderClass::Answer, "x")).unwrap();
        assert_eq!(other.len(), 1);
    }
}
