mod key;

pub use key::CacheKey;

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::debug;

use crate::config::CacheConfig;
use crate::converter::Conversion;
use crate::document::Document;
use crate::error::{Error, Result};

struct Entries {
    values: HashMap<CacheKey, Conversion>,
    /// Keys in insertion order, oldest first
    order: VecDeque<CacheKey>,
}

/// Memo cache in front of the document converter.
///
/// Eviction is strictly by insertion order: once `capacity` is exceeded the
/// oldest inserted entry goes first, however recently it was read.
pub struct ConvertCache {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl ConvertCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                values: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Entries>> {
        self.entries
            .lock()
            .map_err(|e| Error::Cache(format!("lock poisoned: {e}")))
    }

    /// Get a cached conversion
    pub fn get(&self, document: &Document, engine: &str, config_hash: &str) -> Result<Option<Conversion>> {
        let key = CacheKey::for_document(document, engine, config_hash);
        let hit = self.lock()?.values.get(&key).cloned();
        debug!("Convert cache {} for {}", if hit.is_some() { "hit" } else { "miss" }, key);
        Ok(hit)
    }

    /// Store a conversion; re-inserting a key replaces the value but keeps its age
    pub fn put(&self, document: &Document, engine: &str, config_hash: &str, conversion: Conversion) -> Result<()> {
        if self.capacity == 0 {
            return Ok(());
        }
        let key = CacheKey::for_document(document, engine, config_hash);
        let mut entries = self.lock()?;

        if entries.values.insert(key.clone(), conversion).is_none() {
            entries.order.push_back(key);
            while entries.order.len() > self.capacity {
                if let Some(oldest) = entries.order.pop_front() {
                    debug!("Evicting {} from convert cache", oldest);
                    entries.values.remove(&oldest);
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().map_or(0, |e| e.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear all entries
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.lock()?;
        entries.values.clear();
        entries.order.clear();
        Ok(())
    }
}

impl Default for ConvertCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> Document {
        Document::from_bytes(content.to_string(), ".pdf", None)
    }

    fn conversion(content: &str) -> Conversion {
        Conversion::new(Document::from_bytes(content.to_string(), ".md", None))
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = ConvertCache::new(2);
        assert!(cache.get(&doc("a"), "identity", "").unwrap().is_none());

        cache.put(&doc("a"), "identity", "", conversion("# a")).unwrap();
        let hit = cache.get(&doc("a"), "identity", "").unwrap().unwrap();
        assert_eq!(hit.document.content().as_ref(), b"# a");
        assert!(cache.get(&doc("a"), "other", "").unwrap().is_none());
    }

    #[test]
    fn test_fifo_eviction_of_first_inserted() {
        let cache = ConvertCache::new(3);
        for name in ["a", "b", "c"] {
            cache.put(&doc(name), "e", "", conversion(name)).unwrap();
        }
        // Reading "a" does not refresh it
        assert!(cache.get(&doc("a"), "e", "").unwrap().is_some());

        cache.put(&doc("d"), "e", "", conversion("d")).unwrap();
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&doc("a"), "e", "").unwrap().is_none());
        for name in ["b", "c", "d"] {
            assert!(cache.get(&doc(name), "e", "").unwrap().is_some());
        }
    }

    #[test]
    fn test_reinsert_keeps_age() {
        let cache = ConvertCache::new(2);
        cache.put(&doc("a"), "e", "", conversion("1")).unwrap();
        cache.put(&doc("b"), "e", "", conversion("b")).unwrap();
        cache.put(&doc("a"), "e", "", conversion("2")).unwrap();
        cache.put(&doc("c"), "e", "", conversion("c")).unwrap();

        assert!(cache.get(&doc("a"), "e", "").unwrap().is_none());
        assert!(cache.get(&doc("b"), "e", "").unwrap().is_some());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = ConvertCache::new(0);
        cache.put(&doc("a"), "e", "", conversion("a")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = ConvertCache::default();
        assert_eq!(cache.capacity(), 10);
        cache.put(&doc("a"), "e", "", conversion("a")).unwrap();
        cache.clear().unwrap();
        assert!(cache.is_empty());
    }
}
