use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{CacheError, Result};
use crate::http::RequestKey;

use super::{CacheStorage, CachedResponse};

type Store = HashMap<RequestKey, CachedResponse>;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    stores: RwLock<HashMap<String, Store>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> CacheError {
        CacheError::Storage("memory storage lock poisoned".to_string())
    }
}

impl CacheStorage for MemoryStorage {
    fn store_names(&self) -> Result<Vec<String>> {
        let stores = self.stores.read().map_err(|_| Self::poisoned())?;
        let mut names: Vec<String> = stores.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn open(&self, store: &str) -> Result<()> {
        let mut stores = self.stores.write().map_err(|_| Self::poisoned())?;
        stores.entry(store.to_string()).or_default();
        Ok(())
    }

    fn delete_store(&self, store: &str) -> Result<bool> {
        let mut stores = self.stores.write().map_err(|_| Self::poisoned())?;
        Ok(stores.remove(store).is_some())
    }

    fn get(&self, store: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
        let stores = self.stores.read().map_err(|_| Self::poisoned())?;
        Ok(stores.get(store).and_then(|s| s.get(key)).cloned())
    }

    fn put(&self, store: &str, entry: CachedResponse) -> Result<()> {
        let mut stores = self.stores.write().map_err(|_| Self::poisoned())?;
        stores
            .entry(store.to_string())
            .or_default()
            .insert(entry.request_key.clone(), entry);
        Ok(())
    }

    fn entry_count(&self, store: &str) -> Result<usize> {
        let stores = self.stores.read().map_err(|_| Self::poisoned())?;
        Ok(stores.get(store).map(|s| s.len()).unwrap_or(0))
    }

    fn clear(&self, store: &str) -> Result<()> {
        let mut stores = self.stores.write().map_err(|_| Self::poisoned())?;
        if let Some(s) = stores.get_mut(store) {
            s.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Response;
    use chrono::Utc;
    use url::Url;

    fn entry(path: &str, body: &str) -> CachedResponse {
        let url = Url::parse("https://records.example.com").unwrap().join(path).unwrap();
        CachedResponse::from_response(
            RequestKey::new("GET", &url),
            &Response::ok(body),
            Utc::now(),
        )
    }

    #[test]
    fn test_put_creates_store_and_overwrites() {
        let storage = MemoryStorage::new();
        storage.put("a", entry("/x", "one")).unwrap();
        storage.put("a", entry("/x", "two")).unwrap();

        assert_eq!(storage.store_names().unwrap(), vec!["a".to_string()]);
        assert_eq!(storage.entry_count("a").unwrap(), 1);
        let key = entry("/x", "").request_key;
        assert_eq!(storage.get("a", &key).unwrap().unwrap().body, b"two");
    }

    #[test]
    fn test_delete_store() {
        let storage = MemoryStorage::new();
        storage.open("a").unwrap();
        assert!(storage.delete_store("a").unwrap());
        assert!(!storage.delete_store("a").unwrap());
        assert!(storage.store_names().unwrap().is_empty());
    }
}
