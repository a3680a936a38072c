use std::io::Write;
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::http::RequestKey;

use super::{CacheStorage, CachedResponse};

/// File-backed stores: `<cache_dir>/<store>/<sha256(key)>.json`.
pub struct DiskStorage {
    cache_dir: PathBuf,
}

impl DiskStorage {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    fn store_path(&self, store: &str) -> Result<PathBuf> {
        if store.is_empty() || store.contains(['/', '\\']) || store.starts_with('.') {
            return Err(CacheError::Storage(format!("invalid store name: {:?}", store)));
        }
        Ok(self.cache_dir.join(store))
    }

    fn entry_path(&self, store: &str, key: &RequestKey) -> Result<PathBuf> {
        // SHA256 hash for stable, fixed-length file names
        let mut hasher = Sha256::new();
        hasher.update(key.as_str().as_bytes());
        let name = hex::encode(hasher.finalize());
        Ok(self.store_path(store)?.join(format!("{}.json", name)))
    }
}

impl CacheStorage for DiskStorage {
    fn store_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn open(&self, store: &str) -> Result<()> {
        std::fs::create_dir_all(self.store_path(store)?)?;
        Ok(())
    }

    fn delete_store(&self, store: &str) -> Result<bool> {
        let path = self.store_path(store)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&path)?;
        debug!(store, "Deleted cache store");
        Ok(true)
    }

    fn get(&self, store: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
        let path = self.entry_path(store, key)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<CachedResponse>(&contents) {
            Ok(cached) if &cached.request_key == key => Ok(Some(cached)),
            Ok(_) => Ok(None),
            Err(e) => {
                // A torn write is treated as a miss rather than poisoning the store
                warn!(store, key = %key, error = %e, "Failed to parse cache entry");
                Ok(None)
            }
        }
    }

    fn put(&self, store: &str, entry: CachedResponse) -> Result<()> {
        self.open(store)?;
        let path = self.entry_path(store, &entry.request_key)?;
        let contents = serde_json::to_string_pretty(&entry)?;
        // Each writer gets its own temp file; the last rename wins
        let mut tmp = NamedTempFile::new_in(self.store_path(store)?)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.persist(&path).map_err(|e| CacheError::from(e.error))?;
        Ok(())
    }

    fn entry_count(&self, store: &str) -> Result<usize> {
        let path = self.store_path(store)?;
        if !path.exists() {
            return Ok(0);
        }
        let mut count = 0;
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }

    fn clear(&self, store: &str) -> Result<()> {
        if self.delete_store(store)? {
            self.open(store)?;
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

    fn key(path: &str) -> RequestKey {
        let url = Url::parse("https://records.example.com").unwrap().join(path).unwrap();
        RequestKey::new("GET", &url)
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        let response = Response::ok("{\"records\":[]}").with_header("content-type", "application/json");
        let cached = CachedResponse::from_response(key("/api/records"), &response, Utc::now());

        storage.put("vitalcache-dynamic-v1", cached.clone()).unwrap();

        let loaded = storage.get("vitalcache-dynamic-v1", &key("/api/records")).unwrap();
        assert_eq!(loaded, Some(cached));
        assert_eq!(storage.entry_count("vitalcache-dynamic-v1").unwrap(), 1);
        assert!(storage.get("vitalcache-dynamic-v1", &key("/api/other")).unwrap().is_none());
    }

    #[test]
    fn test_store_names_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        storage.open("b").unwrap();
        storage.open("a").unwrap();
        assert_eq!(storage.store_names().unwrap(), vec!["a", "b"]);

        assert!(storage.delete_store("a").unwrap());
        assert_eq!(storage.store_names().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_rejects_path_like_store_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        assert!(storage.open("../escape").is_err());
        assert!(storage.open("").is_err());
    }

    #[test]
    fn test_concurrent_puts_to_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();

        let failures: usize = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|n| {
                    let storage = &storage;
                    scope.spawn(move || {
                        (0..100)
                            .filter(|i| {
                                let body = format!("{{\"writer\":{},\"round\":{}}}", n, i);
                                let cached = CachedResponse::from_response(
                                    key("/api/records"),
                                    &Response::ok(body),
                                    Utc::now(),
                                );
                                storage.put("vitalcache-dynamic-v1", cached).is_err()
                            })
                            .count()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).sum()
        });

        assert_eq!(failures, 0);
        assert_eq!(storage.entry_count("vitalcache-dynamic-v1").unwrap(), 1);
        assert!(storage
            .get("vitalcache-dynamic-v1", &key("/api/records"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_clear_keeps_store() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        let cached = CachedResponse::from_response(key("/api/a"), &Response::ok("a"), Utc::now());
        storage.put("s", cached).unwrap();
        storage.clear("s").unwrap();
        assert_eq!(storage.store_names().unwrap(), vec!["s"]);
        assert_eq!(storage.entry_count("s").unwrap(), 0);
    }
}
