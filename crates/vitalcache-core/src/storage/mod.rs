//! Named cache stores owned by the network worker.
//!
//! A store is a flat map from `RequestKey` to `CachedResponse`. Stores are
//! created on first write and deleted wholesale when their generation is
//! garbage collected. Two backends are provided:
//! - `MemoryStorage`: process-local, used by tests and short-lived hosts
//! - `DiskStorage`: one directory per store, one JSON file per entry

pub mod disk;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::http::{RequestKey, Response};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

mod body_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(body: &[u8], s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub request_key: RequestKey,
    pub headers: std::collections::BTreeMap<String, String>,
    /// Base64 in the serialized form
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Snapshot a successful response. Callers must only pass status-200 responses.
    pub fn from_response(request_key: RequestKey, response: &Response, stored_at: DateTime<Utc>) -> Self {
        Self {
            request_key,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at,
        }
    }

    pub fn to_response(&self) -> Response {
        Response {
            status: 200,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

pub trait CacheStorage: Send + Sync {
    /// Names of every store currently present.
    fn store_names(&self) -> Result<Vec<String>>;

    /// Create the store if it does not exist yet.
    fn open(&self, store: &str) -> Result<()>;

    /// Returns whether a store was actually removed.
    fn delete_store(&self, store: &str) -> Result<bool>;

    fn get(&self, store: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

    /// Insert or overwrite. Creates the store if needed.
    fn put(&self, store: &str, entry: CachedResponse) -> Result<()>;

    fn entry_count(&self, store: &str) -> Result<usize>;

    fn clear(&self, store: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_body_serialized_as_base64() {
        let url = Url::parse("https://records.example.com/icons/icon-192.png").unwrap();
        let cached = CachedResponse::from_response(
            RequestKey::new("GET", &url),
            &Response::ok(vec![0x89, b'P', b'N', b'G']),
            Utc::now(),
        );

        let json: serde_json::Value = serde_json::to_value(&cached).unwrap();
        assert_eq!(json["body"], "iVBORw==");

        let back: CachedResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back.body, vec![0x89, b'P', b'N', b'G']);
    }
}
