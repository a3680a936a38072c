//! Page-to-worker control channel.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Messages as they arrive on the wire, e.g. `{"type": "SKIP_WAITING"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireMessage {
    SkipWaiting,
    GetCacheInfo,
    ClearCache,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub name: String,
    pub entries: usize,
}

/// Reply to `GET_CACHE_INFO`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub generations: Vec<String>,
    pub stores: Vec<StoreInfo>,
}

impl CacheInfo {
    pub fn total_entries(&self) -> usize {
        self.stores.iter().map(|s| s.entries).sum()
    }
}

#[derive(Debug)]
pub enum ControlMessage {
    SkipWaiting,
    GetCacheInfo { reply: oneshot::Sender<CacheInfo> },
    ClearCache,
}

impl ControlMessage {
    /// Attach a reply port where the wire message expects one.
    pub fn from_wire(message: WireMessage) -> (Self, Option<oneshot::Receiver<CacheInfo>>) {
        match message {
            WireMessage::SkipWaiting => (ControlMessage::SkipWaiting, None),
            WireMessage::ClearCache => (ControlMessage::ClearCache, None),
            WireMessage::GetCacheInfo => {
                let (tx, rx) = oneshot::channel();
                (ControlMessage::GetCacheInfo { reply: tx }, Some(rx))
            }
        }
    }
}
