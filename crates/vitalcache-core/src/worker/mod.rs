//! Network-boundary cache worker.
//!
//! The worker intercepts every outgoing request from the page, classifies it
//! by URL shape and applies a per-class strategy:
//! - Static assets: cache-first
//! - Data endpoints: network-first, falling back to the stored copy
//! - Document navigations: network-first, falling back to the app shell
//! - Everything else: network, cache only as a last resort
//!
//! It runs inside a `WorkerHost` task, independent of any page, and its cache
//! generations are managed by `CacheLifecycleController`.

pub mod cache_worker;
pub mod classify;
pub mod host;
pub mod lifecycle;
pub mod message;

pub use cache_worker::{FetchOutcome, NetworkCacheWorker, ResponseSource};
pub use classify::{Classifier, RequestClass};
pub use host::{WorkerHandle, WorkerHost};
pub use lifecycle::{CacheGeneration, CacheLifecycleController, LifecycleEvent, WorkerState};
pub use message::{CacheInfo, ControlMessage, StoreInfo, WireMessage};
