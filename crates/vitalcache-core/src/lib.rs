//! Caching and offline-resilience layer for the health-records client.
//!
//! - `worker`: request interception with per-class cache strategies and a
//!   versioned install/activate lifecycle
//! - `auth`: short-TTL cache of the session verification decision
//! - `geo`: last known location with background refresh
//! - `prefetch`: route warm-up driven by a static adjacency table
//! - `hydration`: gate that keeps cache-dependent UI out of the first render
//! - `runtime`: page-side glue between the above and the router

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod geo;
pub mod http;
pub mod hydration;
pub mod prefetch;
pub mod runtime;
pub mod storage;
pub mod worker;

#[cfg(test)]
mod testing;

pub use auth::ClientAuthCache;
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use error::{CacheError, GeoError, Result};
pub use geo::GeoLocationCache;
pub use hydration::{GateView, HydrationGate};
pub use prefetch::RoutePrefetchScheduler;
pub use runtime::{ClientRuntime, ClientServices, Router};
pub use worker::{CacheLifecycleController, NetworkCacheWorker, WorkerHandle, WorkerHost};
