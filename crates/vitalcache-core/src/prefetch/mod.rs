//! Route prefetching.
//!
//! On every screen change the scheduler looks up the likely-next screens in a
//! static `RouteAdjacency` table and warms each one after a short delay, so
//! the warm-up never competes with the navigation that just happened. A
//! small set of critical routes is warmed once at startup.

pub mod adjacency;
pub mod scheduler;

pub use adjacency::RouteAdjacency;
pub use scheduler::{
    PrefetchState, PrefetchTicket, Prefetcher, RoutePrefetchScheduler, WorkerPrefetcher,
};
