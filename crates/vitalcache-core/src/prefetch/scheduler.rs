use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::error::{CacheError, Result};
use crate::http::Request;
use crate::worker::{ResponseSource, WorkerHandle};

use super::adjacency::{normalize, RouteAdjacency};

/// Warms a single route.
pub trait Prefetcher: Send + Sync {
    fn prefetch(&self, route: String) -> BoxFuture<'_, Result<()>>;
}

/// Warms routes by issuing a document fetch through the worker, which
/// stores the fresh document in its Dynamic generation.
#[derive(Clone)]
pub struct WorkerPrefetcher {
    worker: WorkerHandle,
    origin: Url,
}

impl WorkerPrefetcher {
    pub fn new(worker: WorkerHandle, origin: Url) -> Self {
        Self { worker, origin }
    }

    async fn warm(&self, route: String) -> Result<()> {
        let url = self
            .origin
            .join(&route)
            .map_err(|e| CacheError::InvalidResponse(format!("invalid route {}: {}", route, e)))?;
        let outcome = self.worker.fetch(Request::navigate(url)).await?;
        // A fallback document or an error page does not count as warmed
        if outcome.source != ResponseSource::Network || !outcome.response.is_cacheable() {
            return Err(CacheError::InvalidResponse(format!(
                "{} not warmed (status {}, {:?})",
                route, outcome.response.status, outcome.source
            )));
        }
        Ok(())
    }
}

impl Prefetcher for WorkerPrefetcher {
    fn prefetch(&self, route: String) -> BoxFuture<'_, Result<()>> {
        self.warm(route).boxed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchState {
    Pending,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchTicket {
    pub route: String,
    pub state: PrefetchState,
}

/// `loaded` and `pending` are disjoint; `failed` only records the last outcome.
#[derive(Default)]
struct Tickets {
    loaded: HashSet<String>,
    pending: HashSet<String>,
    failed: HashSet<String>,
}

struct Inner {
    adjacency: RouteAdjacency,
    prefetcher: Arc<dyn Prefetcher>,
    delay: Duration,
    critical_routes: Vec<String>,
    critical_started: AtomicBool,
    tickets: Mutex<Tickets>,
}

/// Clone is cheap - all clones share the same ticket sets.
#[derive(Clone)]
pub struct RoutePrefetchScheduler {
    inner: Arc<Inner>,
}

impl RoutePrefetchScheduler {
    pub fn new(
        adjacency: RouteAdjacency,
        prefetcher: Arc<dyn Prefetcher>,
        delay: Duration,
        critical_routes: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                adjacency,
                prefetcher,
                delay,
                critical_routes,
                critical_started: AtomicBool::new(false),
                tickets: Mutex::new(Tickets::default()),
            }),
        }
    }

    fn tickets_lock(&self) -> std::sync::MutexGuard<'_, Tickets> {
        self.inner.tickets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedule warm-ups for the screens likely to follow `route`.
    /// Returned handles may be ignored; tickets are never cancelled.
    pub fn on_navigate(&self, route: &str) -> Vec<JoinHandle<()>> {
        let current = normalize(route);
        let candidates: Vec<String> = self
            .inner
            .adjacency
            .next(&current)
            .iter()
            .filter(|r| **r != current)
            .cloned()
            .collect();
        debug!(route = %current, candidates = candidates.len(), "Navigation, scheduling prefetch");
        self.schedule(candidates)
    }

    /// Warm the critical routes. Only the first call does anything.
    pub fn warm_critical(&self) -> Vec<JoinHandle<()>> {
        if self.inner.critical_started.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }
        let routes = self.inner.critical_routes.iter().map(|r| normalize(r)).collect();
        self.schedule(routes)
    }

    fn schedule(&self, routes: Vec<String>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for route in routes {
            {
                let mut tickets = self.tickets_lock();
                if tickets.loaded.contains(&route) || tickets.pending.contains(&route) {
                    continue;
                }
                tickets.failed.remove(&route);
                tickets.pending.insert(route.clone());
            }

            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(scheduler.inner.delay).await;
                let result = scheduler.inner.prefetcher.prefetch(route.clone()).await;
                scheduler.finish(route, result);
            }));
        }
        handles
    }

    fn finish(&self, route: String, result: Result<()>) {
        let mut tickets = self.tickets_lock();
        tickets.pending.remove(&route);
        match result {
            Ok(()) => {
                debug!(route = %route, "Prefetched");
                tickets.loaded.insert(route);
            }
            Err(e) => {
                warn!(route = %route, error = %e, "Prefetch failed");
                tickets.failed.insert(route);
            }
        }
    }

    pub fn state_of(&self, route: &str) -> Option<PrefetchState> {
        let route = normalize(route);
        let tickets = self.tickets_lock();
        if tickets.loaded.contains(&route) {
            Some(PrefetchState::Loaded)
        } else if tickets.pending.contains(&route) {
            Some(PrefetchState::Pending)
        } else if tickets.failed.contains(&route) {
            Some(PrefetchState::Failed)
        } else {
            None
        }
    }

    /// Every known ticket, sorted by route.
    pub fn tickets(&self) -> Vec<PrefetchTicket> {
        let tickets = self.tickets_lock();
        let mut all: Vec<PrefetchTicket> = tickets
            .loaded
            .iter()
            .map(|r| (r, PrefetchState::Loaded))
            .chain(tickets.pending.iter().map(|r| (r, PrefetchState::Pending)))
            .chain(tickets.failed.iter().map(|r| (r, PrefetchState::Failed)))
            .map(|(route, state)| PrefetchTicket {
                route: route.clone(),
                state,
            })
            .collect();
        all.sort_by(|a, b| a.route.cmp(&b.route));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FakePrefetcher {
        calls: Mutex<Vec<String>>,
        in_flight: Mutex<HashSet<String>>,
        overlap: AtomicBool,
        failing: Mutex<HashSet<String>>,
        attempts: AtomicUsize,
    }

    impl Prefetcher for FakePrefetcher {
        fn prefetch(&self, route: String) -> BoxFuture<'_, Result<()>> {
            async move {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                self.calls.lock().unwrap().push(route.clone());
                if !self.in_flight.lock().unwrap().insert(route.clone()) {
                    self.overlap.store(true, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
                self.in_flight.lock().unwrap().remove(&route);
                if self.failing.lock().unwrap().contains(&route) {
                    Err(CacheError::Network("offline".to_string()))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }
    }

    fn scheduler(prefetcher: Arc<FakePrefetcher>) -> RoutePrefetchScheduler {
        let mut routes = BTreeMap::new();
        routes.insert("/dashboard".to_string(), vec!["/records".to_string(), "/medications".to_string()]);
        routes.insert("/records".to_string(), vec!["/dashboard".to_string(), "/records/new".to_string()]);
        routes.insert("/settings".to_string(), vec!["/settings".to_string()]);
        RoutePrefetchScheduler::new(
            RouteAdjacency::new(routes),
            prefetcher,
            Duration::from_secs(1),
            vec!["/dashboard".to_string()],
        )
    }

    async fn settle(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_warms_neighbours_after_delay() {
        let prefetcher = Arc::new(FakePrefetcher::default());
        let s = scheduler(prefetcher.clone());

        let handles = s.on_navigate("/dashboard");
        assert_eq!(handles.len(), 2);
        assert_eq!(s.state_of("/records"), Some(PrefetchState::Pending));

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(prefetcher.calls.lock().unwrap().is_empty());

        settle(handles).await;
        assert_eq!(s.state_of("/records"), Some(PrefetchState::Loaded));
        assert_eq!(s.state_of("/medications"), Some(PrefetchState::Loaded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_and_loaded_routes_are_skipped() {
        let prefetcher = Arc::new(FakePrefetcher::default());
        let s = scheduler(prefetcher.clone());

        let mut handles = s.on_navigate("/dashboard");
        handles.extend(s.on_navigate("/dashboard"));
        assert_eq!(handles.len(), 2);
        settle(handles).await;

        assert!(s.on_navigate("/dashboard").is_empty());
        assert!(!prefetcher.overlap.load(Ordering::SeqCst));
        assert_eq!(prefetcher.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_route_retried_only_on_later_navigation() {
        let prefetcher = Arc::new(FakePrefetcher::default());
        prefetcher.failing.lock().unwrap().insert("/medications".to_string());
        let s = scheduler(prefetcher.clone());

        settle(s.on_navigate("/dashboard")).await;
        assert_eq!(s.state_of("/medications"), Some(PrefetchState::Failed));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(prefetcher.attempts.load(Ordering::SeqCst), 2);

        prefetcher.failing.lock().unwrap().clear();
        let handles = s.on_navigate("/dashboard");
        assert_eq!(handles.len(), 1);
        settle(handles).await;
        assert_eq!(s.state_of("/medications"), Some(PrefetchState::Loaded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_route_is_not_prefetched() {
        let prefetcher = Arc::new(FakePrefetcher::default());
        let s = scheduler(prefetcher);
        assert!(s.on_navigate("/settings").is_empty());
        assert!(s.on_navigate("/unknown").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_routes_warm_once() {
        let prefetcher = Arc::new(FakePrefetcher::default());
        let s = scheduler(prefetcher.clone());

        let handles = s.warm_critical();
        assert_eq!(handles.len(), 1);
        assert!(s.warm_critical().is_empty());
        settle(handles).await;

        assert_eq!(
            s.tickets(),
            vec![PrefetchTicket {
                route: "/dashboard".to_string(),
                state: PrefetchState::Loaded
            }]
        );
    }
}
