//! Page-side runtime.
//!
//! `ClientRuntime` wires the caches to navigation and rendering: it holds the
//! hydration gate, kicks off prefetching and the location refresh once the
//! client has hydrated, redirects to sign-in when the gate denies access, and
//! drops every user-bound cache on sign-out.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use crate::auth::ClientAuthCache;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::geo::{GeoLocationCache, RefreshTask};
use crate::http::Request;
use crate::hydration::{GateView, HydrationGate};
use crate::prefetch::adjacency::normalize;
use crate::prefetch::RoutePrefetchScheduler;
use crate::worker::{FetchOutcome, WorkerHandle};

/// Client-side navigation.
pub trait Router: Send + Sync {
    fn current_route(&self) -> String;
    fn navigate(&self, route: &str);
}

/// Services shared by every screen of the client.
pub struct ClientServices {
    pub auth: Arc<ClientAuthCache>,
    pub geo: Arc<GeoLocationCache>,
    pub prefetch: RoutePrefetchScheduler,
    pub router: Arc<dyn Router>,
    /// Worker controlling the pages, if one is registered
    pub worker: Option<WorkerHandle>,
}

pub struct ClientRuntime {
    services: ClientServices,
    gate: HydrationGate,
    sign_in_route: String,
    location_poll_interval: Duration,
    location_task: Mutex<Option<RefreshTask>>,
}

impl ClientRuntime {
    pub fn new(services: ClientServices, config: &Config) -> Self {
        Self {
            services,
            gate: HydrationGate::new(),
            sign_in_route: normalize(&config.sign_in_route),
            location_poll_interval: config.location_poll_interval(),
            location_task: Mutex::new(None),
        }
    }

    pub fn gate(&self) -> &HydrationGate {
        &self.gate
    }

    pub fn auth(&self) -> &Arc<ClientAuthCache> {
        &self.services.auth
    }

    pub fn geo(&self) -> &Arc<GeoLocationCache> {
        &self.services.geo
    }

    pub fn prefetch(&self) -> &RoutePrefetchScheduler {
        &self.services.prefetch
    }

    /// Mark the client hydrated and start the work that must not run before
    /// it: critical-route warm-up, neighbours of the current screen, and the
    /// background location refresh. Returns false if already hydrated.
    pub fn hydrate(&self) -> bool {
        if !self.gate.mark_hydrated() {
            return false;
        }

        self.services.prefetch.warm_critical();
        self.services
            .prefetch
            .on_navigate(&self.services.router.current_route());

        let task = self
            .services
            .geo
            .spawn_background_refresh(self.location_poll_interval);
        *self.location_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);

        info!("Client runtime hydrated");
        true
    }

    /// Navigate to `route` and warm its likely successors.
    pub fn navigate(&self, route: &str) {
        self.services.router.navigate(route);
        if self.gate.is_hydrated() {
            self.services.prefetch.on_navigate(route);
        } else {
            debug!(route = %route, "Not hydrated, skipping prefetch");
        }
    }

    /// What the protected render path shows this frame, without verifying.
    pub fn view(&self) -> GateView {
        self.gate.view(&self.services.auth)
    }

    /// Resolve the protected view, redirecting to sign-in when denied.
    pub async fn render_protected(&self) -> GateView {
        let view = self.gate.resolve(&self.services.auth).await;
        if view == GateView::RedirectToSignIn {
            self.redirect_to_sign_in();
        }
        view
    }

    /// Run a call against a protected endpoint. A 401 clears the auth
    /// decision and redirects to sign-in.
    pub async fn guarded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = self.services.auth.guard(call.await);
        if let Err(CacheError::AuthInvalid) = &result {
            self.redirect_to_sign_in();
        }
        result
    }

    /// Fetch a protected resource through the worker. A 401 response clears
    /// the auth decision, redirects to sign-in and surfaces as
    /// `CacheError::AuthInvalid`.
    pub async fn guarded_fetch(&self, request: Request) -> Result<FetchOutcome> {
        let worker = self
            .services
            .worker
            .as_ref()
            .ok_or(CacheError::WorkerGone)?;
        let outcome = self.guarded(worker.fetch(request)).await?;
        if self.services.auth.observe_status(outcome.response.status) {
            self.redirect_to_sign_in();
            return Err(CacheError::AuthInvalid);
        }
        Ok(outcome)
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        self.services.auth.sign_in(token);
    }

    /// Drop the auth decision, the location sample, and cached API data.
    pub async fn sign_out(&self) -> Result<()> {
        self.services.auth.sign_out();
        self.services.geo.clear();
        if let Some(worker) = &self.services.worker {
            worker.clear_cache().await?;
        }
        self.redirect_to_sign_in();
        Ok(())
    }

    fn redirect_to_sign_in(&self) {
        let current = normalize(&self.services.router.current_route());
        if current != self.sign_in_route {
            info!(from = %current, "Redirecting to sign-in");
            self.services.router.navigate(&self.sign_in_route);
        }
    }
}
