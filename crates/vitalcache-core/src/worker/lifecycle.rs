//! Cache generation lifecycle: install-time seeding, activate-time garbage
//! collection, and the worker state machine that orders them.
//!
//! Every platform event is a transition on `WorkerState`:
//!
//! ```text
//! Uninstalled -> Installing -> Waiting -> Activating -> Active -> Superseded
//!                    |                        |
//!                    +-> Uninstalled          +-> Waiting (activation failed)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::try_join_all;
use tracing::{debug, info, warn};
use url::Url;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::http::{Network, Request, Response};
use crate::storage::{CacheStorage, CachedResponse};

use super::message::{CacheInfo, StoreInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninstalled,
    Installing,
    Waiting,
    Activating,
    Active,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    InstallStarted,
    InstallSucceeded,
    InstallFailed,
    ActivateStarted,
    ActivateFinished,
    ActivateFailed,
    Superseded,
}

impl WorkerState {
    pub fn on(self, event: LifecycleEvent) -> Result<WorkerState> {
        use LifecycleEvent as E;
        use WorkerState as S;

        match (self, event) {
            (S::Uninstalled, E::InstallStarted) => Ok(S::Installing),
            (S::Installing, E::InstallSucceeded) => Ok(S::Waiting),
            (S::Installing, E::InstallFailed) => Ok(S::Uninstalled),
            (S::Waiting, E::ActivateStarted) => Ok(S::Activating),
            (S::Activating, E::ActivateFinished) => Ok(S::Active),
            (S::Activating, E::ActivateFailed) => Ok(S::Waiting),
            (S::Waiting | S::Active, E::Superseded) => Ok(S::Superseded),
            (from, event) => Err(CacheError::InvalidTransition {
                from: from.to_string(),
                event: format!("{:?}", event),
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, WorkerState::Active)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Uninstalled => "uninstalled",
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Superseded => "superseded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGeneration {
    pub name: String,
    pub version: u32,
}

impl CacheGeneration {
    pub fn static_for(config: &Config) -> Self {
        Self {
            name: config.static_cache_name(),
            version: config.cache_version,
        }
    }

    pub fn dynamic_for(config: &Config) -> Self {
        Self {
            name: config.dynamic_cache_name(),
            version: config.cache_version,
        }
    }
}

pub struct CacheLifecycleController {
    static_generation: CacheGeneration,
    dynamic_generation: CacheGeneration,
    manifest: Vec<Url>,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    state: Mutex<WorkerState>,
    claimed: AtomicBool,
}

impl CacheLifecycleController {
    pub fn new(
        config: &Config,
        origin: &Url,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let manifest = config
            .precache_manifest
            .iter()
            .map(|path| {
                origin.join(path).map_err(|e| CacheError::InstallFailure {
                    url: path.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            static_generation: CacheGeneration::static_for(config),
            dynamic_generation: CacheGeneration::dynamic_for(config),
            manifest,
            storage,
            network,
            clock,
            state: Mutex::new(WorkerState::Uninstalled),
            claimed: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn static_generation(&self) -> &CacheGeneration {
        &self.static_generation
    }

    pub fn dynamic_generation(&self) -> &CacheGeneration {
        &self.dynamic_generation
    }

    /// Whether open pages are controlled by this generation.
    pub fn has_claimed_clients(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }

    fn transition(&self, event: LifecycleEvent) -> Result<WorkerState> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let from = *state;
        let next = from.on(event)?;
        debug!(%from, to = %next, ?event, "Worker lifecycle transition");
        *state = next;
        Ok(next)
    }

    /// Seed the Static generation with every manifest URL, all or nothing.
    pub async fn install(&self) -> Result<()> {
        self.transition(LifecycleEvent::InstallStarted)?;
        info!(generation = %self.static_generation.name, entries = self.manifest.len(), "Installing");

        let existed = self
            .storage
            .store_names()
            .map(|names| names.contains(&self.static_generation.name))
            .unwrap_or(false);

        match self.precache().await {
            Ok(()) => {
                self.transition(LifecycleEvent::InstallSucceeded)?;
                info!(generation = %self.static_generation.name, "Install complete");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Install failed, discarding static generation");
                if !existed {
                    if let Err(cleanup) = self.storage.delete_store(&self.static_generation.name) {
                        warn!(error = %cleanup, "Failed to delete partial static generation");
                    }
                }
                self.transition(LifecycleEvent::InstallFailed)?;
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<()> {
        let fetches = self.manifest.iter().map(|url| self.fetch_manifest_entry(url));
        let responses = try_join_all(fetches).await?;

        // Nothing is written until every entry has been fetched successfully
        let now = self.clock.now();
        for (url, response) in self.manifest.iter().zip(responses) {
            let request = Request::get(url.clone());
            let entry = CachedResponse::from_response(request.key(), &response, now);
            self.storage
                .put(&self.static_generation.name, entry)
                .map_err(|e| CacheError::InstallFailure {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    async fn fetch_manifest_entry(&self, url: &Url) -> Result<Response> {
        let response = self
            .network
            .fetch(Request::get(url.clone()))
            .await
            .map_err(|e| CacheError::InstallFailure {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if !response.is_cacheable() {
            return Err(CacheError::InstallFailure {
                url: url.to_string(),
                reason: format!("status {}", response.status),
            });
        }
        Ok(response)
    }

    /// Adopt a Static generation left behind by an earlier run instead of
    /// seeding it again. Returns false when there is nothing to adopt.
    pub fn restore(&self) -> Result<bool> {
        if self.state() != WorkerState::Uninstalled {
            return Ok(false);
        }
        let names = self.storage.store_names()?;
        if !names.contains(&self.static_generation.name)
            || self.storage.entry_count(&self.static_generation.name)? < self.manifest.len()
        {
            return Ok(false);
        }
        self.transition(LifecycleEvent::InstallStarted)?;
        self.transition(LifecycleEvent::InstallSucceeded)?;
        info!(generation = %self.static_generation.name, "Restored installed generation");
        Ok(true)
    }

    /// Delete every store that is not a current generation, then take
    /// control of open pages.
    pub fn activate(&self) -> Result<()> {
        self.transition(LifecycleEvent::ActivateStarted)?;

        match self.collect_garbage() {
            Ok(deleted) => {
                self.claimed.store(true, Ordering::SeqCst);
                self.transition(LifecycleEvent::ActivateFinished)?;
                info!(
                    static_generation = %self.static_generation.name,
                    dynamic_generation = %self.dynamic_generation.name,
                    deleted,
                    "Activated"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Activation failed");
                self.transition(LifecycleEvent::ActivateFailed)?;
                Err(e)
            }
        }
    }

    fn collect_garbage(&self) -> Result<usize> {
        let keep = [&self.static_generation.name, &self.dynamic_generation.name];
        let mut deleted = 0;
        for name in self.storage.store_names()? {
            if keep.contains(&&name) {
                continue;
            }
            if self.storage.delete_store(&name)? {
                debug!(store = %name, "Deleted outdated cache generation");
                deleted += 1;
            }
        }
        self.storage.open(&self.dynamic_generation.name)?;
        Ok(deleted)
    }

    /// Whether a skip-waiting request can activate this worker right away.
    pub fn can_skip_waiting(&self) -> bool {
        self.state() == WorkerState::Waiting
    }

    pub fn supersede(&self) -> Result<()> {
        self.transition(LifecycleEvent::Superseded)?;
        self.claimed.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn cache_info(&self) -> Result<CacheInfo> {
        let stores = self
            .storage
            .store_names()?
            .into_iter()
            .map(|name| {
                let entries = self.storage.entry_count(&name)?;
                Ok(StoreInfo { name, entries })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CacheInfo {
            generations: vec![
                self.static_generation.name.clone(),
                self.dynamic_generation.name.clone(),
            ],
            stores,
        })
    }

    pub fn clear_dynamic(&self) -> Result<()> {
        self.storage.clear(&self.dynamic_generation.name)?;
        info!(generation = %self.dynamic_generation.name, "Cleared dynamic generation");
        Ok(())
    }
}
