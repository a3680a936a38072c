//! Execution context for the worker.
//!
//! `WorkerHost` runs as its own Tokio task, independent of any page. Pages
//! talk to it through a cloneable `WorkerHandle`. Registrations and
//! intercepted fetches each run as an independent task so many requests
//! proceed concurrently; control messages are handled by the host loop itself.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::http::{Network, Request};
use crate::storage::CacheStorage;

use super::cache_worker::{FetchOutcome, NetworkCacheWorker, ResponseSource};
use super::lifecycle::WorkerState;
use super::message::{CacheInfo, ControlMessage, StoreInfo};

/// Buffer size for the worker event channel.
const CHANNEL_BUFFER_SIZE: usize = 64;

enum WorkerEvent {
    Register {
        config: Config,
        restore: bool,
        reply: oneshot::Sender<Result<WorkerState>>,
    },
    Fetch {
        request: Request,
        reply: oneshot::Sender<Result<FetchOutcome>>,
    },
    Message(ControlMessage),
}

#[derive(Default)]
struct Registrations {
    active: Option<Arc<NetworkCacheWorker>>,
    waiting: Option<Arc<NetworkCacheWorker>>,
}

struct HostShared {
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    registrations: Mutex<Registrations>,
}

pub struct WorkerHost;

impl WorkerHost {
    /// Start the host task and return a handle to it.
    pub fn spawn(
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
    ) -> WorkerHandle {
        let (tx, mut rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let shared = Arc::new(HostShared {
            storage,
            network,
            clock,
            registrations: Mutex::new(Registrations::default()),
        });

        tokio::spawn(async move {
            debug!("Worker host started");
            while let Some(event) = rx.recv().await {
                match event {
                    // Control messages are handled in arrival order
                    WorkerEvent::Message(message) => shared.on_message(message),
                    event => {
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            shared.dispatch(event).await;
                        });
                    }
                }
            }
            debug!("Worker host stopped");
        });

        WorkerHandle { tx }
    }
}

impl HostShared {
    async fn dispatch(&self, event: WorkerEvent) {
        match event {
            WorkerEvent::Register {
                config,
                restore,
                reply,
            } => {
                let _ = reply.send(self.register(config, restore).await);
            }
            WorkerEvent::Fetch { request, reply } => {
                let _ = reply.send(self.fetch(request).await);
            }
            WorkerEvent::Message(message) => self.on_message(message),
        }
    }

    fn registrations(&self) -> std::sync::MutexGuard<'_, Registrations> {
        self.registrations.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn register(&self, config: Config, restore: bool) -> Result<WorkerState> {
        let origin = config
            .origin
            .as_deref()
            .ok_or_else(|| CacheError::InstallFailure {
                url: String::new(),
                reason: "no origin configured".to_string(),
            })
            .and_then(|o| {
                Url::parse(o).map_err(|e| CacheError::InstallFailure {
                    url: o.to_string(),
                    reason: e.to_string(),
                })
            })?;

        let worker = Arc::new(NetworkCacheWorker::new(
            &config,
            origin,
            self.storage.clone(),
            self.network.clone(),
            self.clock.clone(),
        )?);

        let restored = restore && worker.lifecycle().restore()?;
        if !restored {
            worker.lifecycle().install().await?;
        }

        let mut registrations = self.registrations();
        if let Some(previous) = registrations.waiting.take() {
            if let Err(e) = previous.lifecycle().supersede() {
                warn!(error = %e, "Failed to supersede waiting worker");
            }
        }

        if registrations.active.is_none() {
            Self::promote(&mut registrations, worker.clone())?;
        } else {
            info!(generation = %worker.lifecycle().static_generation().name, "New worker waiting");
            registrations.waiting = Some(worker.clone());
        }
        Ok(worker.lifecycle().state())
    }

    /// Activate `worker` and retire the current controller.
    fn promote(registrations: &mut Registrations, worker: Arc<NetworkCacheWorker>) -> Result<()> {
        worker.lifecycle().activate()?;
        if let Some(old) = registrations.active.replace(worker) {
            if let Err(e) = old.lifecycle().supersede() {
                warn!(error = %e, "Failed to supersede previous worker");
            }
        }
        Ok(())
    }

    async fn fetch(&self, request: Request) -> Result<FetchOutcome> {
        let active = self.registrations().active.clone();
        match active {
            Some(worker) => worker.handle_fetch(request).await,
            None => {
                let response = self.network.fetch(request).await?;
                Ok(FetchOutcome {
                    response,
                    source: ResponseSource::Network,
                    class: super::classify::RequestClass::Other,
                })
            }
        }
    }

    fn on_message(&self, message: ControlMessage) {
        match message {
            ControlMessage::SkipWaiting => {
                let mut registrations = self.registrations();
                let Some(waiting) = registrations.waiting.take() else {
                    debug!("SKIP_WAITING with no waiting worker");
                    return;
                };
                if waiting.lifecycle().can_skip_waiting() {
                    if let Err(e) = Self::promote(&mut registrations, waiting) {
                        error!(error = %e, "Failed to activate waiting worker");
                    }
                } else {
                    registrations.waiting = Some(waiting);
                }
            }
            ControlMessage::GetCacheInfo { reply } => {
                let info = self.cache_info();
                if reply.send(info).is_err() {
                    debug!("Cache info requester went away");
                }
            }
            ControlMessage::ClearCache => {
                let active = self.registrations().active.clone();
                if let Some(worker) = active {
                    if let Err(e) = worker.lifecycle().clear_dynamic() {
                        warn!(error = %e, "Failed to clear dynamic cache");
                    }
                }
            }
        }
    }

    fn cache_info(&self) -> CacheInfo {
        let current = {
            let registrations = self.registrations();
            registrations
                .active
                .clone()
                .or_else(|| registrations.waiting.clone())
        };

        let result = match current {
            Some(worker) => worker.lifecycle().cache_info(),
            None => self.storage.store_names().and_then(|names| {
                names
                    .into_iter()
                    .map(|name| {
                        let entries = self.storage.entry_count(&name)?;
                        Ok(StoreInfo { name, entries })
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(|stores| CacheInfo {
                        generations: Vec::new(),
                        stores,
                    })
            }),
        };

        result.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to collect cache info");
            CacheInfo::default()
        })
    }
}

/// Page-side handle to the worker host. Clone is cheap.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerEvent>,
}

impl WorkerHandle {
    async fn send(&self, event: WorkerEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| CacheError::WorkerGone)
    }

    /// Install a worker generation for `config`. It activates immediately
    /// when no worker controls the pages yet, otherwise it waits for
    /// `SKIP_WAITING`.
    pub async fn register(&self, config: Config) -> Result<WorkerState> {
        self.register_with(config, false).await
    }

    /// Like `register`, but adopts an already-installed generation from a
    /// previous run instead of seeding it again.
    pub async fn resume(&self, config: Config) -> Result<WorkerState> {
        self.register_with(config, true).await
    }

    async fn register_with(&self, config: Config, restore: bool) -> Result<WorkerState> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerEvent::Register {
            config,
            restore,
            reply,
        })
        .await?;
        rx.await.map_err(|_| CacheError::WorkerGone)?
    }

    pub async fn fetch(&self, request: Request) -> Result<FetchOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerEvent::Fetch { request, reply }).await?;
        rx.await.map_err(|_| CacheError::WorkerGone)?
    }

    pub async fn post_message(&self, message: ControlMessage) -> Result<()> {
        self.send(WorkerEvent::Message(message)).await
    }

    pub async fn skip_waiting(&self) -> Result<()> {
        self.post_message(ControlMessage::SkipWaiting).await
    }

    pub async fn cache_info(&self) -> Result<CacheInfo> {
        let (reply, rx) = oneshot::channel();
        self.post_message(ControlMessage::GetCacheInfo { reply }).await?;
        rx.await.map_err(|_| CacheError::WorkerGone)
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.post_message(ControlMessage::ClearCache).await
    }
}
