use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::http::{Network, Request, RequestKey, Response};
use crate::storage::{CacheStorage, CachedResponse};

use super::classify::{Classifier, RequestClass};
use super::lifecycle::CacheLifecycleController;

/// How a request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    /// Served from the cache without touching the network
    Cache,
    /// Network failed; a previously stored real response was served instead
    Fallback,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub response: Response,
    pub source: ResponseSource,
    pub class: RequestClass,
}

impl FetchOutcome {
    fn new(response: Response, source: ResponseSource, class: RequestClass) -> Self {
        Self {
            response,
            source,
            class,
        }
    }
}

pub struct NetworkCacheWorker {
    lifecycle: CacheLifecycleController,
    classifier: Classifier,
    shell: Url,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
}

impl NetworkCacheWorker {
    pub fn new(
        config: &Config,
        origin: Url,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let lifecycle = CacheLifecycleController::new(
            config,
            &origin,
            storage.clone(),
            network.clone(),
            clock.clone(),
        )?;
        let shell = origin
            .join(&config.shell_path)
            .map_err(|e| CacheError::InvalidResponse(format!("invalid shell path: {}", e)))?;

        Ok(Self {
            lifecycle,
            classifier: Classifier::new(Some(origin), config),
            shell,
            storage,
            network,
            clock,
        })
    }

    pub fn lifecycle(&self) -> &CacheLifecycleController {
        &self.lifecycle
    }

    pub fn classify(&self, request: &Request) -> RequestClass {
        self.classifier.classify(request)
    }

    /// Handle one intercepted request. Until the worker is active every
    /// request goes straight to the network.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchOutcome> {
        let class = self.classify(&request);
        if !self.lifecycle.state().is_active() {
            let response = self.network.fetch(request).await?;
            return Ok(FetchOutcome::new(response, ResponseSource::Network, class));
        }

        debug!(url = %request.url, ?class, "Intercepted request");
        match class {
            RequestClass::Static => self.cache_first(request).await,
            RequestClass::Dynamic => self.network_first(request).await,
            RequestClass::Navigation => self.navigate(request).await,
            RequestClass::Other => self.passthrough(request).await,
        }
    }

    async fn cache_first(&self, request: Request) -> Result<FetchOutcome> {
        let key = request.key();
        let store = &self.lifecycle.static_generation().name;
        if let Some(cached) = self.lookup(store, &key) {
            return Ok(FetchOutcome::new(
                cached.to_response(),
                ResponseSource::Cache,
                RequestClass::Static,
            ));
        }

        let response = self.network.fetch(request).await?;
        self.store(store, key, &response);
        Ok(FetchOutcome::new(response, ResponseSource::Network, RequestClass::Static))
    }

    async fn network_first(&self, request: Request) -> Result<FetchOutcome> {
        let key = request.key();
        let store = &self.lifecycle.dynamic_generation().name;

        match self.network.fetch(request).await {
            Ok(response) => {
                self.store(store, key, &response);
                Ok(FetchOutcome::new(response, ResponseSource::Network, RequestClass::Dynamic))
            }
            Err(e) => match self.lookup(store, &key) {
                Some(cached) => {
                    warn!(key = %key, error = %e, "Network failed, serving stored response");
                    Ok(FetchOutcome::new(
                        cached.to_response(),
                        ResponseSource::Fallback,
                        RequestClass::Dynamic,
                    ))
                }
                None => Err(e),
            },
        }
    }

    async fn navigate(&self, request: Request) -> Result<FetchOutcome> {
        let key = request.key();
        let dynamic = &self.lifecycle.dynamic_generation().name;

        match self.network.fetch(request).await {
            Ok(response) => {
                self.store(dynamic, key, &response);
                Ok(FetchOutcome::new(response, ResponseSource::Network, RequestClass::Navigation))
            }
            Err(e) => {
                let shell_key = Request::get(self.shell.clone()).key();
                let fallback = self
                    .lookup(dynamic, &key)
                    .or_else(|| self.lookup(&self.lifecycle.static_generation().name, &shell_key))
                    .or_else(|| self.lookup(dynamic, &shell_key));

                match fallback {
                    Some(cached) => {
                        warn!(key = %key, error = %e, "Navigation failed, serving cached document");
                        Ok(FetchOutcome::new(
                            cached.to_response(),
                            ResponseSource::Fallback,
                            RequestClass::Navigation,
                        ))
                    }
                    None => Err(e),
                }
            }
        }
    }

    async fn passthrough(&self, request: Request) -> Result<FetchOutcome> {
        let key = request.key();
        match self.network.fetch(request).await {
            Ok(response) => Ok(FetchOutcome::new(response, ResponseSource::Network, RequestClass::Other)),
            Err(e) => {
                let fallback = self
                    .lookup(&self.lifecycle.static_generation().name, &key)
                    .or_else(|| self.lookup(&self.lifecycle.dynamic_generation().name, &key));
                match fallback {
                    Some(cached) => Ok(FetchOutcome::new(
                        cached.to_response(),
                        ResponseSource::Fallback,
                        RequestClass::Other,
                    )),
                    None => Err(e),
                }
            }
        }
    }

    /// Storage failures degrade to a miss.
    fn lookup(&self, store: &str, key: &RequestKey) -> Option<CachedResponse> {
        match self.storage.get(store, key) {
            Ok(found) => found,
            Err(e) => {
                warn!(store, key = %key, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    fn store(&self, store: &str, key: RequestKey, response: &Response) {
        if !response.is_cacheable() {
            return;
        }
        let entry = CachedResponse::from_response(key, response, self.clock.now());
        if let Err(e) = self.storage.put(store, entry) {
            warn!(store, error = %e, "Failed to store response");
        }
    }
}
