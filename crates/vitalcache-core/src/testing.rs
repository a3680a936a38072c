//! In-memory collaborator doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::auth::{Principal, SessionVerifier};
use crate::clock::Clock;
use crate::error::{CacheError, GeoError, Result};
use crate::geo::{Geocoder, Position, PositionOptions, PositionProvider};
use crate::http::{Network, Request, Response};

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Arc::new(Mutex::new(Utc::now())),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Network double keyed by path (plus query). Unknown paths answer 404.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    history: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, response: Response) {
        self.routes.lock().unwrap().insert(path.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, path: &str) -> usize {
        self.history.lock().unwrap().iter().filter(|p| *p == path).count()
    }

    fn path_of(request: &Request) -> String {
        match request.url.query() {
            Some(q) => format!("{}?{}", request.url.path(), q),
            None => request.url.path().to_string(),
        }
    }
}

impl Network for FakeNetwork {
    fn fetch(&self, request: Request) -> BoxFuture<'_, Result<Response>> {
        let path = Self::path_of(&request);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.history.lock().unwrap().push(path.clone());

        let result = if self.offline.load(Ordering::SeqCst) {
            Err(CacheError::Network(format!("connection refused: {}", path)))
        } else {
            Ok(self
                .routes
                .lock()
                .unwrap()
                .get(&path)
                .cloned()
                .unwrap_or_else(|| Response::new(404, "not found")))
        };
        async move { result }.boxed()
    }
}

/// Session verifier double. Accepts every credential unless switched to
/// reject it or to fail at the transport level.
#[derive(Default)]
pub struct FakeVerifier {
    calls: AtomicUsize,
    reject: AtomicBool,
    offline: AtomicBool,
}

impl FakeVerifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl SessionVerifier for FakeVerifier {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Principal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.offline.load(Ordering::SeqCst) {
            Err(CacheError::Network("offline".to_string()))
        } else if self.reject.load(Ordering::SeqCst) {
            Err(CacheError::AuthInvalid)
        } else {
            Ok(Principal {
                id: format!("patient-{}", token),
                email: None,
            })
        };
        async move { result }.boxed()
    }
}

/// Position provider that always reports the same fix.
pub struct FixedPosition {
    pub lat: f64,
    pub lng: f64,
}

impl PositionProvider for FixedPosition {
    fn current_position(
        &self,
        _options: PositionOptions,
    ) -> BoxFuture<'_, std::result::Result<Position, GeoError>> {
        let position = Position {
            lat: self.lat,
            lng: self.lng,
            accuracy: 5.0,
            timestamp: Utc::now(),
        };
        async move { Ok(position) }.boxed()
    }
}

/// Geocoder that is never reachable.
pub struct OfflineGeocoder;

impl Geocoder for OfflineGeocoder {
    fn reverse(&self, _lat: f64, _lng: f64) -> BoxFuture<'_, Result<String>> {
        async { Err(CacheError::Network("geocoder offline".to_string())) }.boxed()
    }
}
