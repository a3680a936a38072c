use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{CacheError, Result};

use super::decision::{AuthDecision, DecisionStore};
use super::verifier::SessionVerifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unknown,
    Valid { checked_at: DateTime<Utc> },
    Invalid { checked_at: DateTime<Utc> },
}

impl From<Option<AuthDecision>> for AuthState {
    fn from(decision: Option<AuthDecision>) -> Self {
        match decision {
            None => AuthState::Unknown,
            Some(d) if d.is_authenticated => AuthState::Valid {
                checked_at: d.checked_at,
            },
            Some(d) => AuthState::Invalid {
                checked_at: d.checked_at,
            },
        }
    }
}

/// Short-TTL cache of the session verification result.
///
/// A server-side revocation can go unnoticed for up to one TTL. Any 401 seen
/// through `guard` or `observe_status` clears the decision immediately.
pub struct ClientAuthCache {
    verifier: Arc<dyn SessionVerifier>,
    store: Arc<dyn DecisionStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    credential: Mutex<Option<String>>,
    /// Bumped on every invalidation; a verification that straddles one is discarded
    epoch: AtomicU64,
}

impl ClientAuthCache {
    pub fn new(
        verifier: Arc<dyn SessionVerifier>,
        store: Arc<dyn DecisionStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            verifier,
            store,
            clock,
            ttl,
            credential: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// Use an existing credential without invalidating the cached decision
    /// (e.g. a credential restored at startup).
    pub fn with_credential(self, token: impl Into<String>) -> Self {
        *self.credential.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
        self
    }

    pub fn has_credential(&self) -> bool {
        self.credential.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    fn load(&self) -> Option<AuthDecision> {
        match self.store.load() {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "Failed to load auth decision");
                None
            }
        }
    }

    pub fn state(&self) -> AuthState {
        self.load().into()
    }

    /// The cached decision if it is still trusted. Never performs I/O beyond
    /// the decision store.
    pub fn peek(&self) -> Option<AuthDecision> {
        let now = self.clock.now();
        self.load().filter(|d| d.is_fresh(now, self.ttl))
    }

    /// Return the trusted decision, or verify the session and persist the
    /// outcome. A transport failure persists nothing and is surfaced.
    pub async fn read(&self) -> Result<AuthDecision> {
        if let Some(decision) = self.peek() {
            debug!(authenticated = decision.is_authenticated, "Auth decision served from cache");
            return Ok(decision);
        }

        loop {
            let epoch = self.epoch.load(Ordering::SeqCst);
            let token = self.credential.lock().unwrap_or_else(|e| e.into_inner()).clone();

            let is_authenticated = match token {
                None => false,
                Some(token) => match self.verifier.verify(&token).await {
                    Ok(principal) => {
                        debug!(principal = %principal.id, "Session verified");
                        true
                    }
                    Err(CacheError::AuthInvalid) => false,
                    Err(e) => {
                        warn!(error = %e, "Session verification failed");
                        return Err(e);
                    }
                },
            };

            if self.epoch.load(Ordering::SeqCst) != epoch {
                debug!("Auth state changed during verification, verifying again");
                continue;
            }

            let decision = AuthDecision::new(is_authenticated, self.clock.now());
            if let Err(e) = self.store.save(&decision) {
                warn!(error = %e, "Failed to persist auth decision");
            }
            return Ok(decision);
        }
    }

    /// Drop the cached decision. The next `read` always re-verifies.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear auth decision");
        }
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        *self.credential.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
        self.invalidate();
        info!("Signed in, auth decision cleared");
    }

    pub fn sign_out(&self) {
        *self.credential.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.invalidate();
        info!("Signed out, auth decision cleared");
    }

    /// Pass a guarded call's result through, clearing the decision on 401.
    pub fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(CacheError::AuthInvalid) = &result {
            warn!("Guarded call returned 401, clearing auth decision");
            self.invalidate();
        }
        result
    }

    /// Inspect a guarded call's status code. Returns true if it invalidated.
    pub fn observe_status(&self, status: u16) -> bool {
        if status == 401 {
            warn!("Guarded call returned 401, clearing auth decision");
            self.invalidate();
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::decision::MemoryDecisionStore;
    use crate::testing::{FakeVerifier, ManualClock};

    struct Fixture {
        cache: ClientAuthCache,
        verifier: Arc<FakeVerifier>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let verifier = Arc::new(FakeVerifier::default());
        let clock = ManualClock::default();
        let cache = ClientAuthCache::new(
            verifier.clone(),
            Arc::new(MemoryDecisionStore::new()),
            Arc::new(clock.clone()),
            Duration::minutes(5),
        )
        .with_credential("token-1");
        Fixture {
            cache,
            verifier,
            clock,
        }
    }

    fn calls(f: &Fixture) -> usize {
        f.verifier.calls()
    }

    #[tokio::test]
    async fn test_fresh_decision_skips_verification() {
        let f = fixture();
        assert_eq!(f.cache.state(), AuthState::Unknown);

        let first = f.cache.read().await.unwrap();
        assert!(first.is_authenticated);
        assert_eq!(calls(&f), 1);

        f.clock.advance(Duration::milliseconds(299_999));
        let second = f.cache.read().await.unwrap();
        assert_eq!(second, first);
        assert_eq!(calls(&f), 1);
    }

    #[tokio::test]
    async fn test_expired_decision_reverifies() {
        let f = fixture();
        f.cache.read().await.unwrap();

        f.clock.advance(Duration::milliseconds(300_000));
        let decision = f.cache.read().await.unwrap();
        assert_eq!(calls(&f), 2);
        assert_eq!(decision.checked_at, f.clock.now());
    }

    #[tokio::test]
    async fn test_guarded_401_clears_and_next_read_reverifies() {
        let f = fixture();
        assert!(f.cache.read().await.unwrap().is_authenticated);

        f.verifier.set_reject(true);
        let guarded: Result<()> = f.cache.guard(Err(CacheError::AuthInvalid));
        assert!(guarded.unwrap_err().is_auth_invalid());
        assert_eq!(f.cache.state(), AuthState::Unknown);

        let decision = f.cache.read().await.unwrap();
        assert!(!decision.is_authenticated);
        assert_eq!(calls(&f), 2);
        assert!(matches!(f.cache.state(), AuthState::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_observe_status_only_reacts_to_401() {
        let f = fixture();
        f.cache.read().await.unwrap();
        assert!(!f.cache.observe_status(403));
        assert!(f.cache.peek().is_some());
        assert!(f.cache.observe_status(401));
        assert!(f.cache.peek().is_none());
    }

    #[tokio::test]
    async fn test_network_failure_never_serves_expired_true() {
        let f = fixture();
        f.cache.read().await.unwrap();
        f.clock.advance(Duration::minutes(6));
        f.verifier.set_offline(true);

        let result = f.cache.read().await;
        assert!(matches!(result, Err(CacheError::Network(_))));
        assert!(f.cache.peek().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_clears_and_skips_round_trip() {
        let f = fixture();
        f.cache.read().await.unwrap();
        f.cache.sign_out();
        assert!(!f.cache.has_credential());

        let decision = f.cache.read().await.unwrap();
        assert!(!decision.is_authenticated);
        assert_eq!(calls(&f), 1);
    }

    #[tokio::test]
    async fn test_sign_in_forces_reverification() {
        let f = fixture();
        f.cache.read().await.unwrap();
        f.cache.sign_in("token-2");
        f.cache.read().await.unwrap();
        assert_eq!(calls(&f), 2);
    }
}
