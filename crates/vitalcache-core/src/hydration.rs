//! Hydration boundary for cache-dependent rendering.
//!
//! Until the client runtime has taken over from server-rendered markup only a
//! structural placeholder may be shown. After that the protected render path
//! waits for the auth decision before revealing content or redirecting.

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::auth::ClientAuthCache;
use crate::error::CacheError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationState {
    NotHydrated,
    Hydrated,
}

/// What the protected render path shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateView {
    /// Server-rendered structure only, before hydration
    Placeholder,
    /// Hydrated, waiting on the auth decision
    Loading,
    Protected,
    RedirectToSignIn,
}

pub struct HydrationGate {
    hydrated: watch::Sender<bool>,
}

impl Default for HydrationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl HydrationGate {
    pub fn new() -> Self {
        let (hydrated, _) = watch::channel(false);
        Self { hydrated }
    }

    pub fn state(&self) -> HydrationState {
        if *self.hydrated.borrow() {
            HydrationState::Hydrated
        } else {
            HydrationState::NotHydrated
        }
    }

    pub fn is_hydrated(&self) -> bool {
        self.state() == HydrationState::Hydrated
    }

    /// Flip to `Hydrated`. Returns true only for the call that flipped it.
    pub fn mark_hydrated(&self) -> bool {
        let flipped = self.hydrated.send_if_modified(|hydrated| {
            if *hydrated {
                false
            } else {
                *hydrated = true;
                true
            }
        });
        if flipped {
            debug!("Hydrated");
        }
        flipped
    }

    pub async fn wait_hydrated(&self) {
        let mut rx = self.hydrated.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|hydrated| *hydrated).await;
    }

    /// Synchronous view for the current frame. Never triggers verification.
    pub fn view(&self, auth: &ClientAuthCache) -> GateView {
        if !self.is_hydrated() {
            return GateView::Placeholder;
        }
        match auth.peek() {
            Some(decision) if decision.is_authenticated => GateView::Protected,
            Some(_) => GateView::RedirectToSignIn,
            None => GateView::Loading,
        }
    }

    /// Resolve the auth decision (verifying if needed) and decide what to
    /// show. Anything short of a positive decision redirects.
    pub async fn resolve(&self, auth: &ClientAuthCache) -> GateView {
        if !self.is_hydrated() {
            return GateView::Placeholder;
        }
        match auth.read().await {
            Ok(decision) if decision.is_authenticated => GateView::Protected,
            Ok(_) | Err(CacheError::AuthInvalid) => GateView::RedirectToSignIn,
            Err(e) => {
                warn!(error = %e, "Could not resolve auth decision");
                GateView::RedirectToSignIn
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hydrates_exactly_once() {
        let gate = HydrationGate::new();
        assert_eq!(gate.state(), HydrationState::NotHydrated);
        assert!(gate.mark_hydrated());
        assert!(!gate.mark_hydrated());
        assert!(gate.is_hydrated());
    }

    #[tokio::test]
    async fn test_wait_hydrated_wakes_on_flip() {
        let gate = std::sync::Arc::new(HydrationGate::new());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_hydrated().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        gate.mark_hydrated();
        waiter.await.unwrap();
    }
}
