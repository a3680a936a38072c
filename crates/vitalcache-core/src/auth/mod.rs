//! Authentication decision caching.
//!
//! This module provides:
//! - `ClientAuthCache`: short-TTL cache of "is the current session valid"
//! - `DecisionStore`: durable page-level storage for the cached decision
//! - `SessionVerifier`: the verification round-trip (HTTP or test double)
//! - `CredentialStore`: OS keychain storage for the bearer credential
//!
//! Decisions are trusted for 5 minutes and cleared on sign-in, sign-out, or
//! any 401 from a guarded call.

pub mod cache;
pub mod credentials;
pub mod decision;
pub mod verifier;

pub use cache::{AuthState, ClientAuthCache};
pub use credentials::CredentialStore;
pub use decision::{AuthDecision, DecisionStore, FileDecisionStore, MemoryDecisionStore};
pub use verifier::{HttpSessionVerifier, Principal, SessionVerifier};
