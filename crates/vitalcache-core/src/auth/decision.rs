use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Decision file name in cache directory
const DECISION_FILE: &str = "auth_decision.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDecision {
    pub is_authenticated: bool,
    pub checked_at: DateTime<Utc>,
}

impl AuthDecision {
    pub fn new(is_authenticated: bool, checked_at: DateTime<Utc>) -> Self {
        Self {
            is_authenticated,
            checked_at,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.checked_at
    }

    /// Trusted only while `now - checked_at < ttl`. A decision from the
    /// future (clock skew) is not trusted.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = self.age(now);
        age >= Duration::zero() && age < ttl
    }
}

/// Durable page-level storage for the cached decision. Shared between tabs,
/// last write wins.
pub trait DecisionStore: Send + Sync {
    fn load(&self) -> Result<Option<AuthDecision>>;
    fn save(&self, decision: &AuthDecision) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryDecisionStore {
    decision: Mutex<Option<AuthDecision>>,
}

impl MemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecisionStore for MemoryDecisionStore {
    fn load(&self) -> Result<Option<AuthDecision>> {
        Ok(*self.decision.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn save(&self, decision: &AuthDecision) -> Result<()> {
        *self.decision.lock().unwrap_or_else(|e| e.into_inner()) = Some(*decision);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.decision.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

pub struct FileDecisionStore {
    cache_dir: PathBuf,
}

impl FileDecisionStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn decision_path(&self) -> PathBuf {
        self.cache_dir.join(DECISION_FILE)
    }
}

impl DecisionStore for FileDecisionStore {
    fn load(&self) -> Result<Option<AuthDecision>> {
        let path = self.decision_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, decision: &AuthDecision) -> Result<()> {
        let path = self.decision_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(decision)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.decision_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
