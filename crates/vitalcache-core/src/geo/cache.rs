use std::sync::{Arc, Mutex, Weak};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::GeoError;

use super::provider::{Geocoder, PositionOptions, PositionProvider};

/// Shortest poll interval the background refresh accepts
const MIN_POLL_INTERVAL: StdDuration = StdDuration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    pub accuracy: f64,
    pub captured_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.captured_at
    }
}

/// Last known position plus resolved address.
pub struct GeoLocationCache {
    provider: Arc<dyn PositionProvider>,
    geocoder: Arc<dyn Geocoder>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    refresh_after: Duration,
    options: PositionOptions,
    sample: Mutex<Option<LocationSample>>,
    /// Serializes fixes so concurrent callers share one device request
    refreshing: tokio::sync::Mutex<()>,
}

impl GeoLocationCache {
    pub fn new(
        provider: Arc<dyn PositionProvider>,
        geocoder: Arc<dyn Geocoder>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            provider,
            geocoder,
            clock,
            ttl: config.location_ttl(),
            refresh_after: config.location_refresh_after(),
            options: PositionOptions {
                high_accuracy: true,
                timeout: config.location_fix_timeout(),
                maximum_age: config.location_maximum_age(),
            },
            sample: Mutex::new(None),
            refreshing: tokio::sync::Mutex::new(()),
        }
    }

    fn current(&self) -> Option<LocationSample> {
        self.sample.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn fresh(&self) -> Option<LocationSample> {
        let now = self.clock.now();
        self.current().filter(|s| {
            let age = s.age(now);
            age >= Duration::zero() && age < self.ttl
        })
    }

    /// The stored sample regardless of age.
    pub fn last_known(&self) -> Option<LocationSample> {
        self.current()
    }

    /// Return the cached sample when it is younger than the TTL and `force`
    /// is false; otherwise take a new fix and resolve its address.
    pub async fn get_location(&self, force: bool) -> Result<LocationSample, GeoError> {
        if !force {
            if let Some(sample) = self.fresh() {
                return Ok(sample);
            }
        }

        let _refreshing = self.refreshing.lock().await;
        if !force {
            // Another caller may have refreshed while we waited
            if let Some(sample) = self.fresh() {
                return Ok(sample);
            }
        }

        let position = match tokio::time::timeout(
            self.options.timeout,
            self.provider.current_position(self.options),
        )
        .await
        {
            Ok(Ok(position)) => position,
            Ok(Err(e)) => {
                warn!(error = %e, "Location fix failed");
                return Err(e);
            }
            Err(_) => {
                warn!(timeout_secs = self.options.timeout.as_secs(), "Location fix timed out");
                return Err(GeoError::Timeout);
            }
        };

        let address = match self.geocoder.reverse(position.lat, position.lng).await {
            Ok(address) => address,
            Err(e) => {
                debug!(error = %e, "Reverse lookup failed, using coordinates");
                format!("{:.5}, {:.5}", position.lat, position.lng)
            }
        };

        let sample = LocationSample {
            lat: position.lat,
            lng: position.lng,
            address,
            accuracy: position.accuracy,
            captured_at: self.clock.now(),
        };
        *self.sample.lock().unwrap_or_else(|e| e.into_inner()) = Some(sample.clone());
        debug!(accuracy = sample.accuracy, "Location sample stored");
        Ok(sample)
    }

    /// Whether the stored sample is old enough for a background refresh.
    pub fn needs_refresh(&self) -> bool {
        let now = self.clock.now();
        self.current()
            .map(|s| s.age(now) > self.refresh_after)
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        *self.sample.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Check every `poll_interval` and force a refresh once the sample is
    /// older than the refresh threshold. The task ends when the returned
    /// handle is dropped or the cache itself is gone.
    pub fn spawn_background_refresh(self: &Arc<Self>, poll_interval: StdDuration) -> RefreshTask {
        if poll_interval < MIN_POLL_INTERVAL {
            warn!(?poll_interval, "Poll interval too short, using minimum");
        }
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let cache: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                if !cache.needs_refresh() {
                    continue;
                }
                info!("Location sample is stale, refreshing in background");
                if let Err(e) = cache.get_location(true).await {
                    warn!(error = %e, "Background location refresh failed");
                }
            }
            debug!("Background location refresh stopped");
        });
        RefreshTask { handle }
    }
}

/// Handle to the background refresh. Dropping it cancels the task.
pub struct RefreshTask {
    handle: JoinHandle<()>,
}

impl RefreshTask {
    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
