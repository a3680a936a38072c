//! Geolocation caching.
//!
//! `GeoLocationCache` keeps the last known position and its resolved address.
//! A sample is trusted for 2 minutes; a background `RefreshTask` forces a new
//! fix once the sample is older than 5 minutes. A failed fix never evicts the
//! previous sample.

pub mod cache;
pub mod provider;

pub use cache::{GeoLocationCache, LocationSample, RefreshTask};
pub use provider::{Geocoder, HttpGeocoder, Position, PositionOptions, PositionProvider};
