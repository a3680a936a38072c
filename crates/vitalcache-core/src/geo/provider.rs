use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{header, Client};
use serde::Deserialize;
use url::Url;

use crate::config::{Config, APP_NAME};
use crate::error::{CacheError, GeoError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    /// Radius in meters
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    /// How long the platform may take to produce a fix
    pub timeout: Duration,
    /// Oldest platform-cached fix that may be returned instead of a new one
    pub maximum_age: Duration,
}

/// Device geolocation capability.
pub trait PositionProvider: Send + Sync {
    fn current_position(&self, options: PositionOptions)
        -> BoxFuture<'_, std::result::Result<Position, GeoError>>;
}

/// Coordinate-to-address lookup.
pub trait Geocoder: Send + Sync {
    fn reverse(&self, lat: f64, lng: f64) -> BoxFuture<'_, Result<String>>;
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
}

/// Reverse geocoding against a Nominatim-compatible endpoint.
#[derive(Clone)]
pub struct HttpGeocoder {
    client: Client,
    url: Url,
}

impl HttpGeocoder {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vitalcache/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, url })
    }

    /// Geocoder for the configured `geocode_url`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let url = Url::parse(&config.geocode_url).map_err(|e| {
            CacheError::Config(format!("geocode_url {}: {}", config.geocode_url, e))
        })?;
        Self::new(url, config.request_timeout())
    }

    async fn lookup(&self, lat: f64, lng: f64) -> Result<String> {
        let response = self
            .client
            .get(self.url.clone())
            .header(header::ACCEPT, "application/json")
            .query(&[
                ("format", "json".to_string()),
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CacheError::from_status(status.as_u16(), &body));
        }

        let parsed: ReverseResponse = response
            .json()
            .await
            .map_err(|e| CacheError::InvalidResponse(format!("{} reverse lookup: {}", APP_NAME, e)))?;
        parsed
            .display_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CacheError::InvalidResponse("reverse lookup returned no address".to_string()))
    }
}

impl Geocoder for HttpGeocoder {
    fn reverse(&self, lat: f64, lng: f64) -> BoxFuture<'_, Result<String>> {
        self.lookup(lat, lng).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_reads_geocode_url() {
        let geocoder = HttpGeocoder::from_config(&Config::default()).unwrap();
        assert_eq!(geocoder.url.as_str(), "https://nominatim.openstreetmap.org/reverse");

        let broken = Config {
            geocode_url: "not a url".to_string(),
            ..Config::default()
        };
        assert!(HttpGeocoder::from_config(&broken).is_err());
    }

    #[test]
    fn test_reverse_response_without_address() {
        let parsed: ReverseResponse = serde_json::from_str(r#"{"error":"Unable to geocode"}"#).unwrap();
        assert!(parsed.display_name.is_none());
    }
}
