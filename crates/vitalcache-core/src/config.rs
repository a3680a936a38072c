//! Client cache configuration.
//!
//! Covers cache generation naming, the install manifest, request
//! classification rules, every TTL/timer used by the page-level caches, and
//! the collaborator endpoints.
//!
//! Configuration is stored at `~/.config/vitalcache/config.json`. Missing
//! fields fall back to their defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths and cache names
pub const APP_NAME: &str = "vitalcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the configured origin
const ORIGIN_ENV: &str = "VITALCACHE_ORIGIN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_name: String,
    pub cache_version: u32,
    /// Origin the worker controls, e.g. `https://records.example.com`
    pub origin: Option<String>,
    pub precache_manifest: Vec<String>,
    /// Document served when a navigation fails and nothing better is cached
    pub shell_path: String,

    pub static_prefixes: Vec<String>,
    pub static_extensions: Vec<String>,
    pub dynamic_prefixes: Vec<String>,

    pub auth_ttl_secs: i64,
    pub location_ttl_secs: i64,
    pub location_refresh_after_secs: i64,
    pub location_poll_interval_secs: u64,
    pub location_fix_timeout_secs: u64,
    pub location_maximum_age_secs: u64,

    pub prefetch_delay_ms: u64,
    pub critical_routes: Vec<String>,
    /// Replaces the built-in route adjacency table when set
    pub route_adjacency: Option<BTreeMap<String, Vec<String>>>,
    pub sign_in_route: String,

    pub verify_url: Option<String>,
    pub geocode_url: String,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            cache_version: 1,
            origin: None,
            precache_manifest: vec![
                "/".to_string(),
                "/manifest.json".to_string(),
                "/icons/icon-192.png".to_string(),
                "/icons/icon-512.png".to_string(),
            ],
            shell_path: "/".to_string(),

            static_prefixes: ["/_next/static/", "/static/", "/icons/", "/images/", "/fonts/"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            static_extensions: [
                "js", "css", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2",
                "ttf", "webmanifest",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            dynamic_prefixes: ["/api/", "/rest/v1/", "/auth/v1/"]
                .iter()
                .map(|s| s.to_string())
                .collect(),

            auth_ttl_secs: 5 * 60,
            location_ttl_secs: 2 * 60,
            location_refresh_after_secs: 5 * 60,
            location_poll_interval_secs: 60,
            location_fix_timeout_secs: 10,
            location_maximum_age_secs: 30,

            prefetch_delay_ms: 1000,
            critical_routes: vec!["/dashboard".to_string(), "/records".to_string()],
            route_adjacency: None,
            sign_in_route: "/login".to_string(),

            verify_url: None,
            geocode_url: "https://nominatim.openstreetmap.org/reverse".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        if let Ok(origin) = std::env::var(ORIGIN_ENV) {
            config.origin = Some(origin);
        }
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Reject TTLs and timers that would disable the cache they drive.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("auth_ttl_secs", self.auth_ttl_secs > 0),
            ("location_ttl_secs", self.location_ttl_secs > 0),
            ("location_refresh_after_secs", self.location_refresh_after_secs > 0),
            ("location_poll_interval_secs", self.location_poll_interval_secs > 0),
            ("location_fix_timeout_secs", self.location_fix_timeout_secs > 0),
            ("request_timeout_secs", self.request_timeout_secs > 0),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, ok)| !ok) {
            anyhow::bail!("{} must be greater than zero", field);
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn static_cache_name(&self) -> String {
        format!("{}-static-v{}", self.app_name, self.cache_version)
    }

    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-dynamic-v{}", self.app_name, self.cache_version)
    }

    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl_secs)
    }

    pub fn location_ttl(&self) -> Duration {
        Duration::seconds(self.location_ttl_secs)
    }

    pub fn location_refresh_after(&self) -> Duration {
        Duration::seconds(self.location_refresh_after_secs)
    }

    pub fn location_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.location_poll_interval_secs)
    }

    pub fn location_fix_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.location_fix_timeout_secs)
    }

    pub fn location_maximum_age(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.location_maximum_age_secs)
    }

    pub fn prefetch_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.prefetch_delay_ms)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}
