//! vitalcache - command-line front-end for the offline cache layer.
//!
//! Drives the worker host against an on-disk cache so the install, fetch and
//! control-message paths can be exercised outside a browser.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use vitalcache_core::auth::{
    ClientAuthCache, CredentialStore, DecisionStore, FileDecisionStore, HttpSessionVerifier,
};
use vitalcache_core::geo::{Geocoder, HttpGeocoder};
use vitalcache_core::http::{HttpNetwork, Request};
use vitalcache_core::storage::DiskStorage;
use vitalcache_core::{Config, SystemClock, WorkerHandle, WorkerHost};

/// Environment variable holding the bearer credential
const TOKEN_ENV: &str = "VITALCACHE_TOKEN";

/// Environment variable enabling the daily log file
const LOG_DIR_ENV: &str = "VITALCACHE_LOG_DIR";

/// Keychain account the credential is stored under
const CREDENTIAL_ACCOUNT: &str = "default";

const USAGE: &str = "usage: vitalcache <command>

commands:
  init <origin>            write a config file for the given origin
  install                  install and activate the worker for the configured origin
  fetch <path> [--navigate]  fetch through the active worker
  info                     print cache generations and entry counts
  clear                    clear the dynamic cache
  auth                     print the current auth decision
  geocode <lat> <lng>      resolve coordinates through the configured geocoder
  sign-in <token>          store a credential and drop the cached decision
  sign-out                 remove the credential and user-bound caches";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vitalcache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load().context("Failed to load config")?;
    info!(command = %command, "vitalcache starting");

    match command.as_str() {
        "init" => {
            let origin = args.get(1).context("init requires an origin")?;
            init(&mut config, origin)
        }
        "install" => install(&config).await,
        "fetch" => {
            let path = args.get(1).context("fetch requires a path")?;
            let navigate = args.iter().skip(2).any(|a| a == "--navigate");
            fetch(&config, path, navigate).await
        }
        "info" => print_info(&config).await,
        "clear" => clear(&config).await,
        "auth" => print_auth(&config).await,
        "geocode" => {
            let lat = args.get(1).context("geocode requires a latitude")?;
            let lng = args.get(2).context("geocode requires a longitude")?;
            geocode(&config, lat, lng).await
        }
        "sign-in" => {
            let token = args.get(1).context("sign-in requires a token")?;
            sign_in(&config, token)
        }
        "sign-out" => sign_out(&config).await,
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("unknown command: {}\n\n{}", other, USAGE),
    }
}

fn origin(config: &Config) -> Result<Url> {
    let origin = config
        .origin
        .as_deref()
        .context("No origin configured (set VITALCACHE_ORIGIN or edit config.json)")?;
    Url::parse(origin).with_context(|| format!("Invalid origin: {}", origin))
}

fn spawn_host(config: &Config) -> Result<WorkerHandle> {
    let cache_dir = config.cache_dir()?;
    let storage = DiskStorage::new(cache_dir.join("stores")).context("Failed to open cache storage")?;
    let network = HttpNetwork::new(config.request_timeout()).context("Failed to build HTTP client")?;
    Ok(WorkerHost::spawn(
        Arc::new(storage),
        Arc::new(network),
        Arc::new(SystemClock),
    ))
}

/// Spawn the host and adopt the generation a previous `install` left behind.
async fn resume_host(config: &Config) -> Result<WorkerHandle> {
    let handle = spawn_host(config)?;
    handle
        .resume(config.clone())
        .await
        .context("No installed cache generation (run `vitalcache install` first)")?;
    Ok(handle)
}

fn init(config: &mut Config, origin: &str) -> Result<()> {
    let origin = Url::parse(origin).with_context(|| format!("Invalid origin: {}", origin))?;
    config.origin = Some(origin.origin().ascii_serialization());
    config.save().context("Failed to save config")?;
    println!("origin set to {}", origin.origin().ascii_serialization());
    Ok(())
}

async fn install(config: &Config) -> Result<()> {
    let handle = spawn_host(config)?;
    let state = handle
        .register(config.clone())
        .await
        .context("Install failed")?;
    println!("worker {} ({})", state, config.static_cache_name());
    Ok(())
}

async fn fetch(config: &Config, path: &str, navigate: bool) -> Result<()> {
    let url = origin(config)?
        .join(path)
        .with_context(|| format!("Invalid path: {}", path))?;
    let handle = resume_host(config).await?;

    let request = if navigate {
        Request::navigate(url)
    } else {
        Request::get(url)
    };
    let outcome = handle.fetch(request).await.context("Fetch failed")?;
    println!(
        "{} {:?} {:?} {} bytes",
        outcome.response.status,
        outcome.class,
        outcome.source,
        outcome.response.body.len()
    );
    Ok(())
}

async fn print_info(config: &Config) -> Result<()> {
    let handle = resume_host(config).await?;
    let info = handle.cache_info().await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn clear(config: &Config) -> Result<()> {
    let handle = resume_host(config).await?;
    handle.clear_cache().await?;
    // Wait for the host to handle the clear before exiting
    let info = handle.cache_info().await?;
    println!("cleared, {} entries remain", info.total_entries());
    Ok(())
}

fn auth_cache(config: &Config) -> Result<ClientAuthCache> {
    let verify_url = config
        .verify_url
        .as_deref()
        .context("No verify_url configured")?;
    let verify_url = Url::parse(verify_url).with_context(|| format!("Invalid verify_url: {}", verify_url))?;
    let verifier = HttpSessionVerifier::new(verify_url, config.request_timeout())
        .context("Failed to build HTTP client")?;
    let store = FileDecisionStore::new(config.cache_dir()?);

    let cache = ClientAuthCache::new(
        Arc::new(verifier),
        Arc::new(store),
        Arc::new(SystemClock),
        config.auth_ttl(),
    );
    let token = std::env::var(TOKEN_ENV)
        .ok()
        .or_else(|| CredentialStore::get(CREDENTIAL_ACCOUNT).ok());
    Ok(match token {
        Some(token) => cache.with_credential(token),
        None => cache,
    })
}

async fn print_auth(config: &Config) -> Result<()> {
    let cache = auth_cache(config)?;
    let decision = cache.read().await.context("Session verification failed")?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

async fn geocode(config: &Config, lat: &str, lng: &str) -> Result<()> {
    let lat: f64 = lat.parse().with_context(|| format!("Invalid latitude: {}", lat))?;
    let lng: f64 = lng.parse().with_context(|| format!("Invalid longitude: {}", lng))?;
    let geocoder = HttpGeocoder::from_config(config)?;
    let address = geocoder.reverse(lat, lng).await.context("Reverse lookup failed")?;
    println!("{}", address);
    Ok(())
}

fn sign_in(config: &Config, token: &str) -> Result<()> {
    CredentialStore::store(CREDENTIAL_ACCOUNT, token)?;
    FileDecisionStore::new(config.cache_dir()?).clear()?;
    println!("signed in");
    Ok(())
}

async fn sign_out(config: &Config) -> Result<()> {
    if let Err(e) = CredentialStore::delete(CREDENTIAL_ACCOUNT) {
        tracing::warn!(error = %e, "No stored credential to delete");
    }
    FileDecisionStore::new(config.cache_dir()?).clear()?;

    if let Ok(handle) = resume_host(config).await {
        handle.clear_cache().await?;
        handle.cache_info().await?;
    }
    println!("signed out");
    Ok(())
}
