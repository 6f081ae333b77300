//! Manifest loading and API credentials

use anyhow::{Context, Result};
use flagapi::{ApiConfig, Client};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::paths;
use crate::schema::{ApiSettings, Manifest};

/// Environment variable overriding the API base URL
pub const ENV_API_URL: &str = "FLAGOPS_API_URL";

/// Environment variable overriding the SDK data base URL
pub const ENV_SDK_URL: &str = "FLAGOPS_SDK_URL";

/// Token variable of the destination account in `copy project`
pub const DEFAULT_DEST_TOKEN_ENV: &str = "LAUNCHDARKLY_DEST_ACCESS_TOKEN";

/// SDK key variable read by `test-data`
pub const DEFAULT_SDK_KEY_ENV: &str = "LAUNCHDARKLY_SDK_KEY";

/// A parsed and validated manifest with the path it came from
#[derive(Debug)]
pub struct LoadedManifest {
    pub path: PathBuf,
    pub manifest: Manifest,
}

/// Load the manifest resolved from `explicit`, the environment or the defaults
pub fn load_manifest(explicit: Option<&Path>) -> Result<LoadedManifest> {
    let path = paths::manifest_path(explicit)?;
    let manifest = read_manifest(&path)?;
    Ok(LoadedManifest { path, manifest })
}

/// Read and validate a manifest file
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read manifest: {}", path.display()))?;
    let manifest: Manifest = toml::from_str(&content)
        .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
    manifest
        .validate()
        .with_context(|| format!("Invalid manifest {}", path.display()))?;
    log::debug!(
        "Loaded {} resource(s) from {}",
        manifest.resource_count(),
        path.display()
    );
    Ok(manifest)
}

/// API settings for commands that do not need a manifest
///
/// An explicitly given manifest must load; otherwise a missing manifest
/// means the defaults.
pub fn api_settings(explicit: Option<&Path>) -> Result<ApiSettings> {
    let path = paths::manifest_path(explicit)?;
    if explicit.is_none() && !path.exists() {
        log::debug!("No manifest at {}; using default API settings", path.display());
        return Ok(ApiSettings::default());
    }
    Ok(read_manifest(&path)?.api)
}

/// Resolve API settings into a client configuration
///
/// The token comes from the environment variable named by `token_env`; the
/// base URL from `FLAGOPS_API_URL`, then `[api] base_url`.
pub fn api_config(settings: &ApiSettings) -> Result<ApiConfig> {
    let mut config = ApiConfig::new(read_token(&settings.token_env, "an access token")?);
    let base_url = std::env::var(ENV_API_URL)
        .ok()
        .or_else(|| settings.base_url.clone());
    if let Some(url) = base_url {
        log::debug!("Using API base URL {}", url);
        config = config.with_base_url(url);
    }
    Ok(config)
}

/// Client for the SDK data endpoint, keyed by the SDK key in `key_env`
pub fn sdk_client(key_env: &str) -> Result<Rc<Client>> {
    let mut config = ApiConfig::sdk(read_token(key_env, "an SDK key")?);
    if let Ok(url) = std::env::var(ENV_SDK_URL) {
        log::debug!("Using SDK base URL {}", url);
        config = config.with_base_url(url);
    }
    Ok(Rc::new(Client::new(config)))
}

fn read_token(var: &str, what: &str) -> Result<String> {
    let token = std::env::var(var).with_context(|| format!("No API token: set {var} to {what}"))?;
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("{var} is empty");
    }
    Ok(token.to_string())
}

/// Build a shared client from API settings
pub fn client(settings: &ApiSettings) -> Result<Rc<Client>> {
    Ok(Rc::new(Client::new(api_config(settings)?)))
}
