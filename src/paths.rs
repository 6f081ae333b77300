//! Path resolution for flagops
//!
//! # Environment Variables
//!
//! - `FLAGOPS_MANIFEST` - Manifest file to use when `--file` is not given
//! - `FLAGOPS_CONFIG_DIR` - Override the config directory
//!
//! # Manifest Resolution Priority
//!
//! 1. `--file` argument
//! 2. `FLAGOPS_MANIFEST` environment variable
//! 3. `./flagops.toml` if it exists
//! 4. `<config_dir>/flagops.toml`
//!
//! For config_dir():
//! 1. `FLAGOPS_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/flagops` (if set)
//! 3. `~/.config/flagops`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming the manifest file
pub const ENV_MANIFEST: &str = "FLAGOPS_MANIFEST";

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "FLAGOPS_CONFIG_DIR";

/// Manifest file name looked up in the working and config directories
pub const MANIFEST_FILE: &str = "flagops.toml";

/// Get the flagops config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("flagops");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("flagops");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Resolve the manifest path
///
/// The returned path is not checked for existence except for the working
/// directory candidate.
pub fn manifest_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(expand(&path.to_string_lossy()));
    }

    if let Ok(file) = std::env::var(ENV_MANIFEST) {
        let path = expand(&file);
        log::debug!("Using manifest from {}: {}", ENV_MANIFEST, path.display());
        return Ok(path);
    }

    let local = PathBuf::from(MANIFEST_FILE);
    if local.exists() {
        return Ok(local);
    }

    Ok(config_dir()?.join(MANIFEST_FILE))
}

/// Expand ~ and environment variables in a path string.
///
/// # Examples
///
/// ```ignore
/// let path = paths::expand("~/flags/${TEAM}.toml");
/// ```
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
