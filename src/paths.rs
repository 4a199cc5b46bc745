//! Centralized path resolution for skiff
//!
//! # Environment Variables
//!
//! - `SKIFF_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/skiff`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `SKIFF_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/skiff` (if set)
//! 3. `~/.config/skiff`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "SKIFF_CONFIG_DIR";

/// Registry file name inside the config directory
pub const REGISTRY_FILE: &str = "machines.toml";

/// Get the skiff config directory path
pub fn config_dir() -> Result<PathBuf> {
    resolve_config_dir(
        std::env::var(ENV_CONFIG_DIR).ok().as_deref(),
        std::env::var("XDG_CONFIG_HOME").ok().as_deref(),
        dirs::home_dir().as_deref(),
    )
}

/// Resolution behind [`config_dir`], with the environment passed in.
fn resolve_config_dir(
    override_dir: Option<&str>,
    xdg_config: Option<&str>,
    home: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(dir) = override_dir.filter(|dir| !dir.is_empty()) {
        let path = expand(dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Some(xdg_config) = xdg_config.filter(|dir| !dir.is_empty()) {
        let path = PathBuf::from(xdg_config).join("skiff");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = home.context("Could not determine home directory")?;
    let path = home.join(".config").join("skiff");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Path of the machine registry, honouring an explicit `--config`.
pub fn registry_file(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(&path.to_string_lossy())),
        None => Ok(config_dir()?.join(REGISTRY_FILE)),
    }
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
