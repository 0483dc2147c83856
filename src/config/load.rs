//! Root-config discovery and environment overrides.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{AtmosConfig, parse_config};
use crate::constants::{CONFIG_PATH_ENV, ROOT_CONFIG_FILE, STACKS_BASE_PATH_ENV};

/// Locate the root config file.
///
/// Order: explicit `--config` flag, `ATMOS_CLI_CONFIG_PATH`, `./atmos.yaml`
/// in `cwd`, then `~/.atmos/atmos.yaml`. Returns `None` when nothing
/// exists, which is not an error; defaults apply.
pub fn discover_config(flag: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(explicit) = flag {
        return Some(explicit.to_path_buf());
    }
    if let Ok(from_env) = std::env::var(CONFIG_PATH_ENV) {
        if !from_env.is_empty() {
            let path = PathBuf::from(from_env);
            // The env var may point at the file or its directory.
            return Some(if path.is_dir() { path.join(ROOT_CONFIG_FILE) } else { path });
        }
    }
    let local = cwd.join(ROOT_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    let home = dirs::home_dir()?.join(".atmos").join(ROOT_CONFIG_FILE);
    home.is_file().then_some(home)
}

/// Load the configuration for this invocation.
///
/// A discovered file that fails to read or parse is fatal; no discovered
/// file yields defaults rooted at `cwd`. Environment overrides apply last.
pub fn load_config(flag: Option<&Path>, cwd: &Path) -> Result<AtmosConfig> {
    let mut config = match discover_config(flag, cwd) {
        Some(path) => {
            let source = std::fs::read_to_string(&path).map_err(|e| {
                crate::core::AtmosError::FileSystemError {
                    path: path.clone(),
                    message: e.to_string(),
                }
            })?;
            let base = path.parent().unwrap_or(cwd).to_path_buf();
            debug!(path = %path.display(), "loaded root configuration");
            parse_config(&source, &path, &base)?
        }
        None => {
            debug!("no root configuration found; using defaults");
            let mut defaults = AtmosConfig::default();
            defaults.base_path = cwd.to_path_buf();
            defaults
        }
    };

    apply_env_overrides(&mut config);
    config.validate()?;
    config.warn_deprecations();
    Ok(config)
}

/// Environment-variable overrides for individual settings.
fn apply_env_overrides(config: &mut AtmosConfig) {
    if let Ok(stacks) = std::env::var(STACKS_BASE_PATH_ENV) {
        if !stacks.is_empty() {
            config.stacks.base_path = stacks;
        }
    }
    if let Ok(namespace) = std::env::var(crate::constants::AUTH_NAMESPACE_ENV) {
        if !namespace.is_empty() {
            config.auth.namespace = Some(namespace);
        }
    }
}
