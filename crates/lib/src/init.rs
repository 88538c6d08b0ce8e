//! Initialize the configuration directory: create ~/.tdt, a default config, and the taxonomies volume.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};

/// Volume directory created next to the config when none is configured.
const DEFAULT_VOLUME_DIR: &str = "taxonomies";

/// Ensure the taxonomies volume exists before serving. Returns the volume path.
pub fn require_initialized(config_path: &Path, config: &Config) -> Result<PathBuf> {
    let volume = resolve_volume(config_path, config);
    if !volume.is_dir() {
        anyhow::bail!(
            "taxonomies volume not found: {} (run `tdt-api init` or set TAXONOMIES_VOLUME)",
            volume.display()
        );
    }
    Ok(volume)
}

/// Volume from TAXONOMIES_VOLUME / config, else `<config dir>/taxonomies`.
pub fn resolve_volume(config_path: &Path, config: &Config) -> PathBuf {
    config::resolve_taxonomies_volume(config)
        .unwrap_or_else(|| config::config_dir(config_path).join(DEFAULT_VOLUME_DIR))
}

/// Create the config directory and default files if they do not exist.
/// - Writes `config.json` with the default settings if missing.
/// - Creates the taxonomies volume (configured, or `taxonomies/` next to the config).
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config::config_dir(config_path);
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default_config = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let (config, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let volume = resolve_volume(config_path, &config);
    if !volume.exists() {
        std::fs::create_dir_all(&volume)
            .with_context(|| format!("creating taxonomies volume {}", volume.display()))?;
        log::info!("created taxonomies volume at {}", volume.display());
    } else {
        log::debug!("taxonomies volume already exists at {}, skipping", volume.display());
    }
    Ok(volume)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_config_and_volume_once() {
        if std::env::var_os("TAXONOMIES_VOLUME").is_some() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let volume = init_config_dir(&path).unwrap();
        assert!(path.is_file());
        assert_eq!(volume, dir.path().join("nested").join(DEFAULT_VOLUME_DIR));
        assert!(volume.is_dir());

        std::fs::write(&path, r#"{"gateway":{"port":9001}}"#).unwrap();
        init_config_dir(&path).unwrap();
        let (config, _) = config::load_config(Some(path.clone())).unwrap();
        assert_eq!(config.gateway.port, 9001);
        assert_eq!(require_initialized(&path, &config).unwrap(), volume);
    }

    #[test]
    fn missing_volume_is_reported() {
        if std::env::var_os("TAXONOMIES_VOLUME").is_some() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.taxonomies.volume = Some(dir.path().join("absent"));
        let err = require_initialized(&dir.path().join("config.json"), &config).unwrap_err();
        assert!(err.to_string().contains("absent"));
    }
}
