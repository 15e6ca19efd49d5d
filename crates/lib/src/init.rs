//! Initialize the configuration directory: create ~/.clerk and a template config.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{Config, StoreConfig};

/// Create the config directory and a template `config.json` if they do not exist.
/// The template carries empty store credentials so the user knows which keys to fill in.
/// An existing config file is left untouched.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let template = Config {
            store: StoreConfig {
                base_url: Some(String::new()),
                consumer_key: Some(String::new()),
                consumer_secret: Some(String::new()),
            },
            ..Config::default()
        };
        let json = serde_json::to_string_pretty(&template).context("serializing template config")?;
        std::fs::write(config_path, json)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}
