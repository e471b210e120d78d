mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./config.toml",
        "./darkroom.toml",
        "~/.config/darkroom/config.toml",
        "/etc/darkroom/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.storage.chunk_size == 0 {
        anyhow::bail!("Chunk size cannot be 0");
    }

    if config.storage.chunk_insert_batch == 0 {
        anyhow::bail!("Chunk insert batch cannot be 0");
    }

    for target in &config.notify {
        if target.enabled && target.url.is_empty() {
            anyhow::bail!("Notify target '{}' is enabled but has no URL", target.name);
        }
    }

    Ok(())
}
