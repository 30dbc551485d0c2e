pub mod model;
pub mod nickname;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use model::{AppConfig, BotConfig, IrcConfig, LoggingConfig, PublishConfig, RetryConfig};

const CONFIG_ENV: &str = "CHATRELAY_CONFIG";

/// Config file location: explicit path, else `$CHATRELAY_CONFIG`, else the
/// platform config directory.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("chatrelay")
                .join("config.toml")
        })
}

/// Reads, normalizes and validates the config at `path`. A missing file is
/// created with the defaults.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?
    } else {
        let config = AppConfig::default();
        save_config(path, &config)?;
        config
    };
    config.normalize();
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(config).with_context(|| "Failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    Ok(())
}
