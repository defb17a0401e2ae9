// Configuration source loading.
//
// Priority order:
// 1. Environment variables (TALLY_* prefix)
// 2. Config file path from TALLY_CONFIG
// 3. Default config files (./tally.toml, ./.tally.toml)
// 4. Built-in defaults

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::RuntimeConfig;

/// Load configuration from a specific file path (for the CLI --config
/// flag), then apply environment overrides and validate.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config: RuntimeConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration with graceful fallback to defaults: tries
/// TALLY_CONFIG, then standard file locations, then built-in defaults.
pub fn load_or_default() -> Result<RuntimeConfig> {
    let mut config = match load_from_file()? {
        Some(file_config) => file_config,
        None => RuntimeConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file() -> Result<Option<RuntimeConfig>> {
    if let Ok(path) = env::var("TALLY_CONFIG") {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: RuntimeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        return Ok(Some(config));
    }

    for path in &["./tally.toml", "./.tally.toml"] {
        if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            let config: RuntimeConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path))?;
            return Ok(Some(config));
        }
    }

    Ok(None)
}

fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<()> {
    if let Ok(tz) = env::var("TALLY_TIMEZONE") {
        config.timezone = tz;
    }
    if let Ok(addr) = env::var("TALLY_LISTEN_ADDR") {
        config.server.listen_addr = addr;
    }
    if let Ok(level) = env::var("TALLY_LOG_LEVEL") {
        config.server.log_level = level;
    }
    if let Ok(backend) = env::var("TALLY_STORAGE_BACKEND") {
        config.storage.backend = backend
            .parse()
            .context("Invalid TALLY_STORAGE_BACKEND value")?;
    }
    if let Ok(path) = env::var("TALLY_DATA_DIR") {
        config.storage.fs.get_or_insert_with(Default::default).path = path;
    }
    if let Ok(url) = env::var("TALLY_NOTIFY_URL") {
        config.notify.url = Some(url);
    }
    if let Ok(time) = env::var("TALLY_PUBLISH_TIME") {
        config.publish.time = time;
    }
    if let Ok(policy) = env::var("TALLY_STARTUP_POLICY") {
        config.startup.policy = policy
            .parse()
            .context("Invalid TALLY_STARTUP_POLICY value")?;
    }
    if let Ok(raw) = env::var("TALLY_MAX_BATCH") {
        match raw.parse() {
            Ok(value) => config.buffer.max_batch = value,
            Err(_) => warn!(value = %raw, "Ignoring unparseable TALLY_MAX_BATCH"),
        }
    }
    if let Ok(raw) = env::var("TALLY_FLUSH_INTERVAL_SECS") {
        match raw.parse() {
            Ok(value) => config.buffer.flush_interval_secs = value,
            Err(_) => warn!(value = %raw, "Ignoring unparseable TALLY_FLUSH_INTERVAL_SECS"),
        }
    }

    Ok(())
}
