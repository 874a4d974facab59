use std::path::{Path, PathBuf};

use super::types::{StoreProvider, TrackerConfig};
use crate::error::TrackerError;

/// Get the default tether data directory: ~/.tether
pub fn get_tether_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".tether"))
}

pub fn load_from_path(path: &Path) -> Result<TrackerConfig, TrackerError> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| TrackerError::Config(format!("read {}: {e}", path.display())))?;
    toml::from_str::<TrackerConfig>(&s)
        .map_err(|e| TrackerError::Config(format!("parse {}: {e}", path.display())))
}

pub fn load_default() -> anyhow::Result<TrackerConfig> {
    // Priority 1: ~/.tether/config.toml (highest)
    let data_dir = get_tether_data_dir()?;
    let home_config = data_dir.join("config.toml");

    // Priority 2: ./tether.toml (current directory)
    let local_config = Path::new("tether.toml");

    let cfg = if home_config.exists() {
        load_from_path(&home_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        TrackerConfig::default()
    };

    finish(cfg, &data_dir)
}

/// Loads `path` and fills in the same defaults and env overrides as
/// [`load_default`].
pub fn load_explicit(path: &Path) -> anyhow::Result<TrackerConfig> {
    let cfg = load_from_path(path)?;
    finish(cfg, &get_tether_data_dir()?)
}

fn finish(mut cfg: TrackerConfig, data_dir: &Path) -> anyhow::Result<TrackerConfig> {
    if cfg.store.provider == StoreProvider::File && is_blank(cfg.store.directory.as_deref()) {
        cfg.store.directory = Some(data_dir.join("store").to_string_lossy().to_string());
    }

    if cfg.logging.file && is_blank(cfg.logging.directory.as_deref()) {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg);

    Ok(cfg)
}

fn is_blank(v: Option<&str>) -> bool {
    v.map(|s| s.trim().is_empty()).unwrap_or(true)
}

// Environment variable overrides (Priority 0: highest)
fn apply_env_overrides(cfg: &mut TrackerConfig) {
    if let Ok(v) = std::env::var("TETHER_STORE_DIR") {
        if !v.trim().is_empty() {
            cfg.store.provider = StoreProvider::File;
            cfg.store.directory = Some(v);
        }
    }
    if let Some(v) = env_u64("TETHER_SESSION_GAP_SECS") {
        cfg.engagement.session_gap_secs = v;
    }
    if let Some(v) = env_u64("TETHER_BACKGROUND_TIMEOUT_SECS") {
        cfg.engagement.background_timeout_secs = v;
    }
    if let Some(v) = env_u64("TETHER_ONBOARDING_BACKGROUND_SECS") {
        cfg.onboarding.background_threshold_secs = v;
    }
    if let Ok(v) = std::env::var("TETHER_EVENTS_OUT") {
        if !v.trim().is_empty() {
            cfg.events_out.enabled = true;
            cfg.events_out.path = v;
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let v = std::env::var(name).ok()?;
    match v.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(var = name, value = %v, "ignoring non-numeric override");
            None
        }
    }
}
