use crate::model::PersistedSettings;
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const APP_DIR: &str = "gesture-player";
const SETTINGS_FILE: &str = "settings.json";
pub const CONFIG_DIR_ENV: &str = "GESTURE_PLAYER_CONFIG_DIR";

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(override_dir));
    }

    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .context("neither HOME nor USERPROFILE is set")?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(config_root()?.join(SETTINGS_FILE))
}

pub fn ensure_config_dir() -> Result<PathBuf> {
    let root = config_root()?;
    fs::create_dir_all(&root).with_context(|| format!("failed to create {}", root.display()))?;
    Ok(root)
}

pub fn load_settings() -> Result<PersistedSettings> {
    let path = settings_path()?;
    if !path.exists() {
        debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(PersistedSettings::default());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let settings: PersistedSettings = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}

pub fn save_settings(settings: &PersistedSettings) -> Result<()> {
    ensure_config_dir()?;
    let path = settings_path()?;
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), "settings saved");
    Ok(())
}
