use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "retone";

/// Expands a leading `~/` in a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    if let Some(rest) = trimmed.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(trimmed)
}

/// ~/.config/retone/
pub fn config_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.config_dir().join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
}

/// ~/.local/share/retone/ - notification history
pub fn data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.data_dir().join(APP_DIR))
        .unwrap_or_else(|| env::temp_dir().join(APP_DIR))
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.jsonc")
}

pub fn notifications_file() -> PathBuf {
    data_dir().join("notifications.json")
}
