use crate::automation::RecommendedDelays;
use crate::paths::expand_tilde;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const CONFIG_HEADER: &str =
    "// retone-rs configuration (JSONC: comments and trailing commas are allowed)\n";
const WATCH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub automation: AutomationConfig,
    pub rewrite: RewriteConfig,
    pub shortcuts: ShortcutsConfig,
    pub notifications: NotificationsConfig,
}

impl Config {
    pub fn fix_selection_shortcut(&self) -> Option<&str> {
        normalized_shortcut(self.shortcuts.fix_selection.as_deref())
    }

    pub fn fix_field_shortcut(&self) -> Option<&str> {
        normalized_shortcut(self.shortcuts.fix_field.as_deref())
    }
}

fn normalized_shortcut(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Clipboard timing. The two calibrated delays stay raw numbers here; the
/// automation core normalizes them (negative or non-finite values are
/// treated as unset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub clipboard_sync_delay_ms: Option<f64>,
    pub selection_delay_ms: Option<f64>,
    /// Time a paste must stay on the clipboard before the backup goes back.
    /// Must be shorter than `paste_safety_window_ms`; otherwise no paste can
    /// settle in time and every restore is deferred.
    pub paste_settle_ms: u64,
    /// Upper bound on the post-paste wait.
    pub paste_safety_window_ms: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            clipboard_sync_delay_ms: Some(250.0),
            selection_delay_ms: Some(100.0),
            paste_settle_ms: 150,
            paste_safety_window_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Base URL of an OpenAI-compatible API (`/chat/completions` is appended).
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Tone hint passed along with the text, e.g. "neutral" or "friendly".
    pub tone: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "RETONE_API_KEY".to_string(),
            tone: "neutral".to_string(),
            request_timeout_secs: 30,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortcutsConfig {
    pub fix_selection: Option<String>,
    pub fix_field: Option<String>,
}

impl Default for ShortcutsConfig {
    fn default() -> Self {
        Self {
            fix_selection: Some("SUPER+ALT+G".to_string()),
            fix_field: Some("SUPER+ALT+F".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub enabled: bool,
    pub max_history: usize,
    /// Overrides the history location; `~/` is expanded.
    pub history_file: Option<String>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_history: 20,
            history_file: None,
        }
    }
}

impl NotificationsConfig {
    pub fn history_path(&self) -> PathBuf {
        self.history_file
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(crate::paths::notifications_file)
    }
}

/// Owns the config file and broadcasts every successfully parsed revision.
pub struct ConfigManager {
    path: PathBuf,
    tx: Arc<watch::Sender<Config>>,
}

impl ConfigManager {
    pub fn load() -> Result<Self> {
        Self::load_from(crate::paths::config_file())
    }

    /// Loads `path`, writing a default config there first if it is missing.
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            write_config(&path, &Config::default())?;
            info!("📝 Wrote default configuration to {}", path.display());
        }

        let config = read_config(&path)?;
        let (tx, _rx) = watch::channel(config);
        Ok(Self {
            path,
            tx: Arc::new(tx),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Config {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.tx.subscribe()
    }

    /// Polls the file's modification time and republishes the config when it
    /// changes. Parse errors are logged and the previous config stays active.
    pub fn start_watching(&self) {
        let path = self.path.clone();
        let tx = Arc::clone(&self.tx);

        tokio::spawn(async move {
            let mut last_modified = modified_time(&path);
            let mut ticker = tokio::time::interval(WATCH_INTERVAL);

            loop {
                ticker.tick().await;
                let modified = modified_time(&path);
                if modified == last_modified {
                    continue;
                }
                last_modified = modified;

                match read_config(&path) {
                    Ok(config) => {
                        debug!("Configuration file changed on disk");
                        tx.send_if_modified(|current| {
                            if *current == config {
                                return false;
                            }
                            *current = config;
                            true
                        });
                    }
                    Err(err) => warn!("Ignoring invalid configuration update: {err:#}"),
                }
            }
        });
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        write_config(&self.path, config)?;
        self.tx.send_replace(config.clone());
        Ok(())
    }

    /// Persists the delays a calibration run recommended.
    pub fn save_recommended_delays(&self, recommended: &RecommendedDelays) -> Result<()> {
        let mut config = self.get();
        config.automation.clipboard_sync_delay_ms =
            Some(recommended.clipboard_sync_delay_ms as f64);
        config.automation.selection_delay_ms = Some(recommended.selection_delay_ms as f64);
        self.save(&config)?;
        info!(
            "💾 Saved calibrated delays (clipboard sync: {} ms, selection: {} ms)",
            recommended.clipboard_sync_delay_ms, recommended.selection_delay_ms
        );
        Ok(())
    }
}

pub fn parse_config(text: &str) -> Result<Config> {
    let value = jsonc_parser::parse_to_serde_value(text, &Default::default())
        .map_err(|err| anyhow!("Invalid JSONC: {err}"))?;
    match value {
        Some(value) => serde_json::from_value(value).context("Invalid configuration"),
        None => Ok(Config::default()),
    }
}

fn read_config(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse_config(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, format!("{CONFIG_HEADER}{json}\n"))
        .with_context(|| format!("Failed to write config file {}", path.display()))
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
