use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use time::macros::format_description;

use crate::config::NotificationsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    NoText,
    CaptureFailed,
    RewriteFailed,
    CalibrationFailed,
    Calibrated,
}

impl NotificationKind {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Success => "Text fixed",
            Self::NoText => "No text captured",
            Self::CaptureFailed => "Capture failed",
            Self::RewriteFailed => "Rewrite failed",
            Self::CalibrationFailed => "Calibration failed",
            Self::Calibrated => "Calibration saved",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::CaptureFailed | Self::RewriteFailed | Self::CalibrationFailed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub timestamp: String,
}

/// Keeps the most recent notifications on disk, newest first.
pub struct NotificationStore {
    history_file: PathBuf,
    max_history: usize,
    enabled: bool,
}

impl NotificationStore {
    pub fn new(history_file: PathBuf, max_history: usize, enabled: bool) -> Result<Self> {
        if let Some(parent) = history_file.parent() {
            fs::create_dir_all(parent).context("Failed to create notification directory")?;
        }

        Ok(Self {
            history_file,
            max_history: max_history.max(1),
            enabled,
        })
    }

    pub fn from_config(config: &NotificationsConfig) -> Result<Self> {
        Self::new(config.history_path(), config.max_history, config.enabled)
    }

    pub fn path(&self) -> &Path {
        &self.history_file
    }

    pub fn push(&self, kind: NotificationKind, message: &str) -> Result<()> {
        if kind.is_error() {
            tracing::warn!("🔔 {}: {}", kind.title(), message);
        } else {
            tracing::info!("🔔 {}: {}", kind.title(), message);
        }

        if !self.enabled {
            return Ok(());
        }

        let mut entries = self.list();
        entries.insert(
            0,
            Notification {
                kind,
                message: message.to_string(),
                timestamp: local_timestamp(),
            },
        );
        entries.truncate(self.max_history);

        let json =
            serde_json::to_string_pretty(&entries).context("Failed to serialize notifications")?;
        fs::write(&self.history_file, json).context("Failed to write notification history")?;

        tracing::debug!(entries = entries.len(), "Saved notification history");
        Ok(())
    }

    /// Stored notifications, newest first. A missing or corrupt file reads as
    /// empty.
    pub fn list(&self) -> Vec<Notification> {
        fs::read_to_string(&self.history_file)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn clear(&self) -> Result<()> {
        if self.history_file.exists() {
            fs::remove_file(&self.history_file).context("Failed to remove notification history")?;
        }
        Ok(())
    }
}

fn local_timestamp() -> String {
    time::OffsetDateTime::now_local()
        .unwrap_or_else(|_| time::OffsetDateTime::now_utc())
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| "unknown".to_string())
}
