//! Clipboard-mediated text capture and replacement.
//!
//! Everything in here treats the OS clipboard as a resource the automation
//! borrows: the user's clipboard text is backed up when a session starts and
//! written back on every exit path, with two deliberate exceptions (freshly
//! copied text left for the caller, and a paste that is still in flight).

mod calibration;
mod clipboard;
mod focus;
mod keyboard;
mod poll;
mod protocol;

pub use calibration::{
    percentile, recommend_sync_delay_ms, CalibrationOutcome, Calibrator, ClipboardMeasurement,
    RecommendedDelays, CALIBRATION_TRIALS, MAX_SYNC_DELAY_MS, MIN_SYNC_DELAY_MS,
    SYNC_DELAY_STEP_MS,
};
pub use clipboard::{ClipboardBackend, ClipboardGuard, SystemClipboard};
pub use focus::{focus_channel, FocusChannel, FocusRequest, FocusResponder, FocusResponse};
pub use keyboard::{EnigoKeyboard, KeyboardBackend, KeyboardSimulator, Modifier, Shortcut};
pub use poll::poll_until;
pub use protocol::{
    AutomationSession, CaptureMode, Captured, CopyOutcome, ReplaceOutcome, TextAutomation,
    SYNC_POLL_INTERVAL,
};

use crate::config::AutomationConfig;
use std::time::Duration;
use tracing::warn;

/// Settle time after a simulated select-all when nothing valid is configured.
pub const DEFAULT_SELECTION_DELAY_MS: u64 = 100;

/// Normalized timing knobs consumed by the capture/replace protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelaySettings {
    /// Upper bound for waiting on the clipboard after a copy. Zero disables
    /// sentinel synchronization entirely.
    pub clipboard_sync_delay: Duration,
    pub selection_delay: Duration,
    /// How long a paste must have been in flight before the backup may be
    /// written back over it.
    pub paste_settle: Duration,
    pub paste_safety_window: Duration,
}

impl DelaySettings {
    pub fn from_config(config: &AutomationConfig) -> Self {
        let delays = Self {
            clipboard_sync_delay: Duration::from_millis(normalize_delay_ms(
                config.clipboard_sync_delay_ms,
                0,
            )),
            selection_delay: Duration::from_millis(normalize_delay_ms(
                config.selection_delay_ms,
                DEFAULT_SELECTION_DELAY_MS,
            )),
            paste_settle: Duration::from_millis(config.paste_settle_ms),
            paste_safety_window: Duration::from_millis(config.paste_safety_window_ms),
        };
        if !delays.paste_can_settle() {
            warn!(
                "Paste settle time {} ms is not below the {} ms safety window; restores will defer",
                config.paste_settle_ms, config.paste_safety_window_ms
            );
        }
        delays
    }

    /// False when the settle time reaches past the safety window, so no
    /// paste can ever count as consumed.
    pub fn paste_can_settle(&self) -> bool {
        self.paste_settle < self.paste_safety_window
    }

    pub fn clipboard_sync_delay_ms(&self) -> u64 {
        self.clipboard_sync_delay.as_millis() as u64
    }

    pub fn selection_delay_ms(&self) -> u64 {
        self.selection_delay.as_millis() as u64
    }
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self::from_config(&AutomationConfig::default())
    }
}

/// Turns a raw settings value into a usable millisecond count.
///
/// Missing, negative, NaN and infinite values all map to `fallback`.
pub fn normalize_delay_ms(value: Option<f64>, fallback: u64) -> u64 {
    match value {
        Some(ms) if ms.is_finite() && ms >= 0.0 => ms.round() as u64,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_keeps_finite_non_negative_values() {
        assert_eq!(normalize_delay_ms(Some(125.0), 0), 125);
        assert_eq!(normalize_delay_ms(Some(0.0), 40), 0);
        assert_eq!(normalize_delay_ms(Some(74.6), 0), 75);
    }

    #[test]
    fn normalize_rejects_negative_and_non_finite_values() {
        assert_eq!(normalize_delay_ms(Some(-5.0), 0), 0);
        assert_eq!(normalize_delay_ms(Some(f64::NAN), 0), 0);
        assert_eq!(normalize_delay_ms(Some(f64::INFINITY), 0), 0);
        assert_eq!(normalize_delay_ms(Some(f64::NEG_INFINITY), 100), 100);
        assert_eq!(normalize_delay_ms(None, 100), 100);
    }

    #[test]
    fn selection_delay_falls_back_to_protocol_default() {
        let config = AutomationConfig {
            clipboard_sync_delay_ms: Some(-1.0),
            selection_delay_ms: Some(f64::NAN),
            ..AutomationConfig::default()
        };
        let delays = DelaySettings::from_config(&config);
        assert_eq!(delays.clipboard_sync_delay, Duration::ZERO);
        assert_eq!(delays.selection_delay_ms(), DEFAULT_SELECTION_DELAY_MS);
    }

    #[test]
    fn default_paste_timing_can_settle() {
        assert!(DelaySettings::default().paste_can_settle());

        let config = AutomationConfig {
            paste_settle_ms: 300,
            paste_safety_window_ms: 300,
            ..AutomationConfig::default()
        };
        assert!(!DelaySettings::from_config(&config).paste_can_settle());
    }
}
