use super::clipboard::{ClipboardBackend, ClipboardGuard, SystemClipboard};
use super::keyboard::{EnigoKeyboard, KeyboardBackend, KeyboardSimulator};
use super::poll::poll_until;
use super::DelaySettings;
use anyhow::Result;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Clipboard polling cadence while waiting on a copy or a paste.
pub const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How a simulated copy resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The clipboard moved away from the sentinel within the sync window.
    Copied,
    /// The sentinel was still there at the deadline; the previous clipboard
    /// text has been written back.
    TimedOut,
    /// Sync delay is zero, so the copy was not observed at all.
    Unsynchronized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Whatever the user already selected.
    Selection,
    /// Select-all in the focused field first.
    Field,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub text: String,
    pub outcome: CopyOutcome,
}

impl Captured {
    /// True when there is nothing worth rewriting: the copy never landed or
    /// the text is blank.
    pub fn is_empty(&self) -> bool {
        self.outcome == CopyOutcome::TimedOut || self.text.trim().is_empty()
    }
}

/// What happened to the user's clipboard after a paste.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The paste settled inside the safety window and the backup is back.
    Restored,
    /// The paste had not settled when the window closed. The clipboard keeps
    /// the pasted text and the backup waits for the next safe point.
    Deferred,
    /// Something else was copied while the paste was in flight; the backup
    /// was dropped instead of overwriting it.
    Superseded,
}

/// The capture/replace protocol over one clipboard and one keyboard.
pub struct TextAutomation {
    clipboard: ClipboardGuard,
    keyboard: KeyboardSimulator,
    delays: DelaySettings,
}

impl TextAutomation {
    pub fn new(
        clipboard: Box<dyn ClipboardBackend>,
        keyboard: Box<dyn KeyboardBackend>,
        delays: DelaySettings,
    ) -> Self {
        Self::from_parts(
            ClipboardGuard::new(clipboard),
            KeyboardSimulator::new(keyboard),
            delays,
        )
    }

    pub fn from_parts(
        clipboard: ClipboardGuard,
        keyboard: KeyboardSimulator,
        delays: DelaySettings,
    ) -> Self {
        Self {
            clipboard,
            keyboard,
            delays,
        }
    }

    /// Automation against the real OS clipboard and keyboard.
    pub fn system(delays: DelaySettings) -> Result<Self> {
        let clipboard = SystemClipboard::new()?;
        Ok(Self::new(
            Box::new(clipboard),
            Box::new(EnigoKeyboard::new()),
            delays,
        ))
    }

    pub fn delays(&self) -> &DelaySettings {
        &self.delays
    }

    pub fn set_delays(&mut self, delays: DelaySettings) {
        self.delays = delays;
    }

    pub fn clipboard(&mut self) -> &mut ClipboardGuard {
        &mut self.clipboard
    }

    pub fn keyboard(&mut self) -> &mut KeyboardSimulator {
        &mut self.keyboard
    }

    /// Copies the current selection and waits for the clipboard to reflect
    /// it.
    ///
    /// With a non-zero sync delay a fresh sentinel is written first, so any
    /// change away from it proves the copy happened. On timeout the text that
    /// was on the clipboard before the call is put back, so the sentinel is
    /// never left behind.
    pub async fn simulate_copy(&mut self) -> Result<CopyOutcome> {
        let previous = self.clipboard.read_clipboard()?;
        let sync = self.delays.clipboard_sync_delay;

        if sync.is_zero() {
            self.keyboard.press_copy_shortcut().await?;
            return Ok(CopyOutcome::Unsynchronized);
        }

        let sentinel = new_sentinel();
        self.clipboard.write_clipboard(&sentinel)?;

        if let Err(err) = self.keyboard.press_copy_shortcut().await {
            if let Err(restore_err) = self.clipboard.write_clipboard(&previous) {
                warn!("Failed to clear copy sentinel after shortcut error: {restore_err:#}");
            }
            return Err(err);
        }

        let started = Instant::now();
        let clipboard = &mut self.clipboard;
        let changed = poll_until(SYNC_POLL_INTERVAL, sync, || {
            Ok(clipboard.read_clipboard()? != sentinel)
        })
        .await?;

        if changed {
            debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Clipboard updated after copy"
            );
            return Ok(CopyOutcome::Copied);
        }

        // The copy may land between the last poll and this check; only put
        // the previous text back over the sentinel itself.
        if self.clipboard.read_clipboard()? == sentinel {
            self.clipboard.write_clipboard(&previous)?;
            warn!(
                "Clipboard did not change within {} ms after copy; previous content restored",
                sync.as_millis()
            );
            Ok(CopyOutcome::TimedOut)
        } else {
            Ok(CopyOutcome::Copied)
        }
    }

    /// Select-all followed by the configured settle delay.
    pub async fn simulate_select_all(&mut self) -> Result<()> {
        self.keyboard.press_select_all_shortcut().await?;
        let settle = self.delays.selection_delay;
        if !settle.is_zero() {
            time::sleep(settle).await;
        }
        Ok(())
    }

    /// Puts `text` on the clipboard and presses paste.
    pub async fn simulate_paste(&mut self, text: &str) -> Result<()> {
        self.clipboard.write_clipboard(text)?;
        self.keyboard.press_paste_shortcut().await
    }

    /// Starts a guarded session: the clipboard is backed up now and written
    /// back when the session ends, however it ends.
    pub fn begin_session(&mut self) -> Result<AutomationSession<'_>> {
        self.clipboard.begin()?;
        Ok(AutomationSession { automation: self })
    }

    /// Settles a restore that an earlier paste deferred.
    pub fn flush_deferred(&mut self) -> Result<()> {
        self.clipboard.flush_deferred()
    }
}

/// Unique per call so a stale or repeated value can never look like a fresh
/// copy.
pub(super) fn new_sentinel() -> String {
    format!("__retone_sync_{}__", Uuid::new_v4().simple())
}

/// A capture/replace flow holding the clipboard backup.
///
/// Dropping the session restores the backup if it is still held, which covers
/// early returns through `?` and futures dropped mid-flight. Call
/// [`AutomationSession::finish`] to observe restore errors instead of only
/// logging them.
pub struct AutomationSession<'a> {
    automation: &'a mut TextAutomation,
}

impl AutomationSession<'_> {
    /// Optionally selects the whole field, copies and reads the result.
    ///
    /// The copied text is left on the clipboard until the session ends. A
    /// timed-out copy yields the restored previous text, never the sentinel.
    pub async fn capture(&mut self, mode: CaptureMode) -> Result<Captured> {
        if mode == CaptureMode::Field {
            self.automation.simulate_select_all().await?;
        }

        let outcome = self.automation.simulate_copy().await?;
        let text = self.automation.clipboard.read_clipboard()?;
        info!(
            chars = text.chars().count(),
            ?outcome,
            "📋 Captured text from focused application"
        );
        Ok(Captured { text, outcome })
    }

    /// Pastes `text` and decides whether the backup can go back yet.
    ///
    /// The paste counts as consumed once `paste_settle` has elapsed with the
    /// pasted text still on the clipboard. This is a timing heuristic: there
    /// is no signal from the target application.
    pub async fn replace(&mut self, text: &str) -> Result<ReplaceOutcome> {
        self.automation.simulate_paste(text).await?;

        let settle = self.automation.delays.paste_settle;
        let window = self.automation.delays.paste_safety_window;
        let started = Instant::now();
        let mut superseded = false;

        let clipboard = &mut self.automation.clipboard;
        let consumed = poll_until(SYNC_POLL_INTERVAL, window, || {
            if clipboard.read_clipboard()? != text {
                superseded = true;
                return Ok(true);
            }
            Ok(started.elapsed() >= settle)
        })
        .await?;

        let outcome = if superseded {
            self.automation.clipboard.discard_backup();
            warn!("Clipboard changed while pasting; leaving the newer content in place");
            ReplaceOutcome::Superseded
        } else if consumed {
            self.automation.clipboard.restore_clipboard()?;
            ReplaceOutcome::Restored
        } else {
            self.automation.clipboard.defer_restore(text);
            debug!(
                window_ms = window.as_millis() as u64,
                "Paste not settled within safety window; clipboard restore deferred"
            );
            ReplaceOutcome::Deferred
        };

        info!(?outcome, "✅ Replacement pasted");
        Ok(outcome)
    }

    /// Ends the session, restoring the backup if it is still held.
    pub fn finish(self) -> Result<()> {
        if self.automation.clipboard.is_holding() {
            self.automation.clipboard.restore_clipboard()?;
        }
        Ok(())
    }
}

impl Deref for AutomationSession<'_> {
    type Target = TextAutomation;

    fn deref(&self) -> &Self::Target {
        &*self.automation
    }
}

impl DerefMut for AutomationSession<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.automation
    }
}

impl Drop for AutomationSession<'_> {
    fn drop(&mut self) {
        if !self.automation.clipboard.is_holding() {
            return;
        }
        if let Err(err) = self.automation.clipboard.restore_clipboard() {
            warn!("Failed to restore clipboard at end of session: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_unique() {
        let first = new_sentinel();
        let second = new_sentinel();
        assert_ne!(first, second);
        assert!(first.starts_with("__retone_sync_"));
    }

    #[test]
    fn timed_out_capture_counts_as_empty() {
        let captured = Captured {
            text: "original".into(),
            outcome: CopyOutcome::TimedOut,
        };
        assert!(captured.is_empty());

        let blank = Captured {
            text: " \n\t".into(),
            outcome: CopyOutcome::Copied,
        };
        assert!(blank.is_empty());

        let selected = Captured {
            text: "selected text".into(),
            outcome: CopyOutcome::Copied,
        };
        assert!(!selected.is_empty());
    }
}
