use anyhow::{bail, Context, Result};
use arboard::Clipboard;
use tracing::{debug, warn};

/// Text access to a clipboard. Implementations do not retry.
pub trait ClipboardBackend {
    /// Current clipboard text. An empty or non-text clipboard reads as `""`.
    fn read_text(&mut self) -> Result<String>;
    fn write_text(&mut self, text: &str) -> Result<()>;
}

/// The OS clipboard via arboard.
///
/// One instance is kept for the lifetime of the automation core: on X11 and
/// Wayland the owning process serves pasted data, so dropping the handle right
/// after a write can lose it.
pub struct SystemClipboard {
    clipboard: Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let clipboard = Clipboard::new().context("Failed to initialize clipboard")?;
        Ok(Self { clipboard })
    }
}

impl ClipboardBackend for SystemClipboard {
    fn read_text(&mut self) -> Result<String> {
        match self.clipboard.get_text() {
            Ok(text) => Ok(text),
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            Err(err) => Err(err).context("Failed to read clipboard"),
        }
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        self.clipboard
            .set_text(text)
            .context("Failed to write clipboard")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Empty,
    Held(String),
    /// A paste of `pasted` may still be reading the clipboard; `snapshot` goes
    /// back once that is no longer a risk.
    Deferred {
        snapshot: String,
        pasted: String,
    },
}

/// Single-slot backup/restore around a clipboard backend.
///
/// There is exactly one backup slot. [`ClipboardGuard::begin`] refuses to
/// start while an unrestored backup is held, which is what keeps two
/// capture/replace flows from clobbering each other's restore target.
pub struct ClipboardGuard {
    backend: Box<dyn ClipboardBackend>,
    slot: Slot,
}

impl ClipboardGuard {
    pub fn new(backend: Box<dyn ClipboardBackend>) -> Self {
        Self {
            backend,
            slot: Slot::Empty,
        }
    }

    pub fn read_clipboard(&mut self) -> Result<String> {
        self.backend.read_text()
    }

    pub fn write_clipboard(&mut self, text: &str) -> Result<()> {
        self.backend.write_text(text)
    }

    /// Saves the current clipboard text, replacing any unrestored backup.
    pub fn backup_clipboard(&mut self) -> Result<()> {
        let snapshot = self.backend.read_text()?;
        if !matches!(self.slot, Slot::Empty) {
            debug!("Overwriting an unrestored clipboard backup");
        }
        debug!(chars = snapshot.chars().count(), "Clipboard backed up");
        self.slot = Slot::Held(snapshot);
        Ok(())
    }

    /// Writes the backup back and clears the slot. No-op without a backup.
    ///
    /// The slot is only cleared once the write succeeded.
    pub fn restore_clipboard(&mut self) -> Result<()> {
        let snapshot = match &self.slot {
            Slot::Empty => return Ok(()),
            Slot::Held(snapshot) => snapshot,
            Slot::Deferred { snapshot, .. } => snapshot,
        };
        self.backend.write_text(snapshot)?;
        debug!("Clipboard restored");
        self.slot = Slot::Empty;
        Ok(())
    }

    pub fn has_backup(&self) -> bool {
        !matches!(self.slot, Slot::Empty)
    }

    pub fn has_deferred_restore(&self) -> bool {
        matches!(self.slot, Slot::Deferred { .. })
    }

    pub(crate) fn is_holding(&self) -> bool {
        matches!(self.slot, Slot::Held(_))
    }

    /// Claims the slot for a new automation session and backs up the
    /// clipboard. A deferred restore from an earlier paste is settled first.
    pub fn begin(&mut self) -> Result<()> {
        match self.slot {
            Slot::Held(_) => {
                bail!("Clipboard automation already in progress (an unrestored backup is held)")
            }
            Slot::Deferred { .. } => self.flush_deferred()?,
            Slot::Empty => {}
        }
        self.backup_clipboard()
    }

    /// Keeps the backup pending instead of restoring over an in-flight paste.
    pub(crate) fn defer_restore(&mut self, pasted: &str) {
        if let Slot::Held(snapshot) = std::mem::replace(&mut self.slot, Slot::Empty) {
            self.slot = Slot::Deferred {
                snapshot,
                pasted: pasted.to_string(),
            };
        }
    }

    /// Forgets the backup without writing it.
    pub(crate) fn discard_backup(&mut self) {
        self.slot = Slot::Empty;
    }

    /// Settles a deferred restore.
    ///
    /// If the clipboard still holds the pasted text the backup is written
    /// back; if something else has been copied since, the backup is dropped
    /// rather than forced over the newer content.
    pub fn flush_deferred(&mut self) -> Result<()> {
        let Slot::Deferred { snapshot, pasted } = &self.slot else {
            return Ok(());
        };

        let current = self.backend.read_text()?;
        if current == *pasted {
            self.backend.write_text(snapshot)?;
            debug!("Deferred clipboard restore completed");
        } else {
            warn!("Clipboard changed since the last paste; skipping deferred restore");
        }
        self.slot = Slot::Empty;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MemoryClipboard {
        text: Arc<Mutex<String>>,
        writes: Arc<Mutex<usize>>,
    }

    impl MemoryClipboard {
        fn with_text(text: &str) -> Self {
            let clipboard = Self::default();
            *clipboard.text.lock().unwrap() = text.to_string();
            clipboard
        }

        fn text(&self) -> String {
            self.text.lock().unwrap().clone()
        }
    }

    impl ClipboardBackend for MemoryClipboard {
        fn read_text(&mut self) -> Result<String> {
            Ok(self.text.lock().unwrap().clone())
        }

        fn write_text(&mut self, text: &str) -> Result<()> {
            *self.writes.lock().unwrap() += 1;
            *self.text.lock().unwrap() = text.to_string();
            Ok(())
        }
    }

    #[test]
    fn backup_then_restore_without_writes_is_idempotent() {
        let clipboard = MemoryClipboard::with_text("original");
        let mut guard = ClipboardGuard::new(Box::new(clipboard.clone()));

        guard.backup_clipboard().unwrap();
        guard.restore_clipboard().unwrap();

        assert_eq!(clipboard.text(), "original");
        assert!(!guard.has_backup());
    }

    #[test]
    fn restore_without_backup_does_not_touch_clipboard() {
        let clipboard = MemoryClipboard::with_text("untouched");
        let mut guard = ClipboardGuard::new(Box::new(clipboard.clone()));

        guard.restore_clipboard().unwrap();

        assert_eq!(*clipboard.writes.lock().unwrap(), 0);
    }

    #[test]
    fn second_backup_overwrites_the_first() {
        let clipboard = MemoryClipboard::with_text("first");
        let mut guard = ClipboardGuard::new(Box::new(clipboard.clone()));

        guard.backup_clipboard().unwrap();
        guard.write_clipboard("second").unwrap();
        guard.backup_clipboard().unwrap();
        guard.write_clipboard("scratch").unwrap();
        guard.restore_clipboard().unwrap();

        assert_eq!(clipboard.text(), "second");
    }

    #[test]
    fn begin_refuses_while_a_backup_is_held() {
        let clipboard = MemoryClipboard::with_text("original");
        let mut guard = ClipboardGuard::new(Box::new(clipboard));

        guard.begin().unwrap();
        assert!(guard.begin().is_err());
    }

    #[test]
    fn begin_settles_a_deferred_restore_first() {
        let clipboard = MemoryClipboard::with_text("original");
        let mut guard = ClipboardGuard::new(Box::new(clipboard.clone()));

        guard.begin().unwrap();
        guard.write_clipboard("pasted").unwrap();
        guard.defer_restore("pasted");

        guard.begin().unwrap();
        assert_eq!(clipboard.text(), "original");
        assert!(guard.is_holding());
    }

    #[test]
    fn deferred_restore_yields_to_newer_clipboard_content() {
        let clipboard = MemoryClipboard::with_text("original");
        let mut guard = ClipboardGuard::new(Box::new(clipboard.clone()));

        guard.begin().unwrap();
        guard.write_clipboard("pasted").unwrap();
        guard.defer_restore("pasted");
        guard.write_clipboard("user copied this").unwrap();

        guard.flush_deferred().unwrap();
        assert_eq!(clipboard.text(), "user copied this");
        assert!(!guard.has_backup());
    }
}
