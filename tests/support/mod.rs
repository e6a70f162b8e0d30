#![allow(dead_code)]

use anyhow::{bail, Result};
use retone_rs::automation::{ClipboardBackend, KeyboardBackend, Modifier};
use retone_rs::{DelaySettings, TextAutomation};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the fake application reacts to the copy chord.
#[derive(Debug, Clone)]
pub enum CopyBehavior {
    /// Writes `text` to the clipboard after `latency`.
    Copies {
        text: String,
        latency: Duration,
    },
    /// Never touches the clipboard.
    Stalls,
    /// The key press itself fails.
    Fails,
}

#[derive(Debug, Default)]
struct DesktopState {
    clipboard: String,
    copy: Option<CopyBehavior>,
    copies: usize,
    select_alls: usize,
    pasted: Vec<String>,
    clipboard_writes: Vec<String>,
    read_failures: usize,
}

/// In-memory clipboard and focused application shared by both fake backends.
#[derive(Clone, Default)]
pub struct FakeDesktop {
    state: Arc<Mutex<DesktopState>>,
}

impl FakeDesktop {
    pub fn with_clipboard(text: &str) -> Self {
        let desktop = Self::default();
        desktop.state.lock().unwrap().clipboard = text.to_string();
        desktop
    }

    pub fn on_copy(&self, behavior: CopyBehavior) {
        self.state.lock().unwrap().copy = Some(behavior);
    }

    pub fn copies_after(&self, text: &str, latency_ms: u64) {
        self.on_copy(CopyBehavior::Copies {
            text: text.to_string(),
            latency: Duration::from_millis(latency_ms),
        });
    }

    pub fn clipboard(&self) -> String {
        self.state.lock().unwrap().clipboard.clone()
    }

    /// Simulates the user copying something else.
    pub fn set_clipboard(&self, text: &str) {
        self.state.lock().unwrap().clipboard = text.to_string();
    }

    pub fn copies(&self) -> usize {
        self.state.lock().unwrap().copies
    }

    pub fn select_alls(&self) -> usize {
        self.state.lock().unwrap().select_alls
    }

    pub fn pasted(&self) -> Vec<String> {
        self.state.lock().unwrap().pasted.clone()
    }

    pub fn clipboard_writes(&self) -> Vec<String> {
        self.state.lock().unwrap().clipboard_writes.clone()
    }

    /// Makes the next `count` clipboard reads fail.
    pub fn fail_reads(&self, count: usize) {
        self.state.lock().unwrap().read_failures = count;
    }

    pub fn automation(&self, delays: DelaySettings) -> TextAutomation {
        TextAutomation::new(
            Box::new(FakeClipboard {
                desktop: self.clone(),
            }),
            Box::new(FakeKeyboard {
                desktop: self.clone(),
            }),
            delays,
        )
    }

    fn press(&self, key: char) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match key {
            'c' => {
                state.copies += 1;
                match state.copy.clone() {
                    Some(CopyBehavior::Copies { text, latency }) => {
                        let shared = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            tokio::time::sleep(latency).await;
                            shared.lock().unwrap().clipboard = text;
                        });
                    }
                    Some(CopyBehavior::Fails) => bail!("copy chord rejected"),
                    Some(CopyBehavior::Stalls) | None => {}
                }
            }
            'v' => {
                let pasted = state.clipboard.clone();
                state.pasted.push(pasted);
            }
            'a' => state.select_alls += 1,
            other => bail!("unexpected key {other}"),
        }
        Ok(())
    }
}

pub fn delays(sync_ms: u64) -> DelaySettings {
    DelaySettings {
        clipboard_sync_delay: Duration::from_millis(sync_ms),
        ..DelaySettings::default()
    }
}

struct FakeClipboard {
    desktop: FakeDesktop,
}

impl ClipboardBackend for FakeClipboard {
    fn read_text(&mut self) -> Result<String> {
        let mut state = self.desktop.state.lock().unwrap();
        if state.read_failures > 0 {
            state.read_failures -= 1;
            bail!("clipboard busy");
        }
        Ok(state.clipboard.clone())
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        let mut state = self.desktop.state.lock().unwrap();
        state.clipboard = text.to_string();
        state.clipboard_writes.push(text.to_string());
        Ok(())
    }
}

struct FakeKeyboard {
    desktop: FakeDesktop,
}

impl KeyboardBackend for FakeKeyboard {
    fn press_key(&mut self, _modifier: Modifier, key: char) -> Result<()> {
        self.desktop.press(key)
    }

    fn release_key(&mut self, _modifier: Modifier, _key: char) -> Result<()> {
        Ok(())
    }
}
