#[cfg(target_os = "linux")]
mod hotkeys;

#[cfg(target_os = "linux")]
pub use hotkeys::HotkeyListener;

use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    FixSelection,
    FixField,
}

impl HotkeyAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FixSelection => "Fix selection",
            Self::FixField => "Fix field",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HotkeyEvent {
    pub action: HotkeyAction,
    pub triggered_at: Instant,
}

/// Stand-in on platforms without evdev: spawning always fails, so the app
/// keeps running with the CLI commands only.
#[cfg(not(target_os = "linux"))]
pub struct HotkeyListener;

#[cfg(not(target_os = "linux"))]
impl HotkeyListener {
    pub fn spawn(
        _bindings: Vec<(HotkeyAction, String)>,
        _tx: tokio::sync::mpsc::Sender<HotkeyEvent>,
    ) -> anyhow::Result<Self> {
        anyhow::bail!("Global hotkeys are only supported on Linux")
    }

    pub fn stop(&mut self) {}
}
