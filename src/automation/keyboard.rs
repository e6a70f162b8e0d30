use anyhow::{Context, Result};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use tracing::{debug, warn};

/// The modifier that drives clipboard shortcuts on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Control,
    /// Command on macOS.
    Meta,
}

impl Modifier {
    pub fn platform() -> Self {
        if cfg!(target_os = "macos") {
            Modifier::Meta
        } else {
            Modifier::Control
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Modifier::Control => "Ctrl",
            Modifier::Meta => "Cmd",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Copy,
    Paste,
    SelectAll,
}

impl Shortcut {
    pub fn key(&self) -> char {
        match self {
            Shortcut::Copy => 'c',
            Shortcut::Paste => 'v',
            Shortcut::SelectAll => 'a',
        }
    }
}

/// OS-level key injection.
///
/// `press_key` pushes the modifier down and then the key; `release_key` lets
/// go of them in reverse order. Errors (for example a missing accessibility
/// permission) are returned as-is.
pub trait KeyboardBackend {
    fn press_key(&mut self, modifier: Modifier, key: char) -> Result<()>;
    fn release_key(&mut self, modifier: Modifier, key: char) -> Result<()>;
}

/// Key injection through enigo.
///
/// The enigo connection is opened on press and closed again after release so
/// no virtual keyboard stays registered between shortcuts.
#[derive(Default)]
pub struct EnigoKeyboard {
    active: Option<Enigo>,
}

impl EnigoKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection(&mut self) -> Result<&mut Enigo> {
        if self.active.is_none() {
            let enigo = Enigo::new(&Settings::default())
                .context("Failed to initialize Enigo for keyboard simulation")?;
            self.active = Some(enigo);
        }
        self.active.as_mut().context("Enigo connection unavailable")
    }
}

fn enigo_modifier(modifier: Modifier) -> Key {
    match modifier {
        Modifier::Control => Key::Control,
        Modifier::Meta => Key::Meta,
    }
}

impl KeyboardBackend for EnigoKeyboard {
    fn press_key(&mut self, modifier: Modifier, key: char) -> Result<()> {
        let enigo = self.connection()?;
        enigo
            .key(enigo_modifier(modifier), Direction::Press)
            .with_context(|| format!("Failed to press {}", modifier.label()))?;
        enigo
            .key(Key::Unicode(key), Direction::Press)
            .with_context(|| format!("Failed to press {}", key.to_ascii_uppercase()))?;
        Ok(())
    }

    fn release_key(&mut self, modifier: Modifier, key: char) -> Result<()> {
        let result = (|| -> Result<()> {
            let enigo = self.connection()?;
            enigo
                .key(Key::Unicode(key), Direction::Release)
                .with_context(|| format!("Failed to release {}", key.to_ascii_uppercase()))?;
            enigo
                .key(enigo_modifier(modifier), Direction::Release)
                .with_context(|| format!("Failed to release {}", modifier.label()))?;
            Ok(())
        })();
        self.active = None;
        result
    }
}

/// Issues copy, paste and select-all chords with the platform modifier.
pub struct KeyboardSimulator {
    backend: Box<dyn KeyboardBackend>,
    modifier: Modifier,
}

impl KeyboardSimulator {
    pub fn new(backend: Box<dyn KeyboardBackend>) -> Self {
        Self::with_modifier(backend, Modifier::platform())
    }

    pub fn with_modifier(backend: Box<dyn KeyboardBackend>, modifier: Modifier) -> Self {
        Self { backend, modifier }
    }

    pub fn modifier(&self) -> Modifier {
        self.modifier
    }

    pub async fn press_copy_shortcut(&mut self) -> Result<()> {
        self.press(Shortcut::Copy)
    }

    pub async fn press_paste_shortcut(&mut self) -> Result<()> {
        self.press(Shortcut::Paste)
    }

    pub async fn press_select_all_shortcut(&mut self) -> Result<()> {
        self.press(Shortcut::SelectAll)
    }

    fn press(&mut self, shortcut: Shortcut) -> Result<()> {
        let key = shortcut.key();
        debug!(
            "⌨️  Sending {}+{}",
            self.modifier.label(),
            key.to_ascii_uppercase()
        );

        if let Err(err) = self.backend.press_key(self.modifier, key) {
            // Never leave the modifier latched.
            if let Err(release_err) = self.backend.release_key(self.modifier, key) {
                warn!("Failed to release keys after press error: {release_err:#}");
            }
            return Err(err);
        }

        self.backend.release_key(self.modifier, key)
    }
}
