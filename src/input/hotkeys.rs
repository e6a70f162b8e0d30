use anyhow::{anyhow, bail, Context, Result};
use evdev::{Device, InputEventKind, Key};
use std::collections::HashSet;
use std::io;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{HotkeyAction, HotkeyEvent};

const DEBOUNCE: Duration = Duration::from_millis(500);
const RESCAN_INTERVAL: Duration = Duration::from_secs(3);
const IDLE_SLEEP: Duration = Duration::from_millis(10);

const LETTER_KEYS: [Key; 26] = [
    Key::KEY_A,
    Key::KEY_B,
    Key::KEY_C,
    Key::KEY_D,
    Key::KEY_E,
    Key::KEY_F,
    Key::KEY_G,
    Key::KEY_H,
    Key::KEY_I,
    Key::KEY_J,
    Key::KEY_K,
    Key::KEY_L,
    Key::KEY_M,
    Key::KEY_N,
    Key::KEY_O,
    Key::KEY_P,
    Key::KEY_Q,
    Key::KEY_R,
    Key::KEY_S,
    Key::KEY_T,
    Key::KEY_U,
    Key::KEY_V,
    Key::KEY_W,
    Key::KEY_X,
    Key::KEY_Y,
    Key::KEY_Z,
];

const DIGIT_KEYS: [Key; 10] = [
    Key::KEY_0,
    Key::KEY_1,
    Key::KEY_2,
    Key::KEY_3,
    Key::KEY_4,
    Key::KEY_5,
    Key::KEY_6,
    Key::KEY_7,
    Key::KEY_8,
    Key::KEY_9,
];

const FUNCTION_KEYS: [Key; 12] = [
    Key::KEY_F1,
    Key::KEY_F2,
    Key::KEY_F3,
    Key::KEY_F4,
    Key::KEY_F5,
    Key::KEY_F6,
    Key::KEY_F7,
    Key::KEY_F8,
    Key::KEY_F9,
    Key::KEY_F10,
    Key::KEY_F11,
    Key::KEY_F12,
];

/// A parsed `MOD+MOD+KEY` combination bound to an action.
///
/// The combination arms on key-down and fires once every key of it is
/// released, so the chords sent afterwards never mix with held modifiers.
#[derive(Debug, Clone)]
struct Binding {
    action: HotkeyAction,
    label: String,
    keys: HashSet<Key>,
    armed: bool,
    last_trigger: Option<Instant>,
}

struct KeyboardDevice {
    path: PathBuf,
    device: Device,
}

/// Watches every keyboard under /dev/input for the configured combinations.
///
/// Requires read access to the event nodes (usually membership in the
/// `input` group). Left and right modifiers are treated as the same key.
pub struct HotkeyListener {
    stop_flag: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl HotkeyListener {
    pub fn spawn(
        bindings: Vec<(HotkeyAction, String)>,
        tx: mpsc::Sender<HotkeyEvent>,
    ) -> Result<Self> {
        let bindings = bindings
            .into_iter()
            .map(|(action, shortcut)| {
                let keys = parse_shortcut(&shortcut).with_context(|| {
                    format!("Invalid {} shortcut: {}", action.label(), shortcut)
                })?;
                Ok(Binding {
                    action,
                    label: shortcut,
                    keys,
                    armed: false,
                    last_trigger: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if bindings.is_empty() {
            bail!("No hotkeys configured");
        }

        for binding in &bindings {
            info!("🎯 {} shortcut: {}", binding.action.label(), binding.label);
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let runner_flag = Arc::clone(&stop_flag);
        let handle = std::thread::spawn(move || {
            if let Err(err) = run_listener(bindings, tx, runner_flag) {
                error!("Hotkey listener stopped: {err:#}");
            }
        });

        Ok(Self {
            stop_flag,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Hotkey listener thread panicked");
            }
        }
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_listener(
    mut bindings: Vec<Binding>,
    tx: mpsc::Sender<HotkeyEvent>,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let mut devices = find_keyboard_devices();
    if devices.is_empty() {
        warn!("No readable keyboard devices found; add your user to the 'input' group");
    }
    let mut pressed: HashSet<Key> = HashSet::new();
    let mut last_rescan = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        let mut lost_device = false;

        for entry in &mut devices {
            let events = match entry.device.fetch_events() {
                Ok(events) => events.collect::<Vec<_>>(),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                Err(err) => {
                    if is_device_disconnect_error(&err) {
                        warn!("Keyboard {:?} went away", entry.path);
                        lost_device = true;
                    } else {
                        error!("Error reading keyboard {:?}: {}", entry.path, err);
                    }
                    continue;
                }
            };

            for event in events {
                let InputEventKind::Key(key) = event.kind() else {
                    continue;
                };
                let key = canonical_key(key);
                match event.value() {
                    1 => {
                        pressed.insert(key);
                        for binding in &mut bindings {
                            binding.on_press(&pressed);
                        }
                    }
                    0 => {
                        pressed.remove(&key);
                        for binding in &mut bindings {
                            if let Some(hotkey) = binding.on_release(&pressed, Instant::now()) {
                                if let Err(err) = tx.try_send(hotkey) {
                                    warn!("Failed to queue hotkey event: {}", err);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let rescan_due = devices.is_empty() && last_rescan.elapsed() >= RESCAN_INTERVAL;
        if lost_device || rescan_due {
            last_rescan = Instant::now();
            devices = find_keyboard_devices();
            pressed.clear();
            for binding in &mut bindings {
                binding.armed = false;
            }
            debug!(
                "Keyboard devices rescanned - monitoring {} device(s)",
                devices.len()
            );
        }

        std::thread::sleep(IDLE_SLEEP);
    }

    info!("Hotkey listener stopped");
    Ok(())
}

impl Binding {
    fn on_press(&mut self, pressed: &HashSet<Key>) {
        if !self.armed && self.keys.is_subset(pressed) {
            self.armed = true;
        }
    }

    fn on_release(&mut self, pressed: &HashSet<Key>, now: Instant) -> Option<HotkeyEvent> {
        if !self.armed || !self.keys.is_disjoint(pressed) {
            return None;
        }
        self.armed = false;

        if self
            .last_trigger
            .is_some_and(|last| now.duration_since(last) < DEBOUNCE)
        {
            debug!("Hotkey debounced: {}", self.label);
            return None;
        }

        self.last_trigger = Some(now);
        info!("✨ Hotkey triggered: {}", self.label);
        Some(HotkeyEvent {
            action: self.action,
            triggered_at: now,
        })
    }
}

pub(crate) fn parse_shortcut(shortcut: &str) -> Result<HashSet<Key>> {
    let keys = shortcut
        .split('+')
        .map(|part| part.trim().to_ascii_uppercase())
        .filter(|part| !part.is_empty())
        .map(|part| parse_key(&part))
        .collect::<Result<HashSet<_>>>()?;

    if keys.is_empty() {
        bail!("Empty shortcut");
    }
    Ok(keys)
}

fn parse_key(name: &str) -> Result<Key> {
    let key = match name {
        "SUPER" | "META" | "WIN" | "CMD" => Key::KEY_LEFTMETA,
        "ALT" => Key::KEY_LEFTALT,
        "CTRL" | "CONTROL" => Key::KEY_LEFTCTRL,
        "SHIFT" => Key::KEY_LEFTSHIFT,
        "SPACE" => Key::KEY_SPACE,
        "ENTER" | "RETURN" => Key::KEY_ENTER,
        "TAB" => Key::KEY_TAB,
        "ESC" | "ESCAPE" => Key::KEY_ESC,
        "INSERT" | "INS" => Key::KEY_INSERT,
        "HOME" => Key::KEY_HOME,
        "END" => Key::KEY_END,
        _ => return lookup_indexed_key(name).ok_or_else(|| anyhow!("Unknown key: {}", name)),
    };
    Ok(key)
}

fn lookup_indexed_key(name: &str) -> Option<Key> {
    let mut chars = name.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        if ch.is_ascii_uppercase() {
            return LETTER_KEYS.get((ch as u8 - b'A') as usize).copied();
        }
        if ch.is_ascii_digit() {
            return DIGIT_KEYS.get((ch as u8 - b'0') as usize).copied();
        }
    }

    let number: usize = name.strip_prefix('F')?.parse().ok()?;
    FUNCTION_KEYS.get(number.checked_sub(1)?).copied()
}

/// Folds right-hand modifiers onto their left-hand twins.
fn canonical_key(key: Key) -> Key {
    match key {
        Key::KEY_RIGHTMETA => Key::KEY_LEFTMETA,
        Key::KEY_RIGHTALT => Key::KEY_LEFTALT,
        Key::KEY_RIGHTCTRL => Key::KEY_LEFTCTRL,
        Key::KEY_RIGHTSHIFT => Key::KEY_LEFTSHIFT,
        other => other,
    }
}

fn find_keyboard_devices() -> Vec<KeyboardDevice> {
    evdev::enumerate()
        .filter(|(_, device)| is_keyboard_device(device))
        .filter_map(|(path, device)| {
            if let Err(err) = set_device_nonblocking(&device) {
                warn!("Skipping {:?}: {}", path, err);
                return None;
            }
            debug!(
                "Found keyboard device: {} at {:?}",
                device.name().unwrap_or("Unknown"),
                path
            );
            Some(KeyboardDevice { path, device })
        })
        .collect()
}

fn is_keyboard_device(device: &Device) -> bool {
    device.supported_keys().is_some_and(|keys| {
        keys.contains(Key::KEY_A) && keys.contains(Key::KEY_S) && keys.contains(Key::KEY_D)
    })
}

fn is_device_disconnect_error(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == libc::ENODEV || code == libc::EBADF || code == libc::ENXIO
    )
}

fn set_device_nonblocking(device: &Device) -> Result<()> {
    let fd = device.as_raw_fd();

    // SAFETY: fd is owned by `device` and stays open for these calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(anyhow!(
            "fcntl(F_GETFL) failed: {}",
            io::Error::last_os_error()
        ));
    }
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }

    // SAFETY: as above.
    let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if result < 0 {
        return Err(anyhow!(
            "fcntl(F_SETFL) failed: {}",
            io::Error::last_os_error()
        ));
    }
    Ok(())
}
