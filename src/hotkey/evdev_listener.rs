//! evdev-based hotkey listener
//!
//! Reads key events straight from /dev/input, bypassing the display
//! server. The listener thread tracks modifier state, suppresses key
//! repeats, and forwards press/release/cancel events over a channel.

use super::{HotkeyEvent, HotkeyListener};
use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use evdev::{Device, InputEventKind, Key};
use std::collections::HashSet;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

/// evdev-based hotkey listener
pub struct EvdevListener {
    /// The record key to listen for
    record_key: Key,
    /// Modifier keys that must be held with the record key
    modifier_keys: HashSet<Key>,
    /// The cancel key
    cancel_key: Key,
    /// Paths to keyboard devices
    device_paths: Vec<PathBuf>,
    /// Signal to stop the listener task
    stop_signal: Option<oneshot::Sender<()>>,
}

impl EvdevListener {
    /// Create a new evdev listener for the configured hotkeys
    pub fn new(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        let record_key = parse_key_name(&config.key)?;
        let cancel_key = parse_key_name(&config.cancel_key)?;

        let modifier_keys = config
            .modifiers
            .iter()
            .map(|k| parse_key_name(k))
            .collect::<Result<HashSet<_>, _>>()?;

        let device_paths = find_keyboard_devices()?;

        if device_paths.is_empty() {
            return Err(HotkeyError::NoKeyboard);
        }

        tracing::debug!(
            "Found {} keyboard device(s): {:?}",
            device_paths.len(),
            device_paths
        );

        Ok(Self {
            record_key,
            modifier_keys,
            cancel_key,
            device_paths,
            stop_signal: None,
        })
    }
}

#[async_trait::async_trait]
impl HotkeyListener for EvdevListener {
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError> {
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);

        let record_key = self.record_key;
        let cancel_key = self.cancel_key;
        let modifier_keys = self.modifier_keys.clone();
        let device_paths = self.device_paths.clone();

        tokio::task::spawn_blocking(move || {
            listener_loop(
                device_paths,
                record_key,
                cancel_key,
                modifier_keys,
                tx,
                stop_rx,
            );
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
        Ok(())
    }
}

/// Main listener loop running in a blocking task
fn listener_loop(
    device_paths: Vec<PathBuf>,
    record_key: Key,
    cancel_key: Key,
    modifier_keys: HashSet<Key>,
    tx: mpsc::Sender<HotkeyEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    // Open all keyboard devices in non-blocking mode
    let mut devices: Vec<Device> = device_paths
        .iter()
        .filter_map(|path| match Device::open(path) {
            Ok(device) => {
                let fd = device.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFL);
                    if flags != -1 {
                        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                    }
                }
                tracing::debug!("Opened device (non-blocking): {:?}", path);
                Some(device)
            }
            Err(e) => {
                tracing::warn!("Failed to open {:?}: {}", path, e);
                None
            }
        })
        .collect();

    if devices.is_empty() {
        tracing::error!("No keyboard devices could be opened");
        return;
    }

    let mut active_modifiers: HashSet<Key> = HashSet::new();
    // Suppress key-repeat events while held
    let mut is_pressed = false;

    tracing::info!(
        "Listening for {:?} (modifiers: {:?}, cancel: {:?})",
        record_key,
        modifier_keys,
        cancel_key
    );

    loop {
        match stop_rx.try_recv() {
            Ok(_) | Err(oneshot::error::TryRecvError::Closed) => {
                tracing::debug!("Hotkey listener stopping");
                return;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
        }

        for device in &mut devices {
            // fetch_events returns immediately if no events (non-blocking)
            if let Ok(events) = device.fetch_events() {
                for event in events {
                    if let InputEventKind::Key(key) = event.kind() {
                        let value = event.value();

                        if modifier_keys.contains(&key) {
                            match value {
                                1 => {
                                    active_modifiers.insert(key);
                                }
                                0 => {
                                    active_modifiers.remove(&key);
                                }
                                _ => {}
                            }
                        }

                        if key == cancel_key && value == 1 {
                            tracing::debug!("Cancel key pressed");
                            if tx.blocking_send(HotkeyEvent::Cancel).is_err() {
                                return; // Channel closed
                            }
                            continue;
                        }

                        if key == record_key {
                            let modifiers_satisfied =
                                modifier_keys.iter().all(|m| active_modifiers.contains(m));

                            match value {
                                1 if !is_pressed && modifiers_satisfied => {
                                    is_pressed = true;
                                    tracing::debug!("Hotkey pressed");
                                    if tx.blocking_send(HotkeyEvent::Pressed).is_err() {
                                        return;
                                    }
                                }
                                // Release is forwarded regardless of current
                                // modifier state so push-to-talk always stops
                                0 if is_pressed => {
                                    is_pressed = false;
                                    tracing::debug!("Hotkey released");
                                    if tx.blocking_send(HotkeyEvent::Released).is_err() {
                                        return;
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
        }

        // Small sleep to avoid busy-waiting
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

/// Find all keyboard input devices
fn find_keyboard_devices() -> Result<Vec<PathBuf>, HotkeyError> {
    let mut keyboards = Vec::new();

    let input_dir = std::fs::read_dir("/dev/input")
        .map_err(|e| HotkeyError::DeviceAccess(format!("/dev/input: {}", e)))?;

    for entry in input_dir {
        let entry = entry.map_err(|e| HotkeyError::DeviceAccess(e.to_string()))?;
        let path = entry.path();

        let is_event_device = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false);

        if !is_event_device {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => {
                // A keyboard should have at least some letter keys
                let has_keys = device
                    .supported_keys()
                    .map(|keys| {
                        keys.contains(Key::KEY_A)
                            && keys.contains(Key::KEY_Z)
                            && keys.contains(Key::KEY_ENTER)
                    })
                    .unwrap_or(false);

                if has_keys {
                    tracing::debug!(
                        "Found keyboard: {:?} ({:?})",
                        path,
                        device.name().unwrap_or("unknown")
                    );
                    keyboards.push(path);
                }
            }
            Err(e) => {
                // Permission denied is common for non-input-group users
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    return Err(HotkeyError::DeviceAccess(path.display().to_string()));
                }
                tracing::trace!("Skipping {:?}: {}", path, e);
            }
        }
    }

    Ok(keyboards)
}

/// Parse a key name string to an evdev Key
fn parse_key_name(name: &str) -> Result<Key, HotkeyError> {
    // Normalize: uppercase, replace - or space with _, add KEY_ prefix
    let normalized: String = name
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();

    let key_name = if normalized.starts_with("KEY_") {
        normalized
    } else {
        format!("KEY_{}", normalized)
    };

    // Aliases evdev does not know under these names
    let key_name = match key_name.as_str() {
        "KEY_ESCAPE" => "KEY_ESC".to_string(),
        "KEY_LALT" => "KEY_LEFTALT".to_string(),
        "KEY_RALT" => "KEY_RIGHTALT".to_string(),
        "KEY_LCTRL" => "KEY_LEFTCTRL".to_string(),
        "KEY_RCTRL" => "KEY_RIGHTCTRL".to_string(),
        "KEY_LSHIFT" => "KEY_LEFTSHIFT".to_string(),
        "KEY_RSHIFT" => "KEY_RIGHTSHIFT".to_string(),
        "KEY_SUPER" => "KEY_LEFTMETA".to_string(),
        other => other.to_string(),
    };

    key_name.parse::<Key>().map_err(|_| {
        HotkeyError::UnknownKey(format!(
            "{}. Try: SCROLLLOCK, PAUSE, F13-F24, or run 'evtest' to find key names",
            name
        ))
    })
}
