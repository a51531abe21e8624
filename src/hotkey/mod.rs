//! Hotkey detection module
//!
//! Provides kernel-level key event detection using evdev. This works on
//! all Wayland compositors because it operates at the Linux input
//! subsystem level.
//!
//! The listener never touches session state: it only enqueues trigger
//! events on a channel, in press order, and the coordinator consumes them.
//!
//! Requires the user to be in the 'input' group.

#[cfg(target_os = "linux")]
pub mod evdev_listener;

use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use tokio::sync::mpsc;

/// Events emitted by the hotkey listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The record hotkey was pressed
    Pressed,
    /// The record hotkey was released
    Released,
    /// The cancel key was pressed (abort recording)
    Cancel,
}

/// Trait for hotkey detection implementations
#[async_trait::async_trait]
pub trait HotkeyListener: Send + Sync {
    /// Start listening for hotkey events.
    /// Returns a channel receiver delivering events in FIFO order.
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError>;

    /// Stop listening and clean up
    async fn stop(&mut self) -> Result<(), HotkeyError>;
}

/// Factory function to create the appropriate hotkey listener
#[cfg(target_os = "linux")]
pub fn create_listener(config: &HotkeyConfig) -> Result<Box<dyn HotkeyListener>, HotkeyError> {
    Ok(Box::new(evdev_listener::EvdevListener::new(config)?))
}

/// Built-in hotkey detection needs the Linux input subsystem
#[cfg(not(target_os = "linux"))]
pub fn create_listener(_config: &HotkeyConfig) -> Result<Box<dyn HotkeyListener>, HotkeyError> {
    Err(HotkeyError::NotSupported(
        "built-in hotkey detection requires Linux evdev".to_string(),
    ))
}
