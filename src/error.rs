//! Error types for dictare
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.
//!
//! Every error below is recovered at the coordinator boundary: a failed
//! capture, load, transcription, or emission is reported and the daemon
//! returns to idle. None of them terminate the process.

use thiserror::Error;

/// Top-level error type for the dictare application
#[derive(Error, Debug)]
pub enum DictareError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Another dictare instance is already running")]
    AlreadyRunning,

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("Audio capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Model load error: {0}")]
    Load(#[from] LoadError),

    #[error("Transcription error: {0}")]
    Transcribe(#[from] TranscribeError),

    #[error("Output error: {0}")]
    Emit(#[from] EmitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to hotkey detection
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("Cannot open input device '{0}'. Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    DeviceAccess(String),

    #[error("Unknown key name: '{0}'. Use evtest or wev to find valid key names.")]
    UnknownKey(String),

    #[error("No keyboard device found in /dev/input/")]
    NoKeyboard,

    #[error("Hotkey detection not supported: {0}")]
    NotSupported(String),
}

/// Errors related to audio capture
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Audio connection failed: {0}")]
    Connection(String),

    #[error("Audio device not found: '{0}'. List devices with: pactl list sources short")]
    DeviceNotFound(String),

    #[error("Audio stream ended unexpectedly")]
    StreamClosed,

    #[error("Audio stream error: {0}")]
    Stream(String),
}

/// Errors related to loading the speech model
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Model not found: {0}\n  Run 'dictare setup --download' to fetch model weights.")]
    ModelNotFound(String),

    #[error("Model initialization failed: {0}")]
    Init(String),
}

/// Errors related to speech-to-text transcription
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Transcription failed: {0}")]
    Inference(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("Transcription exceeded the {0}s deadline")]
    Timeout(u64),
}

/// Errors related to text output
#[derive(Error, Debug)]
pub enum EmitError {
    #[error("wtype not found in PATH. Install via your package manager.")]
    WtypeNotFound,

    #[error("wl-copy not found in PATH. Install wl-clipboard via your package manager.")]
    WlCopyNotFound,

    #[error("Text injection failed: {0}")]
    InjectionFailed(String),

    #[error("All output methods failed. Ensure wtype or wl-copy is available.")]
    AllSinksFailed,
}

/// Result type alias using DictareError
pub type Result<T> = std::result::Result<T, DictareError>;
