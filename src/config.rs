//! Configuration loading and types for dictare
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/dictare/config.toml)
//! 3. Environment variables (DICTARE_*)
//! 4. CLI arguments (highest priority)
//!
//! The loaded `Config` is an immutable snapshot: it is resolved once at
//! startup and shared by reference. A recording session always runs against
//! the snapshot it was started with.

use crate::error::DictareError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Dictare Configuration
#
# Location: ~/.config/dictare/config.toml
# All settings can be overridden via CLI flags

[hotkey]
# Key that triggers recording
# Common choices: SCROLLLOCK, PAUSE, RIGHTALT, F13-F24
# Use `evtest` to find key names for your keyboard
key = "SCROLLLOCK"

# Optional modifier keys that must also be held
# Example: modifiers = ["LEFTCTRL", "LEFTSHIFT"]
modifiers = []

# Key that cancels an in-progress recording (buffer is discarded)
cancel_key = "ESC"

# Activation mode: "push_to_talk" or "toggle"
# - push_to_talk: Hold hotkey to record, release to transcribe (default)
# - toggle: Press hotkey once to start recording, press again to stop
# mode = "push_to_talk"

[audio]
# Audio input device ("default" uses system default)
# List devices with: pactl list sources short
device = "default"

# Sample rate in Hz (whisper expects 16000)
sample_rate = 16000

# RMS amplitude above which a frame counts as speech.
# Set to 0.0 to disable silence detection entirely.
silence_threshold = 0.01

# Seconds of trailing silence (after speech) before recording auto-stops.
# Set to 0.0 to disable auto-stop (stop manually with the hotkey).
silence_duration_secs = 2.0

# In toggle mode, abort the recording if no speech is heard within this
# many seconds of starting. Ignored in push_to_talk mode, where releasing
# the key is the stop signal.
grace_period_secs = 10.0

# Maximum recording duration in seconds (safety limit)
max_duration_secs = 120

[model]
# Model to use for transcription
# Options: tiny, tiny.en, base, base.en, small, small.en, medium, medium.en, large-v3, large-v3-turbo
# Or provide absolute path to a custom .bin model file
name = "base.en"

# Language for transcription ("en", "de", ..., or "auto" for detection)
language = "en"

# Inference device: "auto" (prefer GPU, fall back to CPU), "gpu", or "cpu"
device = "auto"

# Number of CPU threads for inference (omit for auto-detection)
# threads = 4

# Load the model at startup (true) or on first use (false)
preload = true

# Hard deadline for a single transcription in seconds (0 = no deadline).
# Inference is never interrupted mid-call; a deadline only stops waiting.
transcribe_timeout_secs = 0

[output]
# Primary output mode: "type" or "clipboard"
# - type: Simulates keyboard input at cursor position (requires wtype)
# - clipboard: Copies text to clipboard (requires wl-copy)
mode = "type"

# Fall back to clipboard if typing fails
fallback_to_clipboard = true

# Collapse runs of whitespace in the transcription before output
cleanup = true

# Append a newline after the transcribed text
add_newline = false

[output.notification]
# Show notification when recording starts
on_recording_start = false

# Show notification with the transcribed text
on_transcription = true

# Show notification when something fails (capture, model, output)
on_error = true

[system]
# Keep the audio of failed transcriptions as WAV files for debugging
save_failed_audio = false

# Directory for failed-audio WAVs ("auto" uses the data dir)
failed_audio_dir = "auto"
"#;

/// Hotkey activation mode
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Hold key to record, release to stop (default)
    #[default]
    PushToTalk,
    /// Press once to start recording, press again to stop
    Toggle,
}

/// Inference device preference
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DevicePolicy {
    /// Prefer GPU when usable, fall back to CPU on any init error
    #[default]
    Auto,
    /// GPU only; init errors are fatal for the load attempt
    Gpu,
    /// CPU only
    Cpu,
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub hotkey: HotkeyConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

/// Hotkey detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotkeyConfig {
    /// Key name (evdev KEY_* constant name, without the KEY_ prefix)
    #[serde(default = "default_hotkey_key")]
    pub key: String,

    /// Optional modifier keys that must also be held
    #[serde(default)]
    pub modifiers: Vec<String>,

    /// Key that cancels the active recording
    #[serde(default = "default_cancel_key")]
    pub cancel_key: String,

    /// Activation mode: push_to_talk (hold to record) or toggle (press to start/stop)
    #[serde(default)]
    pub mode: ActivationMode,
}

/// Audio capture and silence detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// PipeWire/PulseAudio device name, or "default"
    #[serde(default = "default_device")]
    pub device: String,

    /// Sample rate in Hz (whisper expects 16000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// RMS threshold above which a frame counts as speech (0.0 disables)
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,

    /// Trailing silence after speech before auto-stop (0.0 disables)
    #[serde(default = "default_silence_duration")]
    pub silence_duration_secs: f32,

    /// Toggle mode only: abort if no speech within this many seconds
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: f32,

    /// Maximum recording duration in seconds (safety limit)
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u32,
}

impl AudioConfig {
    /// Hard cap on recording length
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs as u64)
    }
}

/// Speech model configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Model name (tiny, base.en, ...) or absolute path to a .bin file
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Language code (en, es, fr, auto, ...)
    #[serde(default = "default_language")]
    pub language: String,

    /// Inference device preference
    #[serde(default)]
    pub device: DevicePolicy,

    /// Number of threads for inference (None = auto-detect)
    #[serde(default)]
    pub threads: Option<usize>,

    /// Load the model at startup instead of on first use
    #[serde(default = "default_true")]
    pub preload: bool,

    /// Hard deadline for one transcription in seconds (0 = none)
    #[serde(default)]
    pub transcribe_timeout_secs: u64,
}

impl ModelConfig {
    /// Optional transcription deadline
    pub fn transcribe_deadline(&self) -> Option<Duration> {
        (self.transcribe_timeout_secs > 0)
            .then(|| Duration::from_secs(self.transcribe_timeout_secs))
    }
}

/// Text output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Primary output mode
    #[serde(default)]
    pub mode: OutputMode,

    /// Fall back to clipboard if typing fails
    #[serde(default = "default_true")]
    pub fallback_to_clipboard: bool,

    /// Collapse whitespace runs in the transcription before output
    #[serde(default = "default_true")]
    pub cleanup: bool,

    /// Append a newline after the text
    #[serde(default)]
    pub add_newline: bool,

    /// Notification settings
    #[serde(default)]
    pub notification: NotificationConfig,
}

/// Output mode selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Simulate keyboard input (requires wtype)
    #[default]
    Type,
    /// Copy to clipboard (requires wl-copy)
    Clipboard,
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Notify when recording starts
    #[serde(default)]
    pub on_recording_start: bool,

    /// Notify with the transcribed text
    #[serde(default = "default_true")]
    pub on_transcription: bool,

    /// Notify on capture/model/output failures
    #[serde(default = "default_true")]
    pub on_error: bool,
}

/// Housekeeping configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemConfig {
    /// Keep audio of failed transcriptions as WAV files
    #[serde(default)]
    pub save_failed_audio: bool,

    /// Directory for failed-audio WAVs ("auto" uses the data dir)
    #[serde(default = "default_failed_audio_dir")]
    pub failed_audio_dir: String,
}

impl SystemConfig {
    /// Resolve the failed-audio directory, or None when retention is off
    pub fn resolve_failed_audio_dir(&self) -> Option<PathBuf> {
        if !self.save_failed_audio {
            return None;
        }
        match self.failed_audio_dir.as_str() {
            "auto" => Some(Config::data_dir().join("failed")),
            other => Some(PathBuf::from(other)),
        }
    }
}

fn default_hotkey_key() -> String {
    "SCROLLLOCK".to_string()
}

fn default_cancel_key() -> String {
    "ESC".to_string()
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_silence_threshold() -> f32 {
    0.01
}

fn default_silence_duration() -> f32 {
    2.0
}

fn default_grace_period() -> f32 {
    10.0
}

fn default_max_duration() -> u32 {
    120
}

fn default_model_name() -> String {
    "base.en".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_failed_audio_dir() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            key: default_hotkey_key(),
            modifiers: vec![],
            cancel_key: default_cancel_key(),
            mode: ActivationMode::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            silence_threshold: default_silence_threshold(),
            silence_duration_secs: default_silence_duration(),
            grace_period_secs: default_grace_period(),
            max_duration_secs: default_max_duration(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            language: default_language(),
            device: DevicePolicy::default(),
            threads: None,
            preload: true,
            transcribe_timeout_secs: 0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::default(),
            fallback_to_clipboard: true,
            cleanup: true,
            add_newline: false,
            notification: NotificationConfig::default(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_recording_start: false,
            on_transcription: true,
            on_error: true,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            save_failed_audio: false,
            failed_audio_dir: default_failed_audio_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: HotkeyConfig::default(),
            audio: AudioConfig::default(),
            model: ModelConfig::default(),
            output: OutputConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "dictare")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the runtime directory for ephemeral files (pid lock)
    pub fn runtime_dir() -> PathBuf {
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join("dictare")
    }

    /// Get the data directory path (for models, failed audio)
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "dictare")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the models directory path
    pub fn models_dir() -> PathBuf {
        Self::data_dir().join("models")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories() -> std::io::Result<()> {
        if let Some(config_dir) = Self::default_path().and_then(|p| p.parent().map(Path::to_path_buf)) {
            std::fs::create_dir_all(&config_dir)?;
        }
        std::fs::create_dir_all(Self::models_dir())?;
        std::fs::create_dir_all(Self::runtime_dir())?;
        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, DictareError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| DictareError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| DictareError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Override from environment variables
    if let Ok(key) = std::env::var("DICTARE_HOTKEY") {
        config.hotkey.key = key;
    }
    if let Ok(model) = std::env::var("DICTARE_MODEL") {
        config.model.name = model;
    }
    if let Ok(mode) = std::env::var("DICTARE_OUTPUT_MODE") {
        config.output.mode = match mode.to_lowercase().as_str() {
            "clipboard" => OutputMode::Clipboard,
            _ => OutputMode::Type,
        };
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hotkey.key, "SCROLLLOCK");
        assert_eq!(config.hotkey.cancel_key, "ESC");
        assert_eq!(config.hotkey.mode, ActivationMode::PushToTalk);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.silence_threshold, 0.01);
        assert_eq!(config.audio.max_duration_secs, 120);
        assert_eq!(config.model.name, "base.en");
        assert_eq!(config.model.device, DevicePolicy::Auto);
        assert!(config.model.preload);
        assert_eq!(config.output.mode, OutputMode::Type);
        assert!(!config.system.save_failed_audio);
    }

    #[test]
    fn test_default_config_string_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.hotkey.key, "SCROLLLOCK");
        assert_eq!(config.audio.silence_duration_secs, 2.0);
        assert_eq!(config.audio.grace_period_secs, 10.0);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
            [hotkey]
            key = "PAUSE"
            modifiers = ["LEFTCTRL"]
            mode = "toggle"

            [audio]
            device = "default"
            silence_threshold = 0.02
            silence_duration_secs = 1.5
            max_duration_secs = 30

            [model]
            name = "small.en"
            device = "cpu"
            transcribe_timeout_secs = 45

            [output]
            mode = "clipboard"
            add_newline = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.hotkey.key, "PAUSE");
        assert_eq!(config.hotkey.modifiers, vec!["LEFTCTRL"]);
        assert_eq!(config.hotkey.mode, ActivationMode::Toggle);
        assert_eq!(config.audio.silence_threshold, 0.02);
        assert_eq!(config.audio.silence_duration_secs, 1.5);
        assert_eq!(config.model.name, "small.en");
        assert_eq!(config.model.device, DevicePolicy::Cpu);
        assert_eq!(
            config.model.transcribe_deadline(),
            Some(Duration::from_secs(45))
        );
        assert_eq!(config.output.mode, OutputMode::Clipboard);
        assert!(config.output.add_newline);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[model]\nname = \"tiny.en\"\n").unwrap();
        assert_eq!(config.model.name, "tiny.en");
        assert_eq!(config.hotkey.key, "SCROLLLOCK");
        assert_eq!(config.audio.grace_period_secs, 10.0);
        assert!(config.model.transcribe_deadline().is_none());
    }

    #[test]
    fn test_failed_audio_dir_resolution() {
        let mut system = SystemConfig::default();
        assert!(system.resolve_failed_audio_dir().is_none());

        system.save_failed_audio = true;
        assert_eq!(
            system.resolve_failed_audio_dir(),
            Some(Config::data_dir().join("failed"))
        );

        system.failed_audio_dir = "/tmp/failed".to_string();
        assert_eq!(
            system.resolve_failed_audio_dir(),
            Some(PathBuf::from("/tmp/failed"))
        );
    }
}
