//! Session coordinator
//!
//! The only component that creates recording sessions. It reacts to hotkey
//! trigger events, enforces the global single-flight rule (at most one
//! session exists at any instant), and sequences the finished buffer
//! through transcription and text output.
//!
//! A start trigger while a session is active is deliberately ignored;
//! overlapping captures are never queued. Transcription and output for a
//! finished session complete before the next trigger event is taken from
//! the channel, so emissions can never interleave and always belong to the
//! most recently completed session.

use crate::audio::AudioCapture;
use crate::config::{ActivationMode, Config};
use crate::detector::SilenceDetector;
use crate::error::{CaptureError, Result, TranscribeError};
use crate::hotkey::HotkeyEvent;
use crate::model::ModelHost;
use crate::output::{self, TextOutput};
use crate::session::{self, AudioBuffer, SessionEnd, SessionHandle};
use crate::text;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Recordings shorter than this are treated as accidental presses
const MIN_AUDIO_SECS: f32 = 0.3;

/// Creates a fresh capture source for each session
pub type CaptureFactory =
    Box<dyn Fn() -> std::result::Result<Box<dyn AudioCapture>, CaptureError> + Send + Sync>;

/// Send a desktop notification (best effort)
pub(crate) async fn notify(title: &str, body: &str) {
    let _ = Command::new("notify-send")
        .args(["--app-name=Dictare", "--expire-time=2500", title, body])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
}

enum Step {
    Event(HotkeyEvent),
    SessionDone(SessionEnd),
}

/// Single-flight dispatcher from trigger events to emitted text
pub struct Coordinator {
    config: Config,
    model: Arc<ModelHost>,
    capture_factory: CaptureFactory,
    outputs: Vec<Box<dyn TextOutput>>,
    active: Option<SessionHandle>,
    next_session_id: u64,
}

impl Coordinator {
    pub fn new(
        config: Config,
        model: Arc<ModelHost>,
        capture_factory: CaptureFactory,
        outputs: Vec<Box<dyn TextOutput>>,
    ) -> Self {
        Self {
            config,
            model,
            capture_factory,
            outputs,
            active: None,
            next_session_id: 1,
        }
    }

    /// Run until the event channel closes. Each loop turn either consumes
    /// one trigger event or completes the active session; completion
    /// (transcribe + emit) finishes before the next event is taken.
    pub async fn run(&mut self, mut events: mpsc::Receiver<HotkeyEvent>) -> Result<()> {
        loop {
            let step = tokio::select! {
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => Step::Event(event),
                    None => break,
                },
                end = Self::await_session(&mut self.active) => Step::SessionDone(end),
            };

            match step {
                Step::Event(event) => self.handle_event(event).await,
                Step::SessionDone(end) => {
                    self.active = None;
                    self.finish_session(end).await;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Resolve once the active session reaches a terminal state; pends
    /// forever while idle so the select above only sees trigger events.
    async fn await_session(active: &mut Option<SessionHandle>) -> SessionEnd {
        match active {
            Some(handle) => match (&mut handle.task).await {
                Ok(end) => end,
                // A panicked session task means a broken lifecycle invariant;
                // that is a bug, not a runtime condition to recover from
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => SessionEnd::Failed(CaptureError::Stream(format!(
                    "session task aborted: {}",
                    e
                ))),
            },
            None => std::future::pending().await,
        }
    }

    async fn handle_event(&mut self, event: HotkeyEvent) {
        match (event, self.config.hotkey.mode) {
            (HotkeyEvent::Pressed, ActivationMode::PushToTalk) => {
                self.start_session().await;
            }
            (HotkeyEvent::Released, ActivationMode::PushToTalk) => {
                if let Some(handle) = &self.active {
                    handle.stop().await;
                }
            }
            (HotkeyEvent::Pressed, ActivationMode::Toggle) => {
                if let Some(handle) = &self.active {
                    handle.stop().await;
                } else {
                    self.start_session().await;
                }
            }
            (HotkeyEvent::Released, ActivationMode::Toggle) => {
                tracing::trace!("Ignoring release in toggle mode");
            }
            (HotkeyEvent::Cancel, _) => {
                if let Some(handle) = &self.active {
                    tracing::info!("Cancel requested");
                    handle.cancel().await;
                }
            }
        }
    }

    async fn start_session(&mut self) {
        if self.active.is_some() {
            // Deliberate policy: no queueing of a second recording
            tracing::debug!("Ignoring start trigger, a session is already active");
            return;
        }

        match (self.capture_factory)() {
            Ok(capture) => {
                let detector =
                    SilenceDetector::from_config(&self.config.audio, self.config.hotkey.mode);
                let id = self.next_session_id;
                self.next_session_id += 1;

                let handle =
                    session::spawn(id, capture, detector, self.config.audio.sample_rate);
                let previous = self.active.replace(handle);
                assert!(
                    previous.is_none(),
                    "single-flight violation: a second session was installed while session {} was active",
                    previous.map(|h| h.id).unwrap_or(0)
                );

                tracing::info!("Recording started (session {})", id);
                if self.config.output.notification.on_recording_start {
                    notify("Recording", "Listening...").await;
                }
            }
            Err(e) => {
                tracing::error!("Failed to start audio capture: {}", e);
                self.notify_error(&format!("Audio capture failed: {}", e)).await;
            }
        }
    }

    async fn finish_session(&mut self, end: SessionEnd) {
        match end {
            SessionEnd::Cancelled => {
                // Nothing to do; the buffer was discarded by the session
            }
            SessionEnd::Failed(e) => {
                tracing::error!("Recording failed: {}", e);
                self.notify_error(&format!("Recording failed: {}", e)).await;
            }
            SessionEnd::Finished(buffer) => {
                self.transcribe_and_emit(buffer).await;
            }
        }
    }

    async fn transcribe_and_emit(&mut self, buffer: AudioBuffer) {
        let sample_rate = self.config.audio.sample_rate;
        let duration_secs = buffer.len() as f32 / sample_rate as f32;

        if duration_secs < MIN_AUDIO_SECS {
            tracing::debug!("Recording too short ({:.2}s), ignoring", duration_secs);
            return;
        }

        tracing::info!("Transcribing {:.1}s of audio...", duration_secs);

        let retained = self
            .config
            .system
            .save_failed_audio
            .then(|| buffer.clone());

        let transcription = self.model.transcribe(buffer, None);
        let result = match self.config.model.transcribe_deadline() {
            Some(deadline) => match tokio::time::timeout(deadline, transcription).await {
                Ok(result) => result,
                // The engine finishes in the background; we just stop waiting
                Err(_) => Err(TranscribeError::Timeout(deadline.as_secs())),
            },
            None => transcription.await,
        };

        match result {
            Ok(raw) => {
                let prepared = text::prepare(&raw, &self.config.output);
                if prepared.is_empty() {
                    tracing::debug!("Transcription was empty");
                    return;
                }
                tracing::info!("Transcribed: {:?}", prepared.trim_end());

                if let Err(e) = output::emit_with_fallback(&self.outputs, &prepared).await {
                    tracing::error!("Output failed: {}", e);
                    self.notify_error(&format!("Text output failed: {}", e)).await;
                }
            }
            Err(e) => {
                tracing::error!("Transcription failed: {}", e);
                if let Some(samples) = retained {
                    self.save_failed_audio(&samples, sample_rate);
                }
                self.notify_error(&format!("Transcription failed: {}", e)).await;
            }
        }
    }

    /// Keep the audio of a failed transcription around for debugging
    fn save_failed_audio(&self, samples: &[f32], sample_rate: u32) {
        let Some(dir) = self.config.system.resolve_failed_audio_dir() else {
            return;
        };
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!("Failed to create failed-audio directory: {}", e);
            return;
        }

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = dir.join(format!("failed-{}.wav", stamp));

        match write_wav(&path, samples, sample_rate) {
            Ok(()) => tracing::info!("Saved failed audio to {:?}", path),
            Err(e) => tracing::warn!("Failed to save audio: {}", e),
        }
    }

    async fn notify_error(&self, body: &str) {
        if self.config.output.notification.on_error {
            notify("Dictare error", body).await;
        }
    }

    /// Cancel the active session, if any, and wait for it to wind down
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.cancel().await;
            let _ = handle.task.await;
        }
    }
}

/// Write mono f32 samples as a 16-bit WAV file
fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> std::result::Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_wav_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed.wav");
        let samples = vec![0.0f32, 0.5, -0.5, 1.0];

        write_wav(&path, &samples, 16000).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read.len(), 4);
        assert_eq!(read[0], 0);
        assert_eq!(read[3], i16::MAX);
    }
}
