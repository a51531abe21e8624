//! Daemon module - process lifecycle and wiring
//!
//! Builds the real collaborators (evdev hotkey listener, cpal capture,
//! whisper model host, output chain), hands them to the coordinator, and
//! supervises it until SIGINT/SIGTERM. Also enforces the single-instance
//! lock and the optional model preload.

use crate::config::{ActivationMode, Config};
use crate::coordinator::{notify, Coordinator};
use crate::error::{DictareError, Result};
use crate::model::ModelHost;
use crate::{audio, hotkey, output};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

/// Main daemon that owns process-level concerns
pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the daemon until interrupted
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting dictare daemon");

        Config::ensure_directories().map_err(|e| {
            DictareError::Config(format!("Failed to create directories: {}", e))
        })?;

        // Refuse to run twice; a second instance would fight over the
        // microphone and the hotkeys
        let lock_path = Config::runtime_dir().join("dictare.pid");
        let mut lock = pidlock::Pidlock::new(&lock_path.to_string_lossy());
        if lock.acquire().is_err() {
            return Err(DictareError::AlreadyRunning);
        }

        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            DictareError::Config(format!("Failed to set up SIGTERM handler: {}", e))
        })?;

        let model = Arc::new(ModelHost::new(&self.config.model));
        if self.config.model.preload {
            tracing::info!("Loading transcription model: {}", self.config.model.name);
            match model.ensure_loaded().await {
                Ok(()) => {
                    tracing::info!("Model loaded, ready for voice input");
                    if self.config.output.notification.on_transcription {
                        notify("Dictare", "Model loaded. Ready to record!").await;
                    }
                }
                Err(e) => {
                    tracing::warn!("Model preload failed: {} (will retry on first use)", e);
                }
            }
        } else {
            tracing::info!("Model will be loaded on first use");
        }

        let mut listener = hotkey::create_listener(&self.config.hotkey)?;
        let events = listener.start().await?;

        let outputs = output::create_output_chain(&self.config.output);
        tracing::debug!(
            "Output chain: {}",
            outputs
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        let audio_config = self.config.audio.clone();
        let capture_factory: crate::coordinator::CaptureFactory =
            Box::new(move || audio::create_capture(&audio_config));

        let mode_desc = match self.config.hotkey.mode {
            ActivationMode::PushToTalk => "hold to record, release to transcribe",
            ActivationMode::Toggle => "press to start/stop recording",
        };
        tracing::info!(
            "Listening for hotkey: {} ({}), cancel: {}",
            self.config.hotkey.key,
            mode_desc,
            self.config.hotkey.cancel_key
        );

        let mut coordinator =
            Coordinator::new(self.config.clone(), model, capture_factory, outputs);

        let result = {
            let run = coordinator.run(events);
            tokio::pin!(run);
            tokio::select! {
                res = &mut run => res,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    Ok(())
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    Ok(())
                }
            }
        };

        coordinator.shutdown().await;
        listener.stop().await?;
        let _ = lock.release();

        tracing::info!("Daemon stopped");
        result
    }
}
