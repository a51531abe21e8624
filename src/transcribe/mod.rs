//! Speech-to-text transcription module
//!
//! Local whisper.cpp inference via the whisper-rs crate. Everything above
//! this module talks to the `Transcriber` trait only, so tests (and future
//! backends) can substitute their own engine.

pub mod whisper;

use crate::config::ModelConfig;
use crate::error::LoadError;

/// Trait for speech-to-text implementations
///
/// Input is f32 mono samples at 16 kHz. The language hint overrides the
/// engine's configured default for this one call. Implementations are not
/// assumed safe for concurrent inference; the model host serializes calls.
pub trait Transcriber: Send + Sync {
    fn transcribe(
        &self,
        samples: &[f32],
        language: Option<&str>,
    ) -> Result<String, crate::error::TranscribeError>;
}

/// Factory function to create the configured engine.
///
/// Device policy: `auto` tries the GPU first and falls back to CPU on any
/// initialization error. A degraded start, not a fatal one.
pub fn create_engine(config: &ModelConfig) -> Result<Box<dyn Transcriber>, LoadError> {
    use crate::config::DevicePolicy;

    match config.device {
        DevicePolicy::Cpu => whisper::WhisperEngine::load(config, false),
        DevicePolicy::Gpu => whisper::WhisperEngine::load(config, true),
        DevicePolicy::Auto => match whisper::WhisperEngine::load(config, true) {
            Ok(engine) => Ok(engine),
            Err(e) => {
                tracing::warn!("GPU initialization failed ({}), falling back to CPU", e);
                whisper::WhisperEngine::load(config, false)
            }
        },
    }
}
