//! Whisper-based speech-to-text
//!
//! Uses whisper.cpp via the whisper-rs crate for fast, local transcription.

use super::Transcriber;
use crate::config::{Config, ModelConfig};
use crate::error::{LoadError, TranscribeError};
use std::path::PathBuf;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Whisper engine holding one loaded model
pub struct WhisperEngine {
    /// Whisper context (holds the model weights)
    ctx: WhisperContext,
    /// Default language for transcription
    language: String,
    /// Number of threads to use
    threads: usize,
}

impl WhisperEngine {
    /// Load the model with an explicit GPU preference.
    pub fn load(config: &ModelConfig, use_gpu: bool) -> Result<Box<dyn Transcriber>, LoadError> {
        let model_path = resolve_model_path(&config.name)?;

        tracing::info!(
            "Loading whisper model from {:?} (gpu: {})",
            model_path,
            use_gpu
        );
        let start = std::time::Instant::now();

        let mut params = WhisperContextParameters::default();
        params.use_gpu(use_gpu);

        let ctx = WhisperContext::new_with_params(
            model_path
                .to_str()
                .ok_or_else(|| LoadError::ModelNotFound("Invalid path".to_string()))?,
            params,
        )
        .map_err(|e| LoadError::Init(e.to_string()))?;

        tracing::info!("Model loaded in {:.2}s", start.elapsed().as_secs_f32());

        let threads = config.threads.unwrap_or_else(|| num_cpus::get().min(4));

        Ok(Box::new(Self {
            ctx,
            language: config.language.clone(),
            threads,
        }))
    }
}

impl Transcriber for WhisperEngine {
    fn transcribe(
        &self,
        samples: &[f32],
        language: Option<&str>,
    ) -> Result<String, TranscribeError> {
        if samples.is_empty() {
            return Err(TranscribeError::AudioFormat(
                "Empty audio buffer".to_string(),
            ));
        }

        let duration_secs = samples.len() as f32 / 16000.0;
        tracing::debug!(
            "Transcribing {:.2}s of audio ({} samples)",
            duration_secs,
            samples.len()
        );

        let start = std::time::Instant::now();

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| TranscribeError::Inference(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        // "auto" enables whisper's language detection
        let lang = language.unwrap_or(&self.language);
        if lang == "auto" {
            params.set_language(None);
        } else {
            params.set_language(Some(lang));
        }

        params.set_n_threads(self.threads as i32);

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        params.set_suppress_blank(true);
        params.set_suppress_nst(true);

        // For short recordings, use single segment mode
        if duration_secs < 30.0 {
            params.set_single_segment(true);
        }

        state
            .full(params, samples)
            .map_err(|e| TranscribeError::Inference(e.to_string()))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(
                segment
                    .to_str()
                    .map_err(|e| TranscribeError::Inference(e.to_string()))?,
            );
        }

        let result = text.trim().to_string();

        tracing::info!(
            "Transcription completed in {:.2}s: {:?}",
            start.elapsed().as_secs_f32(),
            if result.chars().count() > 50 {
                format!("{}...", result.chars().take(50).collect::<String>())
            } else {
                result.clone()
            }
        );

        Ok(result)
    }
}

/// Resolve a model name or path to a model file on disk
fn resolve_model_path(model: &str) -> Result<PathBuf, LoadError> {
    // If it's already an absolute path, use it directly
    let path = PathBuf::from(model);
    if path.is_absolute() && path.exists() {
        return Ok(path);
    }

    let filename = model_filename(model).ok_or_else(|| {
        LoadError::ModelNotFound(format!(
            "Unknown model: '{}'. Valid models: tiny, base, small, medium, large-v3, large-v3-turbo",
            model
        ))
    })?;

    let model_path = Config::models_dir().join(filename);
    if model_path.exists() {
        Ok(model_path)
    } else {
        Err(LoadError::ModelNotFound(
            model_path.display().to_string(),
        ))
    }
}

/// Map a model name to its ggml file name
pub fn model_filename(model: &str) -> Option<String> {
    let filename = match model {
        "tiny" => "ggml-tiny.bin",
        "tiny.en" => "ggml-tiny.en.bin",
        "base" => "ggml-base.bin",
        "base.en" => "ggml-base.en.bin",
        "small" => "ggml-small.bin",
        "small.en" => "ggml-small.en.bin",
        "medium" => "ggml-medium.bin",
        "medium.en" => "ggml-medium.en.bin",
        "large" | "large-v1" => "ggml-large-v1.bin",
        "large-v2" => "ggml-large-v2.bin",
        "large-v3" => "ggml-large-v3.bin",
        "large-v3-turbo" => "ggml-large-v3-turbo.bin",
        other if other.ends_with(".bin") => other,
        _ => return None,
    };
    Some(filename.to_string())
}

/// Get the download URL for a model
pub fn model_url(model: &str) -> Option<String> {
    model_filename(model).map(|filename| {
        format!(
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/{}",
            filename
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_filename() {
        assert_eq!(model_filename("base.en").unwrap(), "ggml-base.en.bin");
        assert_eq!(
            model_filename("large-v3-turbo").unwrap(),
            "ggml-large-v3-turbo.bin"
        );
        assert_eq!(model_filename("custom.bin").unwrap(), "custom.bin");
        assert!(model_filename("not-a-model").is_none());
    }

    #[test]
    fn test_model_url() {
        assert_eq!(
            model_url("tiny.en").unwrap(),
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.en.bin"
        );
        assert!(model_url("bogus-model").is_none());
    }

    #[test]
    fn test_resolve_unknown_model_is_error() {
        let err = resolve_model_path("bogus-model").unwrap_err();
        assert!(matches!(err, LoadError::ModelNotFound(_)));
    }
}
