//! Text output module
//!
//! Delivers transcribed text to the focused application via keyboard
//! simulation or the clipboard.
//!
//! Fallback chain for `mode = "type"`:
//! 1. wtype - Wayland-native, good Unicode support, no daemon needed
//! 2. clipboard - universal fallback via wl-copy, so text is never lost

pub mod clipboard;
pub mod wtype;

use crate::config::{OutputConfig, OutputMode};
use crate::error::EmitError;

/// Trait for text output implementations
#[async_trait::async_trait]
pub trait TextOutput: Send + Sync {
    /// Deliver text (type it or copy to clipboard)
    async fn emit(&self, text: &str) -> Result<(), EmitError>;

    /// Check if this output method is available
    async fn is_available(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Factory function that returns a fallback chain of output methods
pub fn create_output_chain(config: &OutputConfig) -> Vec<Box<dyn TextOutput>> {
    let mut chain: Vec<Box<dyn TextOutput>> = Vec::new();

    match config.mode {
        OutputMode::Type => {
            chain.push(Box::new(wtype::WtypeOutput::new(
                config.notification.on_transcription,
            )));

            if config.fallback_to_clipboard {
                chain.push(Box::new(clipboard::ClipboardOutput::new(false)));
            }
        }
        OutputMode::Clipboard => {
            chain.push(Box::new(clipboard::ClipboardOutput::new(
                config.notification.on_transcription,
            )));
        }
    }

    chain
}

/// Try each output method in the chain until one succeeds
pub async fn emit_with_fallback(
    chain: &[Box<dyn TextOutput>],
    text: &str,
) -> Result<(), EmitError> {
    for output in chain {
        if !output.is_available().await {
            tracing::debug!("{} not available, trying next", output.name());
            continue;
        }

        match output.emit(text).await {
            Ok(()) => {
                tracing::debug!("Text output via {}", output.name());
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("{} failed: {}, trying next", output.name(), e);
            }
        }
    }

    Err(EmitError::AllSinksFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;

    #[test]
    fn test_type_chain_includes_clipboard_fallback() {
        let config = OutputConfig::default();
        let chain = create_output_chain(&config);
        let names: Vec<_> = chain.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["wtype", "clipboard (wl-copy)"]);
    }

    #[test]
    fn test_type_chain_without_fallback() {
        let config = OutputConfig {
            fallback_to_clipboard: false,
            ..OutputConfig::default()
        };
        let chain = create_output_chain(&config);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name(), "wtype");
    }

    #[test]
    fn test_clipboard_chain() {
        let config = OutputConfig {
            mode: OutputMode::Clipboard,
            ..OutputConfig::default()
        };
        let chain = create_output_chain(&config);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name(), "clipboard (wl-copy)");
    }
}
