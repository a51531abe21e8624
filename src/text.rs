//! Text cleanup before output
//!
//! Whisper output tends to carry stray leading/trailing whitespace and the
//! occasional doubled space between segments; this tidies the result before
//! it reaches the focused application.

use crate::config::OutputConfig;

/// Collapse whitespace runs and trim the ends
pub fn tidy(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Apply the configured output transformations
pub fn prepare(text: &str, config: &OutputConfig) -> String {
    let mut result = if config.cleanup {
        tidy(text)
    } else {
        text.to_string()
    };

    if config.add_newline && !result.is_empty() {
        result.push('\n');
    }

    result
}
