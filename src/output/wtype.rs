//! wtype-based text output
//!
//! Uses wtype to simulate keyboard input on Wayland. Preferred over other
//! injectors because it needs no daemon and handles Unicode well.
//!
//! Requires wtype installed and a Wayland session.

use super::TextOutput;
use crate::error::EmitError;
use std::process::Stdio;
use tokio::process::Command;

/// wtype-based text output
pub struct WtypeOutput {
    /// Whether to show a desktop notification with the text
    notify: bool,
}

impl WtypeOutput {
    pub fn new(notify: bool) -> Self {
        Self { notify }
    }

    async fn send_notification(&self, text: &str) {
        let preview: String = text.chars().take(100).collect();
        let preview = if text.chars().count() > 100 {
            format!("{}...", preview)
        } else {
            preview
        };

        let _ = Command::new("notify-send")
            .args([
                "--app-name=Dictare",
                "--expire-time=3000",
                "Transcribed",
                &preview,
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }
}

#[async_trait::async_trait]
impl TextOutput for WtypeOutput {
    async fn emit(&self, text: &str) -> Result<(), EmitError> {
        if text.is_empty() {
            return Ok(());
        }

        let output = Command::new("wtype")
            .arg("--")
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EmitError::WtypeNotFound
                } else {
                    EmitError::InjectionFailed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EmitError::InjectionFailed(format!(
                "wtype failed: {}",
                stderr
            )));
        }

        if self.notify {
            self.send_notification(text).await;
        }

        Ok(())
    }

    async fn is_available(&self) -> bool {
        // Just check if wtype exists in PATH; wtype itself will fail
        // naturally if Wayland isn't available
        Command::new("which")
            .arg("wtype")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "wtype"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let output = WtypeOutput::new(true);
        assert!(output.notify);

        let output = WtypeOutput::new(false);
        assert!(!output.notify);
    }
}
