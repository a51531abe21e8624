//! Setup checks and model download
//!
//! `dictare setup` verifies that the configured model and the external
//! output tools are present; `--download` fetches missing model weights
//! from the whisper.cpp repository on Hugging Face.

use crate::config::Config;
use crate::error::{DictareError, Result};
use crate::transcribe::whisper::{model_filename, model_url};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

async fn tool_available(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Resolve where the configured model should live on disk
fn model_path(config: &Config) -> Result<PathBuf> {
    let name = &config.model.name;
    let path = PathBuf::from(name);
    if path.is_absolute() {
        return Ok(path);
    }
    let filename = model_filename(name).ok_or_else(|| {
        DictareError::Config(format!("Unknown model name in config: '{}'", name))
    })?;
    Ok(Config::models_dir().join(filename))
}

/// Check the environment and optionally download the configured model
pub async fn run_setup(config: &Config, download: bool) -> Result<()> {
    Config::ensure_directories()?;

    println!("Dictare setup");
    println!("=============\n");

    let path = model_path(config)?;
    if path.exists() {
        println!("  [ok] model '{}' installed at {:?}", config.model.name, path);
    } else if download {
        download_model(config).await?;
    } else {
        println!(
            "  [--] model '{}' not found at {:?}",
            config.model.name, path
        );
        println!("       run 'dictare setup --download' to fetch it");
    }

    for (tool, purpose) in [
        ("wtype", "typing into the focused window"),
        ("wl-copy", "clipboard output"),
        ("notify-send", "desktop notifications"),
    ] {
        if tool_available(tool).await {
            println!("  [ok] {} available ({})", tool, purpose);
        } else {
            println!("  [--] {} missing ({})", tool, purpose);
        }
    }

    Ok(())
}

/// Download the configured model with curl (it handles redirects and shows
/// a progress bar)
pub async fn download_model(config: &Config) -> Result<()> {
    let name = &config.model.name;
    let url = model_url(name)
        .ok_or_else(|| DictareError::Config(format!("No download URL for model '{}'", name)))?;
    let path = model_path(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    println!("Downloading {} from {}", name, url);

    let status = Command::new("curl")
        .args([
            "-L",
            "--progress-bar",
            "-o",
            &path.to_string_lossy(),
            &url,
        ])
        .status()
        .await
        .map_err(|e| DictareError::Config(format!("Failed to run curl: {}", e)))?;

    if !status.success() {
        // Don't leave a truncated model behind
        let _ = std::fs::remove_file(&path);
        return Err(DictareError::Config(format!(
            "Download failed: curl exited with code {}",
            status.code().unwrap_or(-1)
        )));
    }

    println!("Saved to {:?}", path);
    Ok(())
}
