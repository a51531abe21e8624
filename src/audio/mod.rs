//! Audio capture module
//!
//! Provides frame-oriented audio recording using cpal, which works with
//! PipeWire, PulseAudio, and ALSA backends. A capture source delivers a
//! stream of fixed-duration mono frames; the recording session owns the
//! accumulated buffer, the source never does.

pub mod capture;

use crate::config::AudioConfig;
use crate::error::CaptureError;
use std::time::Duration;
use tokio::sync::mpsc;

/// Nominal frame length. Keeping frames short bounds how long a stop or
/// cancel signal can go unnoticed by the session loop.
pub const FRAME_MS: u64 = 100;

/// One fixed-duration chunk of mono audio (f32 samples at the configured rate)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// RMS energy of the frame
    pub fn energy(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f32 = self.samples.iter().map(|&s| s * s).sum();
        (sum_squares / self.samples.len() as f32).sqrt()
    }

    /// Wall-clock duration this frame represents at the given sample rate
    pub fn duration(&self, sample_rate: u32) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / sample_rate as f64)
    }
}

/// Trait for audio capture implementations
///
/// `start` begins capture and returns the frame stream; `stop` ends the
/// stream promptly (the receiver sees the channel close once any frames
/// already in flight are drained).
#[async_trait::async_trait]
pub trait AudioCapture: Send {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    async fn stop(&mut self) -> Result<(), CaptureError>;
}

/// Factory function to create audio capture
pub fn create_capture(config: &AudioConfig) -> Result<Box<dyn AudioCapture>, CaptureError> {
    Ok(Box::new(capture::CpalCapture::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_energy_silence() {
        let frame = AudioFrame::new(vec![0.0; 1600]);
        assert_eq!(frame.energy(), 0.0);
    }

    #[test]
    fn test_frame_energy_empty() {
        let frame = AudioFrame::new(vec![]);
        assert_eq!(frame.energy(), 0.0);
    }

    #[test]
    fn test_frame_energy_sine() {
        // RMS of a full-scale sine wave is ~0.707
        let samples: Vec<f32> = (0..1600)
            .map(|i| (i as f32 * 2.0 * std::f32::consts::PI / 100.0).sin())
            .collect();
        let frame = AudioFrame::new(samples);
        assert!((frame.energy() - 0.707).abs() < 0.01);
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::new(vec![0.0; 1600]);
        assert_eq!(frame.duration(16000), Duration::from_millis(100));

        let partial = AudioFrame::new(vec![0.0; 800]);
        assert_eq!(partial.duration(16000), Duration::from_millis(50));
    }
}
