//! cpal-based frame capture
//!
//! Uses the cpal crate for cross-platform audio input. The device is opened
//! at its native format; samples are mixed to mono, resampled to the target
//! rate, and re-chunked into fixed-duration frames before being handed to
//! the session over a channel.
//!
//! Note: cpal::Stream is not Send, so the stream lives on a dedicated
//! thread and all communication happens via channels.

use super::{AudioCapture, AudioFrame, FRAME_MS};
use crate::config::AudioConfig;
use crate::error::CaptureError;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Commands sent to the audio capture thread
enum CaptureCommand {
    Stop(oneshot::Sender<()>),
}

/// cpal-based audio capture implementation
pub struct CpalCapture {
    config: AudioConfig,
    cmd_tx: Option<std::sync::mpsc::Sender<CaptureCommand>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl CpalCapture {
    pub fn new(config: &AudioConfig) -> Result<Self, CaptureError> {
        Ok(Self {
            config: config.clone(),
            cmd_tx: None,
            thread_handle: None,
        })
    }
}

/// Chops an incoming sample stream into fixed-size frames
struct FrameAssembler {
    pending: Vec<f32>,
    frame_len: usize,
    tx: mpsc::Sender<AudioFrame>,
}

impl FrameAssembler {
    fn new(frame_len: usize, tx: mpsc::Sender<AudioFrame>) -> Self {
        Self {
            pending: Vec::with_capacity(frame_len * 2),
            frame_len,
            tx,
        }
    }

    /// Append samples, emitting every completed frame.
    /// Frames are dropped rather than blocking the audio callback if the
    /// receiver falls behind.
    fn push(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            let frame = AudioFrame::new(std::mem::replace(&mut self.pending, rest));
            if let Err(e) = self.tx.try_send(frame) {
                tracing::trace!("Dropping audio frame: {}", e);
            }
        }
    }

    /// Emit whatever partial frame remains (called on stop so the tail of
    /// the recording is not lost)
    fn flush(&mut self) {
        if !self.pending.is_empty() {
            let frame = AudioFrame::new(std::mem::take(&mut self.pending));
            let _ = self.tx.try_send(frame);
        }
    }
}

/// Find an audio input device by name.
///
/// Tries an exact match first, then a case-insensitive substring match, so
/// users can give either a full cpal device name or a short PipeWire alias.
fn find_audio_device(host: &cpal::Host, device_name: &str) -> Result<cpal::Device, CaptureError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| CaptureError::Connection(e.to_string()))?
        .collect();

    let search_lower = device_name.to_lowercase();

    for device in devices {
        if let Ok(name) = device.name() {
            if name == device_name || name.to_lowercase().contains(&search_lower) {
                tracing::debug!("Found audio device: {}", name);
                return Ok(device);
            }
        }
    }

    Err(CaptureError::DeviceNotFound(device_name.to_string()))
}

#[async_trait::async_trait]
impl AudioCapture for CpalCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();

        let device = if self.config.device == "default" {
            host.default_input_device()
                .ok_or_else(|| CaptureError::DeviceNotFound("default".to_string()))?
        } else {
            find_audio_device(&host, &self.config.device)?
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Using audio device: {}", device_name);

        let supported_config = device
            .default_input_config()
            .map_err(|e| CaptureError::Connection(e.to_string()))?;

        let source_rate = supported_config.sample_rate().0;
        let source_channels = supported_config.channels() as usize;
        let target_rate = self.config.sample_rate;
        let sample_format = supported_config.sample_format();

        tracing::debug!(
            "Device config: {} Hz, {} channel(s), format: {:?}",
            source_rate,
            source_channels,
            sample_format
        );

        let frame_len = (target_rate as u64 * FRAME_MS / 1000) as usize;
        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<CaptureCommand>();

        let thread_handle = thread::spawn(move || {
            let stream_config = cpal::StreamConfig {
                channels: supported_config.channels(),
                sample_rate: supported_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            let err_fn = |err| tracing::error!("Audio stream error: {}", err);

            let (raw_tx, raw_rx) = std::sync::mpsc::channel::<Vec<f32>>();

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(
                    &device,
                    &stream_config,
                    raw_tx,
                    source_channels,
                    err_fn,
                ),
                cpal::SampleFormat::I16 => build_stream::<i16>(
                    &device,
                    &stream_config,
                    raw_tx,
                    source_channels,
                    err_fn,
                ),
                cpal::SampleFormat::U16 => build_stream::<u16>(
                    &device,
                    &stream_config,
                    raw_tx,
                    source_channels,
                    err_fn,
                ),
                format => {
                    tracing::error!("Unsupported sample format: {:?}", format);
                    return;
                }
            };

            let stream = match stream_result {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("Failed to build audio stream: {}", e);
                    return;
                }
            };

            if let Err(e) = stream.play() {
                tracing::error!("Failed to start audio stream: {}", e);
                return;
            }

            tracing::debug!("Audio capture thread started");

            let mut assembler = FrameAssembler::new(frame_len, frame_tx);

            loop {
                // Drain mixed samples from the callback, re-chunking into frames
                while let Ok(mono) = raw_rx.try_recv() {
                    let resampled = if source_rate != target_rate {
                        resample(&mono, source_rate, target_rate)
                    } else {
                        mono
                    };
                    assembler.push(&resampled);
                }

                match cmd_rx.recv_timeout(Duration::from_millis(10)) {
                    Ok(CaptureCommand::Stop(done_tx)) => {
                        drop(stream);
                        // The callback is gone; pick up anything it left behind
                        while let Ok(mono) = raw_rx.try_recv() {
                            let resampled = if source_rate != target_rate {
                                resample(&mono, source_rate, target_rate)
                            } else {
                                mono
                            };
                            assembler.push(&resampled);
                        }
                        assembler.flush();
                        let _ = done_tx.send(());
                        break;
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                        drop(stream);
                        break;
                    }
                }
            }

            tracing::debug!("Audio capture thread stopped");
        });

        self.cmd_tx = Some(cmd_tx);
        self.thread_handle = Some(thread_handle);

        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(cmd_tx) = self.cmd_tx.take() {
            let (done_tx, done_rx) = oneshot::channel();

            if cmd_tx.send(CaptureCommand::Stop(done_tx)).is_ok() {
                match tokio::time::timeout(Duration::from_secs(2), done_rx).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => {
                        return Err(CaptureError::Stream("capture thread gone".to_string()))
                    }
                    Err(_) => {
                        return Err(CaptureError::Stream(
                            "capture thread did not stop within 2s".to_string(),
                        ))
                    }
                }
            }
        }

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        tracing::debug!("Audio capture stopped");
        Ok(())
    }
}

/// Build an input stream for a specific sample type.
/// The callback only converts to mono f32 and forwards; re-chunking and
/// resampling happen on the capture thread, off the real-time path.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: std::sync::mpsc::Sender<Vec<f32>>,
    source_channels: usize,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono: Vec<f32> = data
                    .chunks(source_channels)
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / source_channels as f32
                    })
                    .collect();

                let _ = tx.send(mono);
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

    Ok(stream)
}

/// Linear interpolation resampling
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };

        output.push(sample);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        let result = resample(&samples, 16000, 16000);
        assert_eq!(result, samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = resample(&samples, 48000, 16000);
        assert!(result.len() >= 2 && result.len() <= 4);
    }

    #[test]
    fn test_resample_upsample() {
        let samples = vec![1.0, 2.0];
        let result = resample(&samples, 8000, 16000);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_frame_assembler_chunks_exact_frames() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut assembler = FrameAssembler::new(4, tx);

        assembler.push(&[1.0, 2.0, 3.0]);
        assert!(rx.try_recv().is_err());

        assembler.push(&[4.0, 5.0]);
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.samples, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(rx.try_recv().is_err());

        assembler.push(&[6.0, 7.0, 8.0, 9.0]);
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.samples, vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_frame_assembler_flush_emits_partial() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut assembler = FrameAssembler::new(4, tx);

        assembler.push(&[1.0, 2.0]);
        assembler.flush();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.samples, vec![1.0, 2.0]);
    }

    #[test]
    fn test_frame_assembler_flush_empty_is_noop() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut assembler = FrameAssembler::new(4, tx);
        assembler.flush();
        assert!(rx.try_recv().is_err());
    }
}
