//! Streaming silence detector
//!
//! Consumes the per-frame energy of a live recording and decides when the
//! speaker has stopped talking. One detector instance belongs to one
//! recording session; it carries no I/O and is driven purely by
//! `feed(energy, frame_duration)` calls, which makes it testable without
//! any audio hardware.

use crate::config::{ActivationMode, AudioConfig};
use std::time::Duration;

/// Decision returned for each fed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep recording
    Continue,
    /// Stop recording and transcribe what was captured
    AutoStop,
    /// No speech was ever heard within the grace period; drop the
    /// recording silently (a no-op, not an error)
    AbortEmpty,
}

/// Per-session silence detection state
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    /// RMS level at or above which a frame counts as speech
    threshold: f32,
    /// Trailing silence needed after speech to auto-stop; None disables
    silence_limit: Option<Duration>,
    /// Deadline for first speech; None disables the empty-session abort
    grace_period: Option<Duration>,
    /// Hard cap on total recording length, independent of silence state
    max_duration: Duration,

    elapsed: Duration,
    trailing_silence: Duration,
    speech_detected: bool,
}

impl SilenceDetector {
    pub fn new(
        threshold: f32,
        silence_limit: Option<Duration>,
        grace_period: Option<Duration>,
        max_duration: Duration,
    ) -> Self {
        Self {
            threshold,
            silence_limit,
            grace_period,
            max_duration,
            elapsed: Duration::ZERO,
            trailing_silence: Duration::ZERO,
            speech_detected: false,
        }
    }

    /// Build a detector for one session from the audio config.
    ///
    /// In push-to-talk mode the grace-period abort is disabled: releasing
    /// the key is the natural stop signal there, and an early abort would
    /// race against it. A zero `silence_duration_secs` (or a zero
    /// threshold) disables silence auto-stop entirely, leaving only the
    /// hard duration cap.
    pub fn from_config(audio: &AudioConfig, mode: ActivationMode) -> Self {
        let silence_enabled = audio.silence_threshold > 0.0 && audio.silence_duration_secs > 0.0;
        let silence_limit =
            silence_enabled.then(|| Duration::from_secs_f32(audio.silence_duration_secs));
        let grace_period = (silence_enabled
            && mode == ActivationMode::Toggle
            && audio.grace_period_secs > 0.0)
            .then(|| Duration::from_secs_f32(audio.grace_period_secs));

        Self::new(
            audio.silence_threshold,
            silence_limit,
            grace_period,
            audio.max_duration(),
        )
    }

    /// Whether any frame so far reached the speech threshold
    pub fn has_detected_speech(&self) -> bool {
        self.speech_detected
    }

    /// Feed one frame's energy and duration, advancing the detector state.
    ///
    /// Trailing silence resets on every frame at or above the threshold and
    /// grows monotonically between such frames. The duration cap is checked
    /// first so an over-long recording stops even while speech continues.
    pub fn feed(&mut self, energy: f32, frame: Duration) -> Decision {
        self.elapsed += frame;

        if self.elapsed >= self.max_duration {
            tracing::warn!(
                "Max recording duration reached ({:.0}s), stopping",
                self.max_duration.as_secs_f32()
            );
            return Decision::AutoStop;
        }

        if self.silence_limit.is_some() || self.grace_period.is_some() {
            if energy >= self.threshold {
                if !self.speech_detected {
                    tracing::debug!("Speech detected (energy {:.4})", energy);
                }
                self.speech_detected = true;
                self.trailing_silence = Duration::ZERO;
                return Decision::Continue;
            }

            self.trailing_silence += frame;

            if self.speech_detected {
                if let Some(limit) = self.silence_limit {
                    if self.trailing_silence >= limit {
                        tracing::info!(
                            "Silence after speech ({:.1}s), auto-stopping",
                            self.trailing_silence.as_secs_f32()
                        );
                        return Decision::AutoStop;
                    }
                }
            } else if let Some(grace) = self.grace_period {
                if self.elapsed >= grace {
                    tracing::info!("Grace period expired, no speech detected");
                    return Decision::AbortEmpty;
                }
            }
        }

        Decision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActivationMode, AudioConfig};

    const FRAME: Duration = Duration::from_millis(100);

    fn detector(silence_secs: f32, grace_secs: f32) -> SilenceDetector {
        SilenceDetector::new(
            0.01,
            (silence_secs > 0.0).then(|| Duration::from_secs_f32(silence_secs)),
            (grace_secs > 0.0).then(|| Duration::from_secs_f32(grace_secs)),
            Duration::from_secs(120),
        )
    }

    #[test]
    fn speech_resets_trailing_silence() {
        let mut d = detector(2.0, 10.0);

        assert_eq!(d.feed(0.5, FRAME), Decision::Continue);
        assert!(d.has_detected_speech());

        // 19 silent frames (1.9s) stay below the 2.0s limit
        for _ in 0..19 {
            assert_eq!(d.feed(0.0, FRAME), Decision::Continue);
        }

        // A speech frame resets the run; silence must accumulate again
        assert_eq!(d.feed(0.5, FRAME), Decision::Continue);
        for _ in 0..19 {
            assert_eq!(d.feed(0.0, FRAME), Decision::Continue);
        }
        assert_eq!(d.feed(0.0, FRAME), Decision::AutoStop);
    }

    #[test]
    fn auto_stop_fires_at_exact_frame() {
        // threshold=0.01, limit=2.0s, frame=0.1s:
        // 5 speech frames then silence; the 20th silent frame (25th overall)
        // is the first where trailing silence reaches 2.0s.
        let mut d = detector(2.0, 10.0);

        for _ in 0..5 {
            assert_eq!(d.feed(0.5, FRAME), Decision::Continue);
        }
        for _ in 0..19 {
            assert_eq!(d.feed(0.0, FRAME), Decision::Continue);
        }
        assert_eq!(d.feed(0.0, FRAME), Decision::AutoStop);
    }

    #[test]
    fn grace_period_aborts_empty_session() {
        // grace=10s, frame=0.1s: all-silent input aborts at frame 100
        let mut d = detector(2.0, 10.0);

        for _ in 0..99 {
            assert_eq!(d.feed(0.0, FRAME), Decision::Continue);
        }
        assert_eq!(d.feed(0.0, FRAME), Decision::AbortEmpty);
        assert!(!d.has_detected_speech());
    }

    #[test]
    fn no_grace_abort_once_speech_heard() {
        let mut d = detector(0.0, 1.0);

        assert_eq!(d.feed(0.5, FRAME), Decision::Continue);
        // Silence auto-stop is disabled; nothing but the cap can stop us now
        for _ in 0..200 {
            assert_eq!(d.feed(0.0, FRAME), Decision::Continue);
        }
    }

    #[test]
    fn zero_silence_limit_disables_auto_stop() {
        let mut d = detector(0.0, 0.0);

        assert_eq!(d.feed(0.5, FRAME), Decision::Continue);
        for _ in 0..500 {
            assert_eq!(d.feed(0.0, FRAME), Decision::Continue);
        }
    }

    #[test]
    fn hard_cap_stops_continuous_speech() {
        let mut d = SilenceDetector::new(
            0.01,
            Some(Duration::from_secs(2)),
            None,
            Duration::from_secs(1),
        );

        // Trailing silence never grows, the cap still fires at 1.0s
        for _ in 0..9 {
            assert_eq!(d.feed(0.5, FRAME), Decision::Continue);
        }
        assert_eq!(d.feed(0.5, FRAME), Decision::AutoStop);
    }

    #[test]
    fn hard_cap_applies_when_silence_detection_disabled() {
        let mut d = SilenceDetector::new(0.0, None, None, Duration::from_secs(1));

        for _ in 0..9 {
            assert_eq!(d.feed(0.0, FRAME), Decision::Continue);
        }
        assert_eq!(d.feed(0.0, FRAME), Decision::AutoStop);
    }

    #[test]
    fn push_to_talk_disables_grace_abort() {
        let audio = AudioConfig::default();

        let mut d = SilenceDetector::from_config(&audio, ActivationMode::PushToTalk);
        // Well past the 10s grace period with no speech: still recording
        for _ in 0..150 {
            assert_eq!(d.feed(0.0, FRAME), Decision::Continue);
        }

        let mut d = SilenceDetector::from_config(&audio, ActivationMode::Toggle);
        for _ in 0..99 {
            assert_eq!(d.feed(0.0, FRAME), Decision::Continue);
        }
        assert_eq!(d.feed(0.0, FRAME), Decision::AbortEmpty);
    }

    #[test]
    fn threshold_boundary_counts_as_speech() {
        let mut d = detector(2.0, 10.0);
        d.feed(0.01, FRAME);
        assert!(d.has_detected_speech());
    }
}
