//! Recording session lifecycle
//!
//! A session owns one capture-to-buffer cycle: it pulls frames from the
//! audio source, feeds their energy to the silence detector, and ends in
//! exactly one of three terminal outcomes. The audio buffer is only ever
//! touched by the session task, and a session is never reused: the
//! coordinator creates a fresh one per trigger.
//!
//! Phases: Idle → Active → Finishing → Finished (success path);
//! Active → Cancelled; Active|Finishing → Failed. Terminal phases are
//! absorbing.

use crate::audio::{AudioCapture, AudioFrame};
use crate::detector::{Decision, SilenceDetector};
use crate::error::CaptureError;
use std::fmt;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Audio samples collected during recording (f32, mono)
pub type AudioBuffer = Vec<f32>;

/// Lifecycle phase of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created but not yet capturing
    Idle,
    /// Pulling frames from the audio source
    Active,
    /// Stop requested or detected; draining the source
    Finishing,
    /// Buffer complete and handed off
    Finished,
    /// Aborted; buffer discarded
    Cancelled,
    /// Capture source error; buffer discarded
    Failed,
}

impl Phase {
    /// Whether a transition from `self` to `target` is valid
    pub fn can_transition_to(self, target: Phase) -> bool {
        matches!(
            (self, target),
            (Phase::Idle, Phase::Active)
                | (Phase::Active, Phase::Finishing)
                | (Phase::Finishing, Phase::Finished)
                | (Phase::Active, Phase::Cancelled)
                | (Phase::Active, Phase::Failed)
                | (Phase::Finishing, Phase::Failed)
                // A session that never started capturing can still fail
                | (Phase::Idle, Phase::Failed)
        )
    }

    /// Terminal phases accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Finished | Phase::Cancelled | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "Idle",
            Phase::Active => "Active",
            Phase::Finishing => "Finishing",
            Phase::Finished => "Finished",
            Phase::Cancelled => "Cancelled",
            Phase::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// How a completed session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Success: the captured buffer is ready for transcription
    Finished(AudioBuffer),
    /// Cancelled (explicitly, or empty via the grace period); no audio kept
    Cancelled,
    /// The capture source failed; no audio kept
    Failed(CaptureError),
}

/// Commands the coordinator can send to a running session
#[derive(Debug, Clone, Copy)]
pub enum SessionCommand {
    /// Finish normally and hand off the buffer (manual stop)
    Stop,
    /// Abort, discarding the buffer
    Cancel,
}

/// Handle to a spawned session task
pub struct SessionHandle {
    pub id: u64,
    commands: mpsc::Sender<SessionCommand>,
    pub task: JoinHandle<SessionEnd>,
}

impl SessionHandle {
    /// Request a manual stop. The session observes it at the next frame
    /// boundary.
    pub async fn stop(&self) {
        let _ = self.commands.send(SessionCommand::Stop).await;
    }

    /// Request cancellation; the buffer will be discarded.
    pub async fn cancel(&self) {
        let _ = self.commands.send(SessionCommand::Cancel).await;
    }
}

/// One record-to-buffer cycle
struct Session {
    id: u64,
    phase: Phase,
    started_at: Instant,
    buffer: AudioBuffer,
}

impl Session {
    fn new(id: u64) -> Self {
        Self {
            id,
            phase: Phase::Idle,
            started_at: Instant::now(),
            buffer: AudioBuffer::new(),
        }
    }

    /// Move to the next phase. An invalid transition means the session loop
    /// itself is buggy, which is not a recoverable condition.
    fn advance(&mut self, next: Phase) {
        assert!(
            self.phase.can_transition_to(next),
            "invalid session transition: {} -> {} (session {})",
            self.phase,
            next,
            self.id
        );
        tracing::debug!("Session {}: {} -> {}", self.id, self.phase, next);
        self.phase = next;
    }
}

/// Spawn a session task. Capture starts immediately; the returned handle
/// controls the session and resolves to its terminal outcome.
pub fn spawn(
    id: u64,
    capture: Box<dyn AudioCapture>,
    detector: SilenceDetector,
    sample_rate: u32,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let task = tokio::spawn(run(id, capture, detector, sample_rate, cmd_rx));
    SessionHandle {
        id,
        commands: cmd_tx,
        task,
    }
}

async fn run(
    id: u64,
    mut capture: Box<dyn AudioCapture>,
    mut detector: SilenceDetector,
    sample_rate: u32,
    mut commands: mpsc::Receiver<SessionCommand>,
) -> SessionEnd {
    let mut session = Session::new(id);

    let mut frames = match capture.start().await {
        Ok(rx) => rx,
        Err(e) => {
            session.advance(Phase::Failed);
            return SessionEnd::Failed(e);
        }
    };
    session.advance(Phase::Active);

    loop {
        tokio::select! {
            maybe_frame = frames.recv() => match maybe_frame {
                Some(frame) => {
                    match process_frame(&mut session, &mut detector, &frame, sample_rate) {
                        Decision::Continue => {}
                        Decision::AutoStop => break,
                        Decision::AbortEmpty => {
                            return cancel(&mut session, &mut capture).await;
                        }
                    }
                }
                None => {
                    session.advance(Phase::Failed);
                    return SessionEnd::Failed(CaptureError::StreamClosed);
                }
            },
            cmd = commands.recv() => match cmd {
                Some(SessionCommand::Stop) => break,
                // A dropped command channel means the coordinator is gone;
                // treat it like a cancel so the source is released.
                Some(SessionCommand::Cancel) | None => {
                    return cancel(&mut session, &mut capture).await;
                }
            },
        }
    }

    session.advance(Phase::Finishing);

    if let Err(e) = capture.stop().await {
        session.advance(Phase::Failed);
        return SessionEnd::Failed(e);
    }

    // Keep any frames that were already in flight when we stopped
    while let Ok(frame) = frames.try_recv() {
        session.buffer.extend_from_slice(&frame.samples);
    }

    session.advance(Phase::Finished);
    tracing::info!(
        "Session {} finished: {:.1}s of audio in {:.1}s",
        session.id,
        session.buffer.len() as f32 / sample_rate as f32,
        session.started_at.elapsed().as_secs_f32()
    );

    SessionEnd::Finished(session.buffer)
}

fn process_frame(
    session: &mut Session,
    detector: &mut SilenceDetector,
    frame: &AudioFrame,
    sample_rate: u32,
) -> Decision {
    session.buffer.extend_from_slice(&frame.samples);
    detector.feed(frame.energy(), frame.duration(sample_rate))
}

async fn cancel(session: &mut Session, capture: &mut Box<dyn AudioCapture>) -> SessionEnd {
    if let Err(e) = capture.stop().await {
        tracing::warn!("Session {}: error stopping capture on cancel: {}", session.id, e);
    }
    session.buffer.clear();
    session.advance(Phase::Cancelled);
    tracing::info!("Session {} cancelled", session.id);
    SessionEnd::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::SilenceDetector;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Capture source that plays back a fixed list of frames, then keeps
    /// the channel open until stopped
    struct PlaybackCapture {
        frames: Vec<AudioFrame>,
        stopped: Arc<AtomicBool>,
        stop_tx: Option<tokio::sync::watch::Sender<bool>>,
    }

    impl PlaybackCapture {
        fn new(frames: Vec<AudioFrame>) -> (Self, Arc<AtomicBool>) {
            let stopped = Arc::new(AtomicBool::new(false));
            (
                Self {
                    frames,
                    stopped: stopped.clone(),
                    stop_tx: None,
                },
                stopped,
            )
        }
    }

    #[async_trait::async_trait]
    impl AudioCapture for PlaybackCapture {
        async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
            let (tx, rx) = mpsc::channel(256);
            let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
            self.stop_tx = Some(stop_tx);
            let frames = std::mem::take(&mut self.frames);

            tokio::spawn(async move {
                for frame in frames {
                    if *stop_rx.borrow() || tx.send(frame).await.is_err() {
                        return;
                    }
                }
                // Stay open (silence) until stop; dropping tx would read as
                // a stream failure
                let mut stop_rx = stop_rx;
                let _ = stop_rx.changed().await;
            });

            Ok(rx)
        }

        async fn stop(&mut self) -> Result<(), CaptureError> {
            self.stopped.store(true, Ordering::SeqCst);
            if let Some(tx) = self.stop_tx.take() {
                let _ = tx.send(true);
            }
            Ok(())
        }
    }

    fn loud_frame() -> AudioFrame {
        AudioFrame::new(vec![0.5; 1600])
    }

    fn silent_frame() -> AudioFrame {
        AudioFrame::new(vec![0.0; 1600])
    }

    fn test_detector() -> SilenceDetector {
        SilenceDetector::new(
            0.01,
            Some(Duration::from_secs(2)),
            Some(Duration::from_secs(10)),
            Duration::from_secs(120),
        )
    }

    #[test]
    fn test_phase_transitions() {
        assert!(Phase::Idle.can_transition_to(Phase::Active));
        assert!(Phase::Active.can_transition_to(Phase::Finishing));
        assert!(Phase::Finishing.can_transition_to(Phase::Finished));
        assert!(Phase::Active.can_transition_to(Phase::Cancelled));
        assert!(Phase::Active.can_transition_to(Phase::Failed));
        assert!(Phase::Finishing.can_transition_to(Phase::Failed));

        // Terminal phases are absorbing
        for terminal in [Phase::Finished, Phase::Cancelled, Phase::Failed] {
            assert!(terminal.is_terminal());
            for target in [
                Phase::Idle,
                Phase::Active,
                Phase::Finishing,
                Phase::Finished,
                Phase::Cancelled,
                Phase::Failed,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }

        // No skipping ahead
        assert!(!Phase::Idle.can_transition_to(Phase::Finishing));
        assert!(!Phase::Idle.can_transition_to(Phase::Finished));
        assert!(!Phase::Active.can_transition_to(Phase::Finished));
        assert!(!Phase::Finishing.can_transition_to(Phase::Cancelled));
    }

    #[tokio::test]
    async fn test_silence_auto_stop_finishes_with_buffer() {
        // 5 loud frames + enough silence to trip the 2s limit
        let mut frames = vec![loud_frame(); 5];
        frames.extend(vec![silent_frame(); 30]);
        let (capture, stopped) = PlaybackCapture::new(frames);

        let handle = spawn(1, Box::new(capture), test_detector(), 16000);
        let end = handle.task.await.unwrap();

        match end {
            SessionEnd::Finished(buffer) => {
                // 5 speech + 20 silent frames were consumed before AutoStop
                assert!(buffer.len() >= 25 * 1600);
            }
            other => panic!("expected Finished, got {:?}", other),
        }
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_grace_abort_is_cancelled() {
        let frames = vec![silent_frame(); 120];
        let (capture, stopped) = PlaybackCapture::new(frames);

        let handle = spawn(2, Box::new(capture), test_detector(), 16000);
        let end = handle.task.await.unwrap();

        assert!(matches!(end, SessionEnd::Cancelled));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_discards_buffer() {
        // Endless speech; only the cancel command ends it
        let frames = vec![loud_frame(); 10];
        let (capture, stopped) = PlaybackCapture::new(frames);

        let handle = spawn(3, Box::new(capture), test_detector(), 16000);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel().await;
        let end = handle.task.await.unwrap();

        assert!(matches!(end, SessionEnd::Cancelled));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_manual_stop_finishes() {
        let frames = vec![loud_frame(); 10];
        let (capture, _stopped) = PlaybackCapture::new(frames);

        let handle = spawn(4, Box::new(capture), test_detector(), 16000);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;
        let end = handle.task.await.unwrap();

        match end {
            SessionEnd::Finished(buffer) => assert!(!buffer.is_empty()),
            other => panic!("expected Finished, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_stream_fails_session() {
        struct BrokenCapture;

        #[async_trait::async_trait]
        impl AudioCapture for BrokenCapture {
            async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
                let (tx, rx) = mpsc::channel(4);
                drop(tx);
                Ok(rx)
            }

            async fn stop(&mut self) -> Result<(), CaptureError> {
                Ok(())
            }
        }

        let handle = spawn(5, Box::new(BrokenCapture), test_detector(), 16000);
        let end = handle.task.await.unwrap();
        assert!(matches!(
            end,
            SessionEnd::Failed(CaptureError::StreamClosed)
        ));
    }
}
