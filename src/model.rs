//! Model resource host
//!
//! Owns the one expensive, long-lived engine instance shared by every
//! recording cycle. The engine is created lazily through an injectable
//! factory (the real one builds a whisper engine; tests substitute fakes),
//! guarded by a depth-1 async lock that covers both loading and inference:
//!
//! - `ensure_loaded` is idempotent and safe to call concurrently. Exactly
//!   one underlying load runs; callers that arrived while it was in flight
//!   observe that attempt's outcome instead of starting their own. A fresh
//!   call after a failed attempt performs exactly one new try; there is no
//!   internal retry loop.
//! - `transcribe` serializes with other transcriptions and with loading.
//!   The lock guard moves into the blocking inference task, so a caller
//!   that stops waiting (deadline) cannot release exclusivity while the
//!   engine is still busy; inference always runs to completion.

use crate::config::ModelConfig;
use crate::error::{LoadError, TranscribeError};
use crate::transcribe::{self, Transcriber};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Factory that performs one load attempt
pub type EngineFactory =
    Arc<dyn Fn() -> Result<Box<dyn Transcriber>, LoadError> + Send + Sync>;

#[derive(Default)]
struct Slot {
    engine: Option<Arc<dyn Transcriber>>,
    /// Message of the most recent failed load attempt
    last_error: Option<String>,
}

/// Shared host for the lazily-loaded transcription engine
pub struct ModelHost {
    factory: EngineFactory,
    slot: Arc<Mutex<Slot>>,
    /// Completed load attempts, successful or not
    attempts: AtomicU64,
}

impl ModelHost {
    /// Host for the engine described by the model config
    pub fn new(config: &ModelConfig) -> Self {
        let config = config.clone();
        Self::with_factory(Arc::new(move || transcribe::create_engine(&config)))
    }

    /// Host with a custom engine factory (used by tests)
    pub fn with_factory(factory: EngineFactory) -> Self {
        Self {
            factory,
            slot: Arc::new(Mutex::new(Slot::default())),
            attempts: AtomicU64::new(0),
        }
    }

    /// Whether the engine is currently loaded
    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.engine.is_some()
    }

    /// Load the engine if it is not loaded yet
    pub async fn ensure_loaded(&self) -> Result<(), LoadError> {
        let entered = self.attempts.load(Ordering::Acquire);
        let mut slot = self.slot.clone().lock_owned().await;
        self.load_locked(&mut slot, entered).await.map(|_| ())
    }

    /// Transcribe an audio buffer, loading the engine first if needed.
    ///
    /// Runs inference on the blocking pool while holding the exclusive
    /// lock; concurrent callers queue rather than run in parallel.
    pub async fn transcribe(
        &self,
        samples: Vec<f32>,
        language: Option<String>,
    ) -> Result<String, TranscribeError> {
        let entered = self.attempts.load(Ordering::Acquire);
        let mut slot = self.slot.clone().lock_owned().await;
        let engine = self.load_locked(&mut slot, entered).await?;

        let task = tokio::task::spawn_blocking(move || {
            // Guard lives until inference returns, even if the awaiting
            // caller gave up on us
            let _exclusive: OwnedMutexGuard<Slot> = slot;
            engine.transcribe(&samples, language.as_deref())
        });

        task.await
            .map_err(|e| TranscribeError::Inference(format!("inference task failed: {}", e)))?
    }

    /// Resolve the engine while the slot lock is held, performing at most
    /// one load attempt.
    ///
    /// `entered` is the attempt counter observed before locking: if it has
    /// advanced by the time the lock is ours, some other caller's attempt
    /// completed while we waited and we adopt its outcome.
    async fn load_locked(
        &self,
        slot: &mut OwnedMutexGuard<Slot>,
        entered: u64,
    ) -> Result<Arc<dyn Transcriber>, LoadError> {
        if let Some(engine) = &slot.engine {
            return Ok(engine.clone());
        }

        if self.attempts.load(Ordering::Acquire) > entered {
            if let Some(msg) = &slot.last_error {
                return Err(LoadError::Init(msg.clone()));
            }
        }

        tracing::info!("Loading transcription engine");
        let factory = self.factory.clone();
        let loaded = tokio::task::spawn_blocking(move || factory())
            .await
            .map_err(|e| LoadError::Init(format!("model load task failed: {}", e)));
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match loaded {
            Ok(Ok(engine)) => {
                let engine: Arc<dyn Transcriber> = Arc::from(engine);
                slot.engine = Some(engine.clone());
                slot.last_error = None;
                Ok(engine)
            }
            Ok(Err(e)) | Err(e) => {
                tracing::error!("Engine load failed: {}", e);
                slot.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    struct FakeEngine {
        in_flight: Arc<AtomicBool>,
        overlapped: Arc<AtomicBool>,
    }

    impl Transcriber for FakeEngine {
        fn transcribe(
            &self,
            _samples: &[f32],
            _language: Option<&str>,
        ) -> Result<String, TranscribeError> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(30));
            self.in_flight.store(false, Ordering::SeqCst);
            Ok("ok".to_string())
        }
    }

    fn counting_host(
        loads: Arc<AtomicUsize>,
        fail: bool,
    ) -> ModelHost {
        let overlapped = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicBool::new(false));
        ModelHost::with_factory(Arc::new(move || {
            loads.fetch_add(1, Ordering::SeqCst);
            // Slow load so concurrent callers pile up on the lock
            std::thread::sleep(Duration::from_millis(50));
            if fail {
                Err(LoadError::Init("weights corrupt".to_string()))
            } else {
                Ok(Box::new(FakeEngine {
                    in_flight: in_flight.clone(),
                    overlapped: overlapped.clone(),
                }) as Box<dyn Transcriber>)
            }
        }))
    }

    #[tokio::test]
    async fn test_concurrent_ensure_loaded_runs_one_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let host = Arc::new(counting_host(loads.clone(), false));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let host = host.clone();
            tasks.push(tokio::spawn(async move { host.ensure_loaded().await }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(host.is_loaded().await);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failed_outcome() {
        let loads = Arc::new(AtomicUsize::new(0));
        let host = Arc::new(counting_host(loads.clone(), true));

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let host = host.clone();
            tasks.push(tokio::spawn(async move { host.ensure_loaded().await }));
        }
        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(err.to_string().contains("weights corrupt"));
        }

        // One underlying attempt served every concurrent caller
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(!host.is_loaded().await);
    }

    #[tokio::test]
    async fn test_fresh_call_after_failure_retries_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let host = counting_host(loads.clone(), true);

        assert!(host.ensure_loaded().await.is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        // A later trigger gets its own single attempt
        assert!(host.ensure_loaded().await.is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transcribe_loads_then_runs() {
        let loads = Arc::new(AtomicUsize::new(0));
        let host = counting_host(loads.clone(), false);

        let text = host.transcribe(vec![0.0; 1600], None).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        // Second call reuses the loaded engine
        let _ = host.transcribe(vec![0.0; 1600], None).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transcribe_wraps_load_failure() {
        let loads = Arc::new(AtomicUsize::new(0));
        let host = counting_host(loads.clone(), true);

        let err = host.transcribe(vec![0.0; 1600], None).await.unwrap_err();
        assert!(matches!(err, TranscribeError::Load(_)));
    }

    #[tokio::test]
    async fn test_inference_is_serialized() {
        let overlapped = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicBool::new(false));
        let overlapped_f = overlapped.clone();
        let in_flight_f = in_flight.clone();

        let host = Arc::new(ModelHost::with_factory(Arc::new(move || {
            Ok(Box::new(FakeEngine {
                in_flight: in_flight_f.clone(),
                overlapped: overlapped_f.clone(),
            }) as Box<dyn Transcriber>)
        })));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let host = host.clone();
            tasks.push(tokio::spawn(async move {
                host.transcribe(vec![0.0; 160], None).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert!(!overlapped.load(Ordering::SeqCst));
    }
}
