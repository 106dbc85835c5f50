use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::{TranscribeOptions, TranscriptionResult};

/// Exclusive owner of one engine and its native resource.
///
/// Native backends are not reentrant, so every operation takes the same lock
/// and runs on tokio's blocking pool. A second caller waits for the first to
/// finish instead of entering the backend concurrently. The handle is not
/// `Clone`; whoever holds it is the only one who can drive the engine.
pub struct EngineHandle {
    engine: Arc<Mutex<Engine>>,
    name: &'static str,
    streaming: bool,
}

impl EngineHandle {
    pub fn new(engine: Engine) -> Self {
        Self {
            name: engine.name(),
            streaming: engine.is_streaming(),
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Runs `operation` on the blocking pool while holding the engine lock.
    async fn run_exclusive<T, F>(&self, operation: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine) -> Result<T, EngineError> + Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || {
            let mut engine = engine.lock().map_err(|_| EngineError::Poisoned)?;
            operation(&mut engine)
        })
        .await?
    }

    pub async fn load(&self, model_path: PathBuf, cancel: CancellationToken) -> Result<(), EngineError> {
        self.run_exclusive(move |engine| engine.load(&model_path, &cancel))
            .await
    }

    pub async fn transcribe(
        &self,
        samples: Vec<f32>,
        options: TranscribeOptions,
        cancel: CancellationToken,
    ) -> Result<TranscriptionResult, EngineError> {
        self.run_exclusive(move |engine| engine.transcribe(&samples, &options, &cancel))
            .await
    }

    pub async fn accept_chunk(
        &self,
        samples: Vec<f32>,
        options: TranscribeOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<TranscriptionResult>, EngineError> {
        self.run_exclusive(move |engine| engine.accept_chunk(&samples, &options, &cancel))
            .await
    }

    pub async fn finish_stream(&self) -> Result<Option<TranscriptionResult>, EngineError> {
        self.run_exclusive(|engine| engine.finish_stream()).await
    }

    pub async fn is_loaded(&self) -> bool {
        self.run_exclusive(|engine| Ok(engine.is_loaded()))
            .await
            .unwrap_or(false)
    }

    pub async fn release(&self) -> Result<(), EngineError> {
        self.run_exclusive(|engine| {
            engine.release();
            Ok(())
        })
        .await
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        // An operation still running on the blocking pool keeps the engine
        // alive; its backend frees the native resource when that task ends.
        match self.engine.try_lock() {
            Ok(mut engine) => engine.release(),
            Err(_) => log::debug!("{} busy during teardown, deferring release", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::FakeBatch;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transcribes_never_overlap() {
        let backend = FakeBatch::new("overlap").with_transcribe_delay(Duration::from_millis(30));
        let probe = backend.probe();
        let handle = EngineHandle::new(Engine::batch(backend));
        handle
            .load(PathBuf::from("/models/fake"), CancellationToken::new())
            .await
            .unwrap();

        let transcribe = || {
            handle.transcribe(vec![0.3; 800], TranscribeOptions::default(), CancellationToken::new())
        };
        let (first, second, third, fourth) =
            tokio::join!(transcribe(), transcribe(), transcribe(), transcribe());
        for result in [first, second, third, fourth] {
            assert_eq!(result.unwrap().text, "overlap");
        }
        assert_eq!(probe.peak(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn transcribe_waits_for_an_inflight_load() {
        let backend = FakeBatch::new("after load").with_load_delay(Duration::from_millis(100));
        let probe = backend.probe();
        let handle = EngineHandle::new(Engine::batch(backend));

        let (loaded, transcribed) = tokio::join!(
            handle.load(PathBuf::from("/models/fake"), CancellationToken::new()),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                handle
                    .transcribe(vec![0.3; 800], TranscribeOptions::default(), CancellationToken::new())
                    .await
            }
        );
        loaded.unwrap();
        assert_eq!(transcribed.unwrap().text, "after load");
        assert_eq!(probe.peak(), 1);
    }

    #[tokio::test]
    async fn cancelled_load_leaves_engine_unloaded() {
        let handle = EngineHandle::new(Engine::batch(FakeBatch::new("never")));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = handle
            .load(PathBuf::from("/models/fake"), cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!handle.is_loaded().await);
    }

    #[tokio::test]
    async fn dropping_the_handle_releases_the_engine() {
        let backend = FakeBatch::new("bye");
        let releases = backend.release_counter();
        let handle = EngineHandle::new(Engine::batch(backend));
        handle
            .load(PathBuf::from("/models/fake"), CancellationToken::new())
            .await
            .unwrap();

        let before = releases.load(std::sync::atomic::Ordering::SeqCst);
        drop(handle);
        assert_eq!(releases.load(std::sync::atomic::Ordering::SeqCst), before + 1);
    }
}
