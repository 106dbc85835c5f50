//! The engine capability contract and its three variants.
//!
//! Native libraries plug in through small backend traits ([`BatchBackend`],
//! [`StreamingBackend`], [`PlatformRecognizer`]). Each backend is wrapped by a
//! variant type that owns the load/cancel/release discipline shared by all
//! backends of that shape, and [`Engine`] closes the set so callers dispatch
//! on the variant tag.
//!
//! Loading never leaves a half-initialized engine behind: a failed or
//! cancelled load releases whatever the backend acquired before returning.
//! `release` is idempotent for every variant.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::types::{TranscribeOptions, TranscriptionResult};

/// Canonical samples a streaming backend receives per step. Cancellation is
/// checked between steps.
pub const STREAM_STEP_SAMPLES: usize = 4_000;

/// A backend that transcribes a complete canonical buffer in one call.
pub trait BatchBackend: Send {
    fn name(&self) -> &'static str;

    /// Acquires the native model resource from `model_path`.
    fn load(&mut self, model_path: &Path) -> Result<(), EngineError>;

    /// Transcribes canonical samples. Only called while loaded.
    fn transcribe(
        &mut self,
        samples: &[f32],
        options: &TranscribeOptions,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionResult, EngineError>;

    /// Frees the native model resource. Must tolerate being called when
    /// nothing is loaded.
    fn release(&mut self);
}

/// What a streaming backend reports after accepting audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Nothing new to report.
    Pending,
    /// The running hypothesis for the current utterance.
    Partial(String),
    /// The backend reached an utterance boundary; this text is settled.
    Final(String),
}

/// A backend that consumes audio incrementally and reports revisable
/// hypotheses until it settles on an utterance.
pub trait StreamingBackend: Send {
    fn name(&self) -> &'static str;

    fn load(&mut self, model_path: &Path) -> Result<(), EngineError>;

    /// Feeds canonical samples for the current utterance.
    fn accept(&mut self, samples: &[f32]) -> Result<StreamEvent, EngineError>;

    /// Signals end of input and returns whatever text was still pending.
    fn finish(&mut self) -> Result<Option<String>, EngineError>;

    /// Drops any buffered audio so the next utterance starts clean.
    fn reset(&mut self);

    fn release(&mut self);
}

/// A recognizer provided by the operating system.
///
/// These recognizers listen on a live input device themselves; they cannot be
/// handed arbitrary sample buffers. The engine only uses the length of the
/// supplied audio as the listening window, so pre-recorded files are not
/// transcribed reliably.
pub trait PlatformRecognizer: Send {
    fn name(&self) -> &'static str;

    /// Acquires the platform recognizer for `language`.
    fn acquire(&mut self, language: Option<&str>) -> Result<(), EngineError>;

    /// Listens on the platform's input device for up to `window` and returns
    /// the recognized text.
    fn listen(
        &mut self,
        window: Duration,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError>;

    fn release(&mut self);
}

/// Shared load discipline: cancellation checkpoints before and after
/// acquisition. Callers release the backend when this returns an error.
fn guarded_load(
    cancel: &CancellationToken,
    acquire: impl FnOnce() -> Result<(), EngineError>,
) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    acquire()?;
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

/// Engine variant for backends that process a full buffer per call.
pub struct BatchEngine {
    backend: Box<dyn BatchBackend>,
    loaded: bool,
}

impl BatchEngine {
    pub fn new(backend: Box<dyn BatchBackend>) -> Self {
        Self {
            backend,
            loaded: false,
        }
    }

    pub fn load(&mut self, model_path: &Path, cancel: &CancellationToken) -> Result<(), EngineError> {
        self.release();
        let result = guarded_load(cancel, || self.backend.load(model_path));
        if result.is_err() {
            self.backend.release();
        }
        self.loaded = result.is_ok();
        result
    }

    pub fn transcribe(
        &mut self,
        samples: &[f32],
        options: &TranscribeOptions,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionResult, EngineError> {
        if !self.loaded {
            return Err(EngineError::NotLoaded);
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let started = Instant::now();
        let mut result = self.backend.transcribe(samples, options, cancel)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        result.inference_time_ms = elapsed_ms(started);
        result.is_final = true;
        Ok(result)
    }

    pub fn release(&mut self) {
        if self.loaded {
            log::debug!("Releasing {} model", self.backend.name());
        }
        self.backend.release();
        self.loaded = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }
}

/// Engine variant for backends that emit partial results while audio
/// arrives.
pub struct StreamingEngine {
    backend: Box<dyn StreamingBackend>,
    loaded: bool,
    language: Option<String>,
}

impl StreamingEngine {
    pub fn new(backend: Box<dyn StreamingBackend>) -> Self {
        Self {
            backend,
            loaded: false,
            language: None,
        }
    }

    pub fn load(&mut self, model_path: &Path, cancel: &CancellationToken) -> Result<(), EngineError> {
        self.release();
        let result = guarded_load(cancel, || self.backend.load(model_path));
        if result.is_err() {
            self.backend.release();
        }
        self.loaded = result.is_ok();
        result
    }

    /// Feeds a chunk of canonical audio and returns the results it produced:
    /// every utterance that settled, followed by the latest hypothesis if one
    /// is still open.
    pub fn accept_chunk(
        &mut self,
        samples: &[f32],
        options: &TranscribeOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranscriptionResult>, EngineError> {
        if !self.loaded {
            return Err(EngineError::NotLoaded);
        }
        self.language = options.language.clone();

        let started = Instant::now();
        let mut results = Vec::new();
        let mut hypothesis = None;
        for step in samples.chunks(STREAM_STEP_SAMPLES) {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match self.backend.accept(step)? {
                StreamEvent::Pending => {}
                StreamEvent::Partial(text) => hypothesis = Some(text),
                StreamEvent::Final(text) => {
                    hypothesis = None;
                    results.push(TranscriptionResult::final_text(text));
                }
            }
        }
        results.extend(hypothesis.map(TranscriptionResult::partial));

        let inference_time_ms = elapsed_ms(started);
        Ok(results
            .into_iter()
            .map(|mut result| {
                result.inference_time_ms = inference_time_ms;
                result.with_language(self.language.clone())
            })
            .collect())
    }

    /// Ends the current utterance and returns its settled text, if any.
    pub fn finish_stream(&mut self) -> Result<Option<TranscriptionResult>, EngineError> {
        if !self.loaded {
            return Err(EngineError::NotLoaded);
        }
        let pending = self.backend.finish();
        self.backend.reset();
        Ok(pending?
            .filter(|text| !text.trim().is_empty())
            .map(|text| TranscriptionResult::final_text(text).with_language(self.language.clone())))
    }

    /// Runs a complete buffer through the stream and joins every settled
    /// utterance into one final result.
    pub fn transcribe(
        &mut self,
        samples: &[f32],
        options: &TranscribeOptions,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionResult, EngineError> {
        if !self.loaded {
            return Err(EngineError::NotLoaded);
        }
        self.backend.reset();

        let started = Instant::now();
        let outcome = self.accept_chunk(samples, options, cancel);
        let results = match outcome {
            Ok(results) => results,
            Err(err) => {
                self.backend.reset();
                return Err(err);
            }
        };
        let tail = self.finish_stream()?;

        let text = results
            .iter()
            .filter(|result| result.is_final)
            .chain(tail.iter())
            .map(|result| result.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let mut result =
            TranscriptionResult::final_text(text).with_language(options.language.clone());
        result.inference_time_ms = elapsed_ms(started);
        Ok(result)
    }

    pub fn release(&mut self) {
        if self.loaded {
            self.backend.reset();
            log::debug!("Releasing {} model", self.backend.name());
        }
        self.backend.release();
        self.loaded = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }
}

/// Engine variant backed by the operating system's recognizer.
///
/// From the caller's point of view it behaves like a batch engine, one call
/// and one result, but the recognizer listens on the live input device for
/// as long as the supplied audio lasts instead of reading the samples.
pub struct SystemEngine {
    recognizer: Box<dyn PlatformRecognizer>,
    loaded: bool,
    language: Option<String>,
}

impl SystemEngine {
    pub fn new(recognizer: Box<dyn PlatformRecognizer>) -> Self {
        Self {
            recognizer,
            loaded: false,
            language: None,
        }
    }

    /// Sets the language the recognizer is acquired for on the next load.
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn load(&mut self, _model_path: &Path, cancel: &CancellationToken) -> Result<(), EngineError> {
        self.release();
        let language = self.language.clone();
        let result = guarded_load(cancel, || self.recognizer.acquire(language.as_deref()));
        if result.is_err() {
            self.recognizer.release();
        }
        self.loaded = result.is_ok();
        result
    }

    pub fn transcribe(
        &mut self,
        samples: &[f32],
        options: &TranscribeOptions,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionResult, EngineError> {
        if !self.loaded {
            return Err(EngineError::NotLoaded);
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let window =
            Duration::from_secs_f64(samples.len() as f64 / crate::CANONICAL_SAMPLE_RATE as f64);
        log::warn!(
            "{} listens on the live input device; the supplied {:.1}s of audio only sets the listening window",
            self.recognizer.name(),
            window.as_secs_f64()
        );

        let started = Instant::now();
        let text = self
            .recognizer
            .listen(window, options.language.as_deref(), cancel)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut result =
            TranscriptionResult::final_text(text).with_language(options.language.clone());
        result.inference_time_ms = elapsed_ms(started);
        Ok(result)
    }

    pub fn release(&mut self) {
        self.recognizer.release();
        self.loaded = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn name(&self) -> &'static str {
        self.recognizer.name()
    }
}

/// The closed set of engine variants.
pub enum Engine {
    Batch(BatchEngine),
    Streaming(StreamingEngine),
    System(SystemEngine),
}

impl Engine {
    pub fn batch(backend: impl BatchBackend + 'static) -> Self {
        Engine::Batch(BatchEngine::new(Box::new(backend)))
    }

    pub fn streaming(backend: impl StreamingBackend + 'static) -> Self {
        Engine::Streaming(StreamingEngine::new(Box::new(backend)))
    }

    pub fn system(recognizer: impl PlatformRecognizer + 'static) -> Self {
        Engine::System(SystemEngine::new(Box::new(recognizer)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Engine::Batch(engine) => engine.name(),
            Engine::Streaming(engine) => engine.name(),
            Engine::System(engine) => engine.name(),
        }
    }

    pub fn load(&mut self, model_path: &Path, cancel: &CancellationToken) -> Result<(), EngineError> {
        match self {
            Engine::Batch(engine) => engine.load(model_path, cancel),
            Engine::Streaming(engine) => engine.load(model_path, cancel),
            Engine::System(engine) => engine.load(model_path, cancel),
        }
    }

    pub fn transcribe(
        &mut self,
        samples: &[f32],
        options: &TranscribeOptions,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionResult, EngineError> {
        match self {
            Engine::Batch(engine) => engine.transcribe(samples, options, cancel),
            Engine::Streaming(engine) => engine.transcribe(samples, options, cancel),
            Engine::System(engine) => engine.transcribe(samples, options, cancel),
        }
    }

    pub fn accept_chunk(
        &mut self,
        samples: &[f32],
        options: &TranscribeOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranscriptionResult>, EngineError> {
        match self {
            Engine::Streaming(engine) => engine.accept_chunk(samples, options, cancel),
            Engine::Batch(_) => Err(EngineError::Unsupported("batch")),
            Engine::System(_) => Err(EngineError::Unsupported("system")),
        }
    }

    pub fn finish_stream(&mut self) -> Result<Option<TranscriptionResult>, EngineError> {
        match self {
            Engine::Streaming(engine) => engine.finish_stream(),
            Engine::Batch(_) => Err(EngineError::Unsupported("batch")),
            Engine::System(_) => Err(EngineError::Unsupported("system")),
        }
    }

    pub fn release(&mut self) {
        match self {
            Engine::Batch(engine) => engine.release(),
            Engine::Streaming(engine) => engine.release(),
            Engine::System(engine) => engine.release(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        match self {
            Engine::Batch(engine) => engine.is_loaded(),
            Engine::Streaming(engine) => engine.is_loaded(),
            Engine::System(engine) => engine.is_loaded(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Engine::Streaming(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBatch, FakeRecognizer, FakeStream};

    fn path() -> &'static Path {
        Path::new("/models/fake")
    }

    #[test]
    fn batch_load_then_transcribe() {
        let mut engine = Engine::batch(FakeBatch::new("hello there"));
        let cancel = CancellationToken::new();
        engine.load(path(), &cancel).unwrap();
        assert!(engine.is_loaded());
        assert!(!engine.is_streaming());

        let result = engine
            .transcribe(&[0.1; 1600], &TranscribeOptions::default(), &cancel)
            .unwrap();
        assert_eq!(result.text, "hello there");
        assert!(result.is_final);
    }

    #[test]
    fn transcribe_while_unloaded_is_rejected() {
        let mut engine = Engine::batch(FakeBatch::new("unused"));
        let err = engine
            .transcribe(&[0.0; 10], &TranscribeOptions::default(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotLoaded));
    }

    #[test]
    fn failed_load_releases_partial_resources() {
        let backend = FakeBatch::new("unused").failing_load();
        let releases = backend.release_counter();
        let mut engine = Engine::batch(backend);

        let err = engine.load(path(), &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, EngineError::Load(_)));
        assert!(!engine.is_loaded());
        assert!(releases.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    }

    #[test]
    fn cancelled_load_never_reports_loaded() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut engine = Engine::batch(FakeBatch::new("unused"));
        let err = engine.load(path(), &cancel).unwrap_err();
        assert!(err.is_cancelled());
        assert!(!engine.is_loaded());
    }

    #[test]
    fn release_is_idempotent() {
        let mut engine = Engine::streaming(FakeStream::scripted(vec![]));
        engine.release();
        engine.release();
        assert!(!engine.is_loaded());

        engine.load(path(), &CancellationToken::new()).unwrap();
        engine.release();
        engine.release();
        assert!(!engine.is_loaded());
    }

    #[test]
    fn streaming_chunk_reports_finals_then_open_hypothesis() {
        let mut engine = Engine::streaming(FakeStream::scripted(vec![
            StreamEvent::Partial("good".into()),
            StreamEvent::Final("good morning".into()),
            StreamEvent::Partial("every".into()),
        ]));
        let cancel = CancellationToken::new();
        engine.load(path(), &cancel).unwrap();
        assert!(engine.is_streaming());

        let samples = vec![0.2; STREAM_STEP_SAMPLES * 3];
        let results = engine
            .accept_chunk(&samples, &TranscribeOptions::default(), &cancel)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_final);
        assert_eq!(results[0].text, "good morning");
        assert!(!results[1].is_final);
        assert_eq!(results[1].text, "every");
    }

    #[test]
    fn streaming_transcribe_joins_settled_utterances() {
        let mut engine = Engine::streaming(
            FakeStream::scripted(vec![
                StreamEvent::Final("first part".into()),
                StreamEvent::Partial("sec".into()),
            ])
            .with_tail("second part"),
        );
        let cancel = CancellationToken::new();
        engine.load(path(), &cancel).unwrap();

        let samples = vec![0.2; STREAM_STEP_SAMPLES * 2];
        let result = engine
            .transcribe(&samples, &TranscribeOptions::default(), &cancel)
            .unwrap();
        assert_eq!(result.text, "first part second part");
        assert!(result.is_final);
    }

    #[test]
    fn batch_engines_reject_streaming_calls() {
        let mut engine = Engine::batch(FakeBatch::new("x"));
        engine.load(path(), &CancellationToken::new()).unwrap();
        let err = engine
            .accept_chunk(&[0.0; 4], &TranscribeOptions::default(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Unsupported("batch")));
    }

    #[test]
    fn system_engine_listens_for_the_buffer_duration() {
        let recognizer = FakeRecognizer::new("dictated words");
        let windows = recognizer.windows();
        let mut engine = Engine::system(recognizer);
        let cancel = CancellationToken::new();
        engine.load(path(), &cancel).unwrap();

        let result = engine
            .transcribe(&vec![0.0; 32_000], &TranscribeOptions::default(), &cancel)
            .unwrap();
        assert_eq!(result.text, "dictated words");
        let windows = windows.lock().unwrap();
        assert_eq!(windows.as_slice(), &[Duration::from_secs(2)]);
    }

    #[test]
    fn unavailable_platform_recognizer_fails_to_load() {
        let mut engine = Engine::system(crate::system::UnavailableRecognizer);
        let err = engine.load(path(), &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
        assert!(!engine.is_loaded());
    }
}
