//! The transcription session.
//!
//! A session owns at most one loaded engine, runs the model and capture
//! state machines, and folds every engine result into one live transcript.
//! All of its operations are safe to call at any time: a call that does not
//! fit the current state is logged and ignored instead of failing.
//!
//! Locking is split in four:
//! - a short-lived `std` mutex for the published state and transcript, never
//!   held across an `.await`;
//! - an async mutex around the engine slot, held for the duration of each
//!   engine call so loading, releasing and transcribing queue up behind each
//!   other;
//! - a load gate that serializes whole model selections, so only one load is
//!   ever in flight;
//! - a translation lane, so the translator sees one call at a time.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use murmur_audio::mixer::StereoWeights;
use murmur_audio::normalizer::{self, StreamNormalizer};
use murmur_audio::{AudioFormat, TARGET_SAMPLE_RATE, waveform};
use murmur_bridge::MessageFromBackend;
use murmur_bridge::config::Config;
use murmur_bridge::model_catalog::{EngineKind, ModelDescriptor};
use murmur_bridge::notification::NotificationType;
use murmur_bridge::session::{ModelState, SessionState, TranscriptRecord};
use murmur_speech::{
    Engine, EngineHandle, TranscribeOptions, Transcript, TranscriptChange, TranscriptionResult,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::collaborators::Collaborators;
use crate::publisher::Publisher;

/// Captured chunks waiting to be normalized. When the queue is full the
/// capture source waits.
pub const CHUNK_QUEUE_CAPACITY: usize = 32;

/// Builds the engine a catalog model runs on.
pub type EngineFactory =
    Arc<dyn Fn(&ModelDescriptor, &TranscribeOptions) -> Engine + Send + Sync>;

/// Engine factory backed by the native backends compiled into this build.
pub fn native_engine(model: &ModelDescriptor, options: &TranscribeOptions) -> Engine {
    match model.engine {
        EngineKind::WhisperCpp => murmur_speech::whisper(),
        EngineKind::ParakeetOnnx => murmur_speech::parakeet(),
        EngineKind::VoskStreaming => murmur_speech::vosk(),
        EngineKind::SystemSpeech => murmur_speech::system_speech(options.language.clone()),
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub options: TranscribeOptions,
    pub weights: StereoWeights,
    pub resampler_block: u32,
    pub waveform_bars: usize,
    pub models_root: PathBuf,
    /// Target language of confirmed-text translation, when enabled.
    pub translate_to: Option<String>,
}

impl SessionSettings {
    pub fn from_config(config: &Config, models_root: PathBuf) -> Self {
        let transcription = &config.transcription;
        Self {
            options: TranscribeOptions::new(
                Some(transcription.num_threads),
                Some(&transcription.language),
            ),
            weights: StereoWeights {
                left: config.normalizer.left_weight,
                right: config.normalizer.right_weight,
            },
            resampler_block: config.normalizer.resampler_block_size,
            waveform_bars: transcription.waveform_bars,
            models_root,
            translate_to: config
                .translation
                .enabled
                .then(|| config.translation.target_language.clone()),
        }
    }
}

/// Sending half of a recording's chunk queue. Chunks are interleaved samples
/// in the format passed to [`TranscriptionSession::start_recording`].
#[derive(Debug, Clone)]
pub struct ChunkSender {
    tx: mpsc::Sender<Vec<f32>>,
}

impl ChunkSender {
    /// Queues a chunk, waiting while the queue is full. Returns `false` once
    /// the recording has ended.
    pub async fn send(&self, chunk: Vec<f32>) -> bool {
        self.tx.send(chunk).await.is_ok()
    }

    /// Blocking variant of [`send`](Self::send) for capture threads outside
    /// the runtime.
    pub fn blocking_send(&self, chunk: Vec<f32>) -> bool {
        self.tx.blocking_send(chunk).is_ok()
    }
}

struct Recording {
    stop: CancellationToken,
    pump: JoinHandle<()>,
}

/// Audio gathered by one recording.
struct Take {
    streaming: bool,
    /// Canonical audio kept for batch engines.
    audio: Vec<f32>,
    canonical_samples: usize,
    /// Length of confirmed text when the recording started.
    confirmed_offset: usize,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Shared {
    model_state: ModelState,
    session_state: SessionState,
    transcript: Transcript,
    translated: Option<String>,
    /// Confirmed length covered by `translated`.
    translated_len: usize,
    /// Bumped on clear so translations of cleared text are discarded.
    generation: u64,
    prepared_pair: Option<(String, String)>,
    recording: Option<Recording>,
    /// Whether the loaded engine consumes audio as it arrives.
    streaming: bool,
}

pub struct TranscriptionSession {
    shared: Mutex<Shared>,
    engine: tokio::sync::Mutex<Option<EngineHandle>>,
    load_gate: tokio::sync::Mutex<()>,
    load_cancel: Mutex<Option<CancellationToken>>,
    translation_lane: tokio::sync::Mutex<()>,
    settings: SessionSettings,
    factory: EngineFactory,
    publisher: Publisher,
    collaborators: Collaborators,
    shutdown: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TranscriptionSession {
    pub fn new(
        settings: SessionSettings,
        publisher: Publisher,
        factory: EngineFactory,
        collaborators: Collaborators,
    ) -> Arc<Self> {
        Arc::new(Self {
            shared: Mutex::default(),
            engine: tokio::sync::Mutex::new(None),
            load_gate: tokio::sync::Mutex::new(()),
            load_cancel: Mutex::new(None),
            translation_lane: tokio::sync::Mutex::new(()),
            settings,
            factory,
            publisher,
            collaborators,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn model_state(&self) -> ModelState {
        lock(&self.shared).model_state.clone()
    }

    pub fn session_state(&self) -> SessionState {
        lock(&self.shared).session_state
    }

    pub fn transcript(&self) -> Transcript {
        lock(&self.shared).transcript.clone()
    }

    pub fn translated(&self) -> Option<String> {
        lock(&self.shared).translated.clone()
    }

    async fn set_model_state(&self, state: ModelState) {
        let previous = std::mem::replace(&mut lock(&self.shared).model_state, state.clone());
        if previous != state {
            log::info!("Model state {previous:?} -> {state:?}");
            self.publisher
                .publish(MessageFromBackend::ModelStateChanged(state))
                .await;
        }
    }

    async fn set_session_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut lock(&self.shared).session_state, state);
        if previous != state {
            self.announce_session_state(previous, state).await;
        }
    }

    async fn announce_session_state(&self, previous: SessionState, state: SessionState) {
        log::info!("Session state {previous:?} -> {state:?}");
        self.publisher
            .publish(MessageFromBackend::SessionStateChanged(state))
            .await;
    }

    /// Releases any loaded model, then loads `model`. Selecting the model that
    /// is already loaded keeps it and announces it again.
    ///
    /// Selections are serialized; a second call waits for the first to
    /// finish. Returns whether the model ended up loaded. A cancelled load
    /// leaves the model `Unloaded`, a failed one `Failed`.
    pub async fn select_and_load_model(
        &self,
        model: &'static ModelDescriptor,
        cancel: CancellationToken,
    ) -> bool {
        let _gate = self.load_gate.lock().await;

        let session_state = self.session_state();
        if session_state != SessionState::Idle {
            log::warn!("Ignoring selection of {} while {session_state:?}", model.id);
            return false;
        }
        if let ModelState::Loaded { model_id } = self.model_state()
            && model_id == model.id
        {
            log::info!("{model_id} is already loaded");
            self.publisher
                .publish(MessageFromBackend::ModelStateChanged(ModelState::Loaded { model_id }))
                .await;
            return true;
        }

        *lock(&self.load_cancel) = Some(cancel.clone());
        let loaded = self.load_exclusive(model, cancel).await;
        *lock(&self.load_cancel) = None;
        loaded
    }

    async fn load_exclusive(&self, model: &'static ModelDescriptor, cancel: CancellationToken) -> bool {
        let mut slot = self.engine.lock().await;
        if let Some(previous) = slot.take() {
            log::info!("Releasing {} before loading {}", previous.name(), model.id);
            if let Err(err) = previous.release().await {
                log::warn!("Failed to release {}: {err}", previous.name());
            }
            self.set_model_state(ModelState::Unloaded).await;
        }

        let model_id = model.id.to_string();
        self.set_model_state(ModelState::Loading {
            model_id: model_id.clone(),
        })
        .await;

        let models_root = &self.settings.models_root;
        if !model.is_downloaded(models_root) {
            let reason = format!(
                "model files are missing from {}",
                model.model_dir(models_root).display()
            );
            self.fail_load(model_id, reason).await;
            return false;
        }

        let handle = EngineHandle::new((self.factory)(model, &self.settings.options));
        match handle.load(model.load_path(models_root), cancel).await {
            Ok(()) => {
                log::info!("Loaded {} on {}", model.id, handle.name());
                lock(&self.shared).streaming = handle.is_streaming();
                *slot = Some(handle);
                self.set_model_state(ModelState::Loaded { model_id }).await;
                true
            }
            Err(err) if err.is_cancelled() => {
                log::info!("Loading {} was cancelled", model.id);
                self.set_model_state(ModelState::Unloaded).await;
                false
            }
            Err(err) => {
                self.fail_load(model_id, err.to_string()).await;
                false
            }
        }
    }

    async fn fail_load(&self, model_id: String, reason: String) {
        log::error!("Failed to load {model_id}: {reason}");
        self.publisher
            .notify(
                NotificationType::Error,
                format!("Could not load {model_id}: {reason}"),
            )
            .await;
        self.set_model_state(ModelState::Failed { model_id, reason })
            .await;
    }

    /// Cancels the model load in flight, if any.
    pub fn cancel_model_load(&self) -> bool {
        match lock(&self.load_cancel).take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops the loaded model. Calling it with nothing loaded does nothing.
    pub async fn release_model(&self) {
        let session_state = self.session_state();
        if session_state != SessionState::Idle {
            log::warn!("Ignoring model release while {session_state:?}");
            return;
        }

        let mut slot = self.engine.lock().await;
        if let Some(handle) = slot.take() {
            if let Err(err) = handle.release().await {
                log::warn!("Failed to release {}: {err}", handle.name());
            }
        }
        drop(slot);

        if self.model_state() != ModelState::Unloaded {
            self.set_model_state(ModelState::Unloaded).await;
        }
    }

    /// Starts a recording of audio in `format`.
    ///
    /// Returns the queue to push captured chunks into, or `None` when no
    /// model is loaded, a recording is already running, or the format cannot
    /// be normalized.
    pub async fn start_recording(self: &Arc<Self>, format: AudioFormat) -> Option<ChunkSender> {
        if !self.model_state().is_loaded() {
            log::warn!("Ignoring recording start without a loaded model");
            return None;
        }

        let normalizer = match StreamNormalizer::new(
            format,
            self.settings.weights,
            self.settings.resampler_block,
        ) {
            Ok(normalizer) => normalizer,
            Err(err) => {
                log::warn!("Cannot record {format}: {err}");
                self.publisher
                    .notify(NotificationType::Warning, format!("Unsupported input format: {err}"))
                    .await;
                return None;
            }
        };

        let (tx, rx) = mpsc::channel(CHUNK_QUEUE_CAPACITY);
        {
            let mut shared = lock(&self.shared);
            if !shared.model_state.is_loaded() || shared.session_state != SessionState::Idle {
                log::warn!(
                    "Ignoring recording start while {:?} / {:?}",
                    shared.model_state,
                    shared.session_state
                );
                return None;
            }
            shared.session_state = SessionState::Recording;
            let streaming = shared.streaming;

            let stop = CancellationToken::new();
            let take = Take {
                streaming,
                audio: Vec::new(),
                canonical_samples: 0,
                confirmed_offset: shared.transcript.confirmed().len(),
                cancel: self.shutdown.child_token(),
            };
            let pump = tokio::spawn(self.clone().pump(rx, normalizer, stop.clone(), take));
            shared.recording = Some(Recording { stop, pump });
        }
        log::info!("Recording {format}");
        self.announce_session_state(SessionState::Idle, SessionState::Recording)
            .await;

        Some(ChunkSender { tx })
    }

    /// Ends the running recording and waits until its audio is transcribed.
    pub async fn stop_recording(&self) {
        let recording = lock(&self.shared).recording.take();
        let Some(recording) = recording else {
            log::warn!("Ignoring recording stop without a recording");
            return;
        };

        recording.stop.cancel();
        if let Err(err) = recording.pump.await {
            log::error!("Recording task failed: {err}");
            self.set_session_state(SessionState::Idle).await;
        }
    }

    /// Drains the chunk queue of one recording until it is stopped or every
    /// sender is gone, then finalizes the transcript.
    async fn pump(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<Vec<f32>>,
        mut normalizer: StreamNormalizer,
        stop: CancellationToken,
        mut take: Take,
    ) {
        loop {
            let chunk = tokio::select! {
                biased;
                _ = stop.cancelled() => None,
                chunk = rx.recv() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let canonical = normalizer.push(&chunk);
            self.feed(canonical, &mut take).await;
        }

        // whatever was queued before the stop still belongs to the recording
        rx.close();
        while let Some(chunk) = rx.recv().await {
            let canonical = normalizer.push(&chunk);
            self.feed(canonical, &mut take).await;
        }
        let tail = normalizer.finish();
        self.feed(tail, &mut take).await;

        if take.streaming {
            self.finish_streaming(take).await;
        } else {
            self.finish_batch(take).await;
        }
    }

    async fn feed(self: &Arc<Self>, canonical: Vec<f32>, take: &mut Take) {
        if canonical.is_empty() {
            return;
        }
        take.canonical_samples += canonical.len();
        self.publish_waveform(&canonical).await;

        if !take.streaming {
            take.audio.extend_from_slice(&canonical);
            return;
        }

        let results = {
            let slot = self.engine.lock().await;
            let Some(handle) = slot.as_ref() else {
                log::warn!("Engine disappeared during a recording");
                return;
            };
            handle
                .accept_chunk(canonical, self.settings.options.clone(), take.cancel.clone())
                .await
        };
        match results {
            Ok(results) => {
                for result in &results {
                    self.fold(result).await;
                }
            }
            Err(err) if err.is_cancelled() => {}
            Err(err) => log::warn!("Dropping streamed chunk: {err}"),
        }
    }

    async fn finish_streaming(self: &Arc<Self>, take: Take) {
        let tail = {
            let slot = self.engine.lock().await;
            match slot.as_ref() {
                Some(handle) => handle.finish_stream().await,
                None => Ok(None),
            }
        };
        match tail {
            Ok(Some(result)) => self.fold(&result).await,
            Ok(None) => {}
            Err(err) => log::warn!("Failed to finish the stream: {err}"),
        }

        let (change, update, text) = {
            let mut shared = lock(&self.shared);
            let change = shared.transcript.commit_hypothesis();
            let confirmed = shared.transcript.confirmed();
            let text = confirmed
                .get(take.confirmed_offset..)
                .unwrap_or(confirmed)
                .trim()
                .to_string();
            (change, transcript_update(&shared), text)
        };
        if change == TranscriptChange::Confirmed {
            self.publisher.publish(update).await;
            self.spawn_translation(None);
        }

        if !take.cancel.is_cancelled() {
            self.record(text, take.canonical_samples, self.settings.options.language.clone(), None)
                .await;
        }
        self.set_session_state(SessionState::Idle).await;
    }

    async fn finish_batch(self: &Arc<Self>, take: Take) {
        self.set_session_state(SessionState::Transcribing).await;

        if let Some(result) = self.run_transcribe(take.audio, take.cancel).await {
            self.fold(&result).await;
            self.record(
                result.text.clone(),
                take.canonical_samples,
                result.language.clone(),
                None,
            )
            .await;
        }
        self.set_session_state(SessionState::Idle).await;
    }

    /// Runs one batch transcription. Failures become an empty result;
    /// cancellation yields `None`.
    async fn run_transcribe(
        &self,
        canonical: Vec<f32>,
        cancel: CancellationToken,
    ) -> Option<TranscriptionResult> {
        let outcome = {
            let slot = self.engine.lock().await;
            let Some(handle) = slot.as_ref() else {
                log::warn!("Ignoring transcription without a loaded model");
                return None;
            };
            handle
                .transcribe(canonical, self.settings.options.clone(), cancel)
                .await
        };

        match outcome {
            Ok(result) => {
                log::info!(
                    "Transcribed {} characters in {}ms",
                    result.text.len(),
                    result.inference_time_ms
                );
                Some(result)
            }
            Err(err) if err.is_cancelled() => {
                log::info!("Transcription was cancelled");
                None
            }
            Err(err) => {
                log::warn!("Transcription failed: {err}");
                self.publisher
                    .notify(NotificationType::Warning, format!("Transcription failed: {err}"))
                    .await;
                Some(TranscriptionResult::empty().with_language(self.settings.options.language.clone()))
            }
        }
    }

    /// Normalizes and transcribes a complete buffer in one shot.
    ///
    /// Only runs while a model is loaded and no recording is active. Audio
    /// that cannot be normalized yields `None` and a warning notification.
    pub async fn transcribe_file(
        self: &Arc<Self>,
        samples: Vec<f32>,
        format: AudioFormat,
        audio_path: Option<PathBuf>,
    ) -> Option<TranscriptionResult> {
        {
            let shared = lock(&self.shared);
            if !shared.model_state.is_loaded() || shared.session_state != SessionState::Idle {
                log::warn!(
                    "Ignoring file transcription while {:?} / {:?}",
                    shared.model_state,
                    shared.session_state
                );
                return None;
            }
        }

        let weights = self.settings.weights;
        let block = self.settings.resampler_block;
        let canonical = tokio::task::spawn_blocking(move || {
            normalizer::try_normalize(&samples, format, weights, block)
        })
        .await;
        let canonical = match canonical {
            Ok(Ok(canonical)) => canonical,
            Ok(Err(err)) => {
                log::warn!("Could not normalize {format} audio: {err}");
                Vec::new()
            }
            Err(err) => {
                log::warn!("Normalization task failed: {err}");
                Vec::new()
            }
        };
        if canonical.is_empty() {
            self.publisher
                .notify(NotificationType::Warning, "The audio could not be decoded.")
                .await;
            return None;
        }

        self.publish_waveform(&canonical).await;
        let canonical_samples = canonical.len();
        let result = self
            .run_transcribe(canonical, self.shutdown.child_token())
            .await?;
        self.fold(&result).await;
        self.record(
            result.text.clone(),
            canonical_samples,
            result.language.clone(),
            audio_path,
        )
        .await;
        Some(result)
    }

    /// Empties the transcript. The model stays loaded.
    pub async fn clear_transcription(&self) {
        let update = {
            let mut shared = lock(&self.shared);
            shared.transcript.clear();
            shared.translated = None;
            shared.translated_len = 0;
            shared.generation += 1;
            transcript_update(&shared)
        };
        log::info!("Transcript cleared");
        self.publisher.publish(update).await;
    }

    async fn fold(self: &Arc<Self>, result: &TranscriptionResult) {
        let (change, update) = {
            let mut shared = lock(&self.shared);
            let change = shared.transcript.apply(result);
            (change, transcript_update(&shared))
        };
        if change == TranscriptChange::Unchanged {
            return;
        }
        self.publisher.publish(update).await;
        if change == TranscriptChange::Confirmed {
            self.spawn_translation(result.language.clone());
        }
    }

    async fn publish_waveform(&self, canonical: &[f32]) {
        if self.settings.waveform_bars == 0 {
            return;
        }
        let bars = waveform::magnitude_bars(canonical, self.settings.waveform_bars);
        self.publisher
            .publish(MessageFromBackend::WaveformUpdate(bars))
            .await;
    }

    /// Announces a finished recording or file. Only non-empty transcripts
    /// reach the sink.
    async fn record(
        &self,
        text: String,
        canonical_samples: usize,
        language: Option<String>,
        audio_path: Option<PathBuf>,
    ) {
        let model_id = self
            .model_state()
            .model_id()
            .unwrap_or_default()
            .to_string();
        let record = TranscriptRecord {
            text,
            duration_seconds: canonical_samples as f64 / TARGET_SAMPLE_RATE as f64,
            model_id,
            language,
            audio_path,
        };

        if let Some(sink) = self.collaborators.sink.clone()
            && !record.text.trim().is_empty()
        {
            let stored = record.clone();
            tokio::task::spawn_blocking(move || {
                if let Err(err) = sink.store(&stored) {
                    log::warn!("Failed to store transcript: {err}");
                }
            });
        }
        self.publisher
            .publish(MessageFromBackend::TranscriptionCompleted(record))
            .await;
    }

    /// Translates the confirmed text in the background, if a translator is
    /// installed and translation is enabled.
    ///
    /// Translations run one at a time. Each one picks up the confirmed text
    /// current when its turn comes, so a burst of finals collapses into few
    /// translator calls.
    fn spawn_translation(self: &Arc<Self>, language: Option<String>) {
        let (Some(target), Some(translator)) = (
            self.settings.translate_to.clone(),
            self.collaborators.translator.clone(),
        ) else {
            return;
        };
        let source = language
            .or_else(|| self.settings.options.language.clone())
            .unwrap_or_else(|| "auto".to_string());

        let session = self.clone();
        tokio::spawn(async move {
            let _turn = session.translation_lane.lock().await;
            let pair = (source.clone(), target.clone());
            let (text, generation, needs_prepare) = {
                let shared = lock(&session.shared);
                let text = shared.transcript.confirmed().to_string();
                if shared.translated.is_some() && shared.translated_len == text.len() {
                    return;
                }
                (
                    text,
                    shared.generation,
                    shared.prepared_pair.as_ref() != Some(&pair),
                )
            };

            if needs_prepare {
                let preparing = translator.clone();
                let (from, to) = pair.clone();
                let prepared =
                    tokio::task::spawn_blocking(move || preparing.prepare(&from, &to)).await;
                match prepared {
                    Ok(Ok(())) => lock(&session.shared).prepared_pair = Some(pair),
                    Ok(Err(err)) => {
                        log::warn!("Translation skipped: {err}");
                        return;
                    }
                    Err(err) => {
                        log::warn!("Translation task failed: {err}");
                        return;
                    }
                }
            }

            let translated_len = text.len();
            let outcome = tokio::task::spawn_blocking(move || {
                translator.translate(&text, &source, &target)
            })
            .await;
            let translated = match outcome {
                Ok(Ok(translated)) => translated,
                Ok(Err(err)) => {
                    log::warn!("Translation skipped: {err}");
                    return;
                }
                Err(err) => {
                    log::warn!("Translation task failed: {err}");
                    return;
                }
            };

            let update = {
                let mut shared = lock(&session.shared);
                if shared.generation != generation || shared.translated_len > translated_len {
                    return;
                }
                shared.translated = Some(translated);
                shared.translated_len = translated_len;
                transcript_update(&shared)
            };
            session.publisher.publish(update).await;
        });
    }
}

fn transcript_update(shared: &Shared) -> MessageFromBackend {
    MessageFromBackend::TranscriptUpdate {
        confirmed: shared.transcript.confirmed().to_string(),
        hypothesis: shared.transcript.hypothesis().to_string(),
        translated_confirmed: shared.translated.clone(),
    }
}

impl Drop for TranscriptionSession {
    fn drop(&mut self) {
        // the engine slot drops with the session and releases its handle
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use murmur_bridge::model_catalog;
    use murmur_speech::StreamEvent;
    use murmur_speech::testing::{ConcurrencyProbe, FakeBatch, FakeStream};
    use tokio::sync::mpsc::Receiver;

    use super::*;
    use crate::collaborators::{CollaboratorError, TranscriptSink, Translator};

    struct Fixture {
        session: Arc<TranscriptionSession>,
        rx: Receiver<MessageFromBackend>,
        _models: tempfile::TempDir,
    }

    fn install(model: &ModelDescriptor, models_root: &std::path::Path) {
        for (_, path) in model.file_paths(models_root) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, b"weights").unwrap();
        }
    }

    fn fixture_with(
        engine: impl Fn() -> Engine + Send + Sync + 'static,
        translate_to: Option<&str>,
        collaborators: Collaborators,
    ) -> Fixture {
        let models = tempfile::tempdir().unwrap();
        install(model_catalog::default_model(), models.path());
        let settings = SessionSettings {
            options: TranscribeOptions::new(Some(1), None),
            weights: StereoWeights::default(),
            resampler_block: 1024,
            waveform_bars: 8,
            models_root: models.path().to_path_buf(),
            translate_to: translate_to.map(str::to_string),
        };
        let (tx, rx) = mpsc::channel(1024);
        let factory: EngineFactory =
            Arc::new(move |_: &ModelDescriptor, _: &TranscribeOptions| engine());
        Fixture {
            session: TranscriptionSession::new(settings, Publisher::new(tx), factory, collaborators),
            rx,
            _models: models,
        }
    }

    fn fixture(engine: impl Fn() -> Engine + Send + Sync + 'static) -> Fixture {
        fixture_with(engine, None, Collaborators::default())
    }

    fn drain(rx: &mut Receiver<MessageFromBackend>) -> Vec<MessageFromBackend> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn model_states(messages: &[MessageFromBackend]) -> Vec<ModelState> {
        messages
            .iter()
            .filter_map(|message| match message {
                MessageFromBackend::ModelStateChanged(state) => Some(state.clone()),
                _ => None,
            })
            .collect()
    }

    fn session_states(messages: &[MessageFromBackend]) -> Vec<SessionState> {
        messages
            .iter()
            .filter_map(|message| match message {
                MessageFromBackend::SessionStateChanged(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn warnings(messages: &[MessageFromBackend]) -> usize {
        messages
            .iter()
            .filter(|message| {
                matches!(message, MessageFromBackend::NotificationMessage(notification)
                    if notification.notification_type == NotificationType::Warning)
            })
            .count()
    }

    fn tone(frames: usize, sample_rate: u32, channels: u16) -> Vec<f32> {
        (0..frames)
            .flat_map(|frame| {
                let t = frame as f32 / sample_rate as f32;
                let sample = 0.5 * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
                std::iter::repeat_n(sample, channels as usize)
            })
            .collect()
    }

    async fn load_default(session: &TranscriptionSession) {
        let loaded = session
            .select_and_load_model(model_catalog::default_model(), CancellationToken::new())
            .await;
        assert!(loaded);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn recording_needs_a_loaded_model() {
        let Fixture { session, _models, .. } = fixture(|| Engine::batch(FakeBatch::new("unused")));

        assert!(session.start_recording(AudioFormat::CANONICAL).await.is_none());
        assert_eq!(session.session_state(), SessionState::Idle);
        assert!(
            session
                .transcribe_file(tone(16_000, 16_000, 1), AudioFormat::CANONICAL, None)
                .await
                .is_none()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn release_is_idempotent() {
        let Fixture { session, mut rx, _models } = fixture(|| Engine::batch(FakeBatch::new("hi")));
        load_default(&session).await;

        session.release_model().await;
        session.release_model().await;

        assert_eq!(session.model_state(), ModelState::Unloaded);
        let model_id = model_catalog::DEFAULT_MODEL_ID.to_string();
        assert_eq!(
            model_states(&drain(&mut rx)),
            vec![
                ModelState::Loading { model_id: model_id.clone() },
                ModelState::Loaded { model_id },
                ModelState::Unloaded,
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reselecting_the_loaded_model_keeps_it() {
        let built = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = built.clone();
        let Fixture { session, mut rx, _models } = fixture(move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Engine::batch(FakeBatch::new("hi"))
        });

        load_default(&session).await;
        load_default(&session).await;

        assert_eq!(built.load(std::sync::atomic::Ordering::SeqCst), 1);
        let states = model_states(&drain(&mut rx));
        assert_eq!(states.len(), 3);
        assert!(states[1].is_loaded() && states[2].is_loaded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_model_files_fail_the_load() {
        let Fixture { session, _models, .. } = fixture(|| Engine::batch(FakeBatch::new("hi")));
        let tiny = model_catalog::find("whisper-tiny").unwrap();

        assert!(!session.select_and_load_model(tiny, CancellationToken::new()).await);
        assert!(matches!(session.model_state(), ModelState::Failed { .. }));

        // a retry with the files in place recovers
        load_default(&session).await;
        assert!(session.model_state().is_loaded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_load_ends_unloaded() {
        let Fixture { session, _models, .. } = fixture(|| {
            Engine::batch(FakeBatch::new("hi").with_load_delay(Duration::from_millis(200)))
        });

        let loading = session.clone();
        let task = tokio::spawn(async move {
            loading
                .select_and_load_model(model_catalog::default_model(), CancellationToken::new())
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.cancel_model_load());

        assert!(!task.await.unwrap());
        assert_eq!(session.model_state(), ModelState::Unloaded);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batch_recording_transcribes_on_stop() {
        let Fixture { session, mut rx, _models } =
            fixture(|| Engine::batch(FakeBatch::new("hello from murmur")));
        load_default(&session).await;
        drain(&mut rx);

        let format = AudioFormat::new(2, 48_000);
        let sender = session.start_recording(format).await.unwrap();
        assert!(session.start_recording(format).await.is_none());

        let mut audio = vec![0.0; 48_000 * 2];
        audio.extend(tone(4 * 48_000, 48_000, 2));
        for chunk in audio.chunks(4_800) {
            assert!(sender.send(chunk.to_vec()).await);
        }
        session.stop_recording().await;

        assert_eq!(session.transcript().confirmed(), "hello from murmur");
        assert_eq!(session.session_state(), SessionState::Idle);

        let messages = drain(&mut rx);
        assert_eq!(
            session_states(&messages),
            vec![SessionState::Recording, SessionState::Transcribing, SessionState::Idle]
        );
        let record = messages
            .iter()
            .find_map(|message| match message {
                MessageFromBackend::TranscriptionCompleted(record) => Some(record.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(record.model_id, model_catalog::DEFAULT_MODEL_ID);
        assert!((record.duration_seconds - 5.0).abs() < 0.05);
        assert!(
            messages
                .iter()
                .any(|message| matches!(message, MessageFromBackend::WaveformUpdate(bars) if bars.len() == 8))
        );

        assert!(!sender.send(vec![0.0; 16]).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn streaming_recording_publishes_partials_then_finals() {
        let Fixture { session, mut rx, _models } = fixture(|| {
            Engine::streaming(
                FakeStream::scripted(vec![
                    StreamEvent::Partial("hello".into()),
                    StreamEvent::Final("hello world".into()),
                    StreamEvent::Partial("how".into()),
                ])
                .with_tail("how are you"),
            )
        });
        load_default(&session).await;
        drain(&mut rx);

        let sender = session.start_recording(AudioFormat::CANONICAL).await.unwrap();
        for _ in 0..3 {
            assert!(sender.send(tone(4_000, 16_000, 1)).await);
        }
        session.stop_recording().await;

        let updates: Vec<(String, String)> = drain(&mut rx)
            .into_iter()
            .filter_map(|message| match message {
                MessageFromBackend::TranscriptUpdate { confirmed, hypothesis, .. } => {
                    Some((confirmed, hypothesis))
                }
                _ => None,
            })
            .collect();
        let expected = [
            ("", "hello"),
            ("hello world", ""),
            ("hello world", "how"),
            ("hello world how are you", ""),
        ];
        assert_eq!(
            updates,
            expected
                .iter()
                .map(|(confirmed, hypothesis)| (confirmed.to_string(), hypothesis.to_string()))
                .collect::<Vec<_>>()
        );
        assert_eq!(session.session_state(), SessionState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn inference_failure_keeps_the_model_loaded() {
        let Fixture { session, mut rx, _models } =
            fixture(|| Engine::batch(FakeBatch::new("hi").failing_inference()));
        load_default(&session).await;

        let result = session
            .transcribe_file(tone(16_000, 16_000, 1), AudioFormat::CANONICAL, None)
            .await
            .unwrap();

        assert!(result.is_empty());
        assert!(session.model_state().is_loaded());
        assert_eq!(warnings(&drain(&mut rx)), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn undecodable_audio_is_reported() {
        let Fixture { session, mut rx, _models } = fixture(|| Engine::batch(FakeBatch::new("hi")));
        load_default(&session).await;

        let result = session
            .transcribe_file(vec![0.1; 64], AudioFormat::new(0, 44_100), None)
            .await;

        assert!(result.is_none());
        assert_eq!(warnings(&drain(&mut rx)), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn clearing_keeps_the_model() {
        let Fixture { session, mut rx, _models } = fixture(|| Engine::batch(FakeBatch::new("first take")));
        load_default(&session).await;
        session
            .transcribe_file(tone(8_000, 8_000, 1), AudioFormat::new(1, 8_000), None)
            .await
            .unwrap();
        assert_eq!(session.transcript().confirmed(), "first take");
        drain(&mut rx);

        session.clear_transcription().await;

        assert!(session.transcript().is_empty());
        assert!(session.model_state().is_loaded());
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [MessageFromBackend::TranscriptUpdate { confirmed, hypothesis, translated_confirmed: None }]
                if confirmed.is_empty() && hypothesis.is_empty()
        ));
    }

    #[derive(Default)]
    struct Shouting {
        prepared: Mutex<Vec<(String, String)>>,
        prepare_delay: Duration,
    }

    impl Translator for Shouting {
        fn prepare(&self, source: &str, target: &str) -> Result<(), CollaboratorError> {
            std::thread::sleep(self.prepare_delay);
            lock(&self.prepared).push((source.to_string(), target.to_string()));
            Ok(())
        }

        fn translate(&self, text: &str, _: &str, _: &str) -> Result<String, CollaboratorError> {
            Ok(text.to_uppercase())
        }
    }

    #[derive(Default)]
    struct Collecting(Mutex<Vec<TranscriptRecord>>);

    impl TranscriptSink for Collecting {
        fn store(&self, record: &TranscriptRecord) -> Result<(), CollaboratorError> {
            lock(&self.0).push(record.clone());
            Ok(())
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn confirmed_text_is_translated_and_stored() {
        let translator = Arc::new(Shouting::default());
        let sink = Arc::new(Collecting::default());
        let collaborators = Collaborators {
            translator: Some(translator.clone()),
            sink: Some(sink.clone()),
        };
        let Fixture { session, _models, .. } = fixture_with(
            || Engine::batch(FakeBatch::new("guten tag").with_language("de")),
            Some("en"),
            collaborators,
        );
        load_default(&session).await;

        let path = PathBuf::from("greeting.wav");
        session
            .transcribe_file(tone(16_000, 16_000, 1), AudioFormat::CANONICAL, Some(path.clone()))
            .await
            .unwrap();

        assert!(eventually(|| session.translated().as_deref() == Some("GUTEN TAG")).await);
        assert_eq!(
            *lock(&translator.prepared),
            vec![("de".to_string(), "en".to_string())]
        );
        assert!(eventually(|| !lock(&sink.0).is_empty()).await);
        let stored = lock(&sink.0)[0].clone();
        assert_eq!(stored.text, "guten tag");
        assert_eq!(stored.language.as_deref(), Some("de"));
        assert_eq!(stored.audio_path, Some(path));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn a_burst_of_finals_prepares_the_translator_once() {
        let translator = Arc::new(Shouting {
            prepare_delay: Duration::from_millis(150),
            ..Shouting::default()
        });
        let collaborators = Collaborators {
            translator: Some(translator.clone()),
            sink: None,
        };
        let Fixture { session, _models, .. } = fixture_with(
            || {
                Engine::streaming(FakeStream::scripted(vec![
                    StreamEvent::Final("one".into()),
                    StreamEvent::Final("two".into()),
                    StreamEvent::Final("three".into()),
                ]))
            },
            Some("en"),
            collaborators,
        );
        load_default(&session).await;

        let sender = session.start_recording(AudioFormat::CANONICAL).await.unwrap();
        for _ in 0..3 {
            assert!(sender.send(tone(160, 16_000, 1)).await);
        }
        session.stop_recording().await;

        assert_eq!(session.transcript().confirmed(), "one two three");
        assert!(eventually(|| session.translated().as_deref() == Some("ONE TWO THREE")).await);
        assert_eq!(
            *lock(&translator.prepared),
            vec![("auto".to_string(), "en".to_string())]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn recording_starts_while_a_file_transcribes() {
        let Fixture { session, _models, .. } = fixture(|| {
            Engine::batch(
                FakeBatch::new("slow file").with_transcribe_delay(Duration::from_millis(800)),
            )
        });
        load_default(&session).await;

        let transcribing = session.clone();
        let file = tokio::spawn(async move {
            transcribing
                .transcribe_file(tone(16_000, 16_000, 1), AudioFormat::CANONICAL, None)
                .await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        let sender = session.start_recording(AudioFormat::CANONICAL).await;
        assert!(sender.is_some());
        assert!(started.elapsed() < Duration::from_millis(300));

        assert!(file.await.unwrap().is_some());
        session.stop_recording().await;
        assert_eq!(session.session_state(), SessionState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_selections_load_one_at_a_time() {
        let probe = ConcurrencyProbe::default();
        let shared_probe = probe.clone();
        let Fixture { session, _models, .. } = fixture(move || {
            Engine::batch(
                FakeBatch::new("hi")
                    .with_load_delay(Duration::from_millis(100))
                    .with_probe(shared_probe.clone()),
            )
        });
        let tiny = model_catalog::find("whisper-tiny").unwrap();
        install(tiny, _models.path());

        let first = session.clone();
        let first = tokio::spawn(async move {
            first
                .select_and_load_model(model_catalog::default_model(), CancellationToken::new())
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = session
            .select_and_load_model(tiny, CancellationToken::new())
            .await;

        assert!(first.await.unwrap());
        assert!(second);
        assert_eq!(probe.peak(), 1);
        assert_eq!(
            session.model_state(),
            ModelState::Loaded { model_id: tiny.id.to_string() }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn a_full_chunk_queue_holds_the_capture_back() {
        let Fixture { session, _models, .. } = fixture(|| {
            Engine::streaming(
                FakeStream::scripted(Vec::new()).with_initial_stall(Duration::from_millis(400)),
            )
        });
        load_default(&session).await;
        let sender = session.start_recording(AudioFormat::CANONICAL).await.unwrap();

        // the pump takes this one and stalls inside the engine
        assert!(sender.send(tone(160, 16_000, 1)).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        for _ in 0..CHUNK_QUEUE_CAPACITY {
            assert!(sender.send(tone(160, 16_000, 1)).await);
        }

        let overflow =
            tokio::time::timeout(Duration::from_millis(50), sender.send(tone(160, 16_000, 1)))
                .await;
        assert!(overflow.is_err());

        assert!(sender.send(tone(160, 16_000, 1)).await);
        session.stop_recording().await;
        assert_eq!(session.session_state(), SessionState::Idle);
    }
}
