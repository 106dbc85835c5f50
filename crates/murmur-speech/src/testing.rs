//! Scriptable in-memory backends for exercising engines and sessions without
//! model files.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::{BatchBackend, PlatformRecognizer, StreamEvent, StreamingBackend};
use crate::error::EngineError;
use crate::types::{TranscribeOptions, TranscriptSegment, TranscriptionResult};

/// Counts how many callers are inside a backend at once and remembers the
/// highest value seen.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ProbeGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard(self)
    }
}

struct ProbeGuard<'a>(&'a ConcurrencyProbe);

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Batch backend that returns a fixed text for any non-silent buffer.
pub struct FakeBatch {
    text: String,
    language: Option<String>,
    fail_load: bool,
    fail_inference: bool,
    load_delay: Duration,
    transcribe_delay: Duration,
    probe: ConcurrencyProbe,
    releases: Arc<AtomicUsize>,
}

impl FakeBatch {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            language: None,
            fail_load: false,
            fail_inference: false,
            load_delay: Duration::ZERO,
            transcribe_delay: Duration::ZERO,
            probe: ConcurrencyProbe::default(),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn failing_inference(mut self) -> Self {
        self.fail_inference = true;
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_transcribe_delay(mut self, delay: Duration) -> Self {
        self.transcribe_delay = delay;
        self
    }

    pub fn probe(&self) -> ConcurrencyProbe {
        self.probe.clone()
    }

    /// Shares `probe` with other backends so overlap across engines shows up.
    pub fn with_probe(mut self, probe: ConcurrencyProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        self.releases.clone()
    }
}

impl BatchBackend for FakeBatch {
    fn name(&self) -> &'static str {
        "fake-batch"
    }

    fn load(&mut self, _model_path: &Path) -> Result<(), EngineError> {
        let _guard = self.probe.enter();
        std::thread::sleep(self.load_delay);
        if self.fail_load {
            return Err(EngineError::Load("fake model is corrupt".into()));
        }
        Ok(())
    }

    fn transcribe(
        &mut self,
        samples: &[f32],
        options: &TranscribeOptions,
        _cancel: &CancellationToken,
    ) -> Result<TranscriptionResult, EngineError> {
        let _guard = self.probe.enter();
        std::thread::sleep(self.transcribe_delay);
        if self.fail_inference {
            return Err(EngineError::Inference("fake backend fault".into()));
        }
        if samples.iter().all(|sample| *sample == 0.0) {
            return Ok(TranscriptionResult::empty());
        }

        let language = options.language.clone().or_else(|| self.language.clone());
        let end_ms = (samples.len() as i64 * 1000) / crate::CANONICAL_SAMPLE_RATE as i64;
        Ok(TranscriptionResult {
            text: self.text.clone(),
            segments: vec![TranscriptSegment {
                text: self.text.clone(),
                start_ms: 0,
                end_ms,
                language: language.clone(),
            }],
            language,
            ..TranscriptionResult::empty()
        })
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Streaming backend that replays a script of events, one per accepted step.
pub struct FakeStream {
    script: VecDeque<StreamEvent>,
    tail: Option<String>,
    stall: Duration,
}

impl FakeStream {
    pub fn scripted(script: Vec<StreamEvent>) -> Self {
        Self {
            script: script.into(),
            tail: None,
            stall: Duration::ZERO,
        }
    }

    /// Blocks the first accepted step for `stall`.
    pub fn with_initial_stall(mut self, stall: Duration) -> Self {
        self.stall = stall;
        self
    }

    /// Text returned by `finish` for the utterance left open at end of input.
    pub fn with_tail(mut self, tail: &str) -> Self {
        self.tail = Some(tail.to_string());
        self
    }
}

impl StreamingBackend for FakeStream {
    fn name(&self) -> &'static str {
        "fake-stream"
    }

    fn load(&mut self, _model_path: &Path) -> Result<(), EngineError> {
        Ok(())
    }

    fn accept(&mut self, _samples: &[f32]) -> Result<StreamEvent, EngineError> {
        std::thread::sleep(std::mem::take(&mut self.stall));
        Ok(self.script.pop_front().unwrap_or(StreamEvent::Pending))
    }

    fn finish(&mut self) -> Result<Option<String>, EngineError> {
        Ok(self.tail.take())
    }

    fn reset(&mut self) {}

    fn release(&mut self) {}
}

/// Platform recognizer that records the listening windows it was given.
pub struct FakeRecognizer {
    text: String,
    windows: Arc<Mutex<Vec<Duration>>>,
}

impl FakeRecognizer {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            windows: Arc::default(),
        }
    }

    pub fn windows(&self) -> Arc<Mutex<Vec<Duration>>> {
        self.windows.clone()
    }
}

impl PlatformRecognizer for FakeRecognizer {
    fn name(&self) -> &'static str {
        "fake-recognizer"
    }

    fn acquire(&mut self, _language: Option<&str>) -> Result<(), EngineError> {
        Ok(())
    }

    fn listen(
        &mut self,
        window: Duration,
        _language: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        if let Ok(mut windows) = self.windows.lock() {
            windows.push(window);
        }
        Ok(self.text.clone())
    }

    fn release(&mut self) {}
}
