//! Stand-ins for engines that cannot run in this build or on this platform.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::{BatchBackend, PlatformRecognizer, StreamEvent, StreamingBackend};
use crate::error::EngineError;
use crate::types::{TranscribeOptions, TranscriptionResult};

/// Platform recognizer for systems without a built-in speech service.
///
/// Acquiring it always fails with [`EngineError::Unavailable`], so the
/// session reports a failed load instead of a silently empty engine.
pub struct UnavailableRecognizer;

impl PlatformRecognizer for UnavailableRecognizer {
    fn name(&self) -> &'static str {
        "system-speech"
    }

    fn acquire(&mut self, _language: Option<&str>) -> Result<(), EngineError> {
        Err(EngineError::Unavailable(format!(
            "no built-in speech recognizer on {}",
            std::env::consts::OS
        )))
    }

    fn listen(
        &mut self,
        _window: Duration,
        _language: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        Err(EngineError::NotLoaded)
    }

    fn release(&mut self) {}
}

/// Backend placeholder for a native library that was not compiled in.
pub struct UnavailableBackend {
    name: &'static str,
    feature: &'static str,
}

impl UnavailableBackend {
    pub fn new(name: &'static str, feature: &'static str) -> Self {
        Self { name, feature }
    }

    fn error(&self) -> EngineError {
        EngineError::Unavailable(format!(
            "{} support is not compiled in, rebuild with --features {}",
            self.name, self.feature
        ))
    }
}

impl BatchBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn load(&mut self, _model_path: &Path) -> Result<(), EngineError> {
        Err(self.error())
    }

    fn transcribe(
        &mut self,
        _samples: &[f32],
        _options: &TranscribeOptions,
        _cancel: &CancellationToken,
    ) -> Result<TranscriptionResult, EngineError> {
        Err(self.error())
    }

    fn release(&mut self) {}
}

impl StreamingBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn load(&mut self, _model_path: &Path) -> Result<(), EngineError> {
        Err(self.error())
    }

    fn accept(&mut self, _samples: &[f32]) -> Result<StreamEvent, EngineError> {
        Err(self.error())
    }

    fn finish(&mut self) -> Result<Option<String>, EngineError> {
        Err(self.error())
    }

    fn reset(&mut self) {}

    fn release(&mut self) {}
}
