//! Speech engines behind one capability contract.
//!
//! Three architecturally different kinds of recognizer are supported:
//! batch models that transcribe a finished buffer, streaming models that
//! revise a hypothesis as audio arrives, and the operating system's own
//! recognizer. They share the [`Engine`] enum and are driven through an
//! [`EngineHandle`], which owns the native resource exclusively and keeps
//! non-reentrant backends from being entered twice.
//!
//! Results from any engine are folded into a [`Transcript`], which keeps
//! confirmed text append-only and the streaming hypothesis replace-only.
//!
//! Native backends are opt-in cargo features (`whisper`, `parakeet`, `vosk`).
//! Without them the constructors below still return an engine, but loading it
//! fails with [`EngineError::Unavailable`].

pub mod engine;
pub mod error;
pub mod handle;
pub mod system;
pub mod transcript;
pub mod types;

#[cfg(feature = "parakeet")]
pub mod parakeet_engine;
#[cfg(feature = "vosk")]
pub mod vosk_engine;
#[cfg(feature = "whisper")]
pub mod whisper_engine;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{Engine, StreamEvent};
pub use error::EngineError;
pub use handle::EngineHandle;
pub use transcript::{Transcript, TranscriptChange};
pub use types::{TranscribeOptions, TranscriptSegment, TranscriptionResult};

/// Sample rate of the canonical mono audio every engine consumes.
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Creates a whisper.cpp batch engine.
pub fn whisper() -> Engine {
    #[cfg(feature = "whisper")]
    {
        Engine::batch(whisper_engine::WhisperBackend::new())
    }
    #[cfg(not(feature = "whisper"))]
    {
        Engine::batch(system::UnavailableBackend::new("whisper.cpp", "whisper"))
    }
}

/// Creates a Parakeet TDT batch engine.
pub fn parakeet() -> Engine {
    #[cfg(feature = "parakeet")]
    {
        Engine::batch(parakeet_engine::ParakeetBackend::new())
    }
    #[cfg(not(feature = "parakeet"))]
    {
        Engine::batch(system::UnavailableBackend::new("parakeet", "parakeet"))
    }
}

/// Creates a Vosk streaming engine.
pub fn vosk() -> Engine {
    #[cfg(feature = "vosk")]
    {
        Engine::streaming(vosk_engine::VoskBackend::new())
    }
    #[cfg(not(feature = "vosk"))]
    {
        Engine::streaming(system::UnavailableBackend::new("vosk", "vosk"))
    }
}

/// Creates an engine for the operating system's recognizer.
///
/// None of the supported build targets ship one that can be driven from
/// here yet, so the engine fails to load with a descriptive error.
pub fn system_speech(language: Option<String>) -> Engine {
    Engine::System(
        engine::SystemEngine::new(Box::new(system::UnavailableRecognizer)).with_language(language),
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tokio_util::sync::CancellationToken;

    use super::*;

    #[test]
    fn constructors_report_their_variant() {
        assert!(!whisper().is_streaming());
        assert!(!parakeet().is_streaming());
        assert!(vosk().is_streaming());
        assert!(matches!(system_speech(None), Engine::System(_)));
    }

    #[cfg(not(feature = "whisper"))]
    #[test]
    fn missing_native_backend_is_unavailable() {
        let mut engine = whisper();
        let err = engine
            .load(Path::new("/models/ggml-base.bin"), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
        assert!(!engine.is_loaded());
    }

    #[test]
    fn system_speech_is_unavailable_here() {
        let mut engine = system_speech(Some("en".into()));
        assert!(engine.load(Path::new(""), &CancellationToken::new()).is_err());
    }
}
