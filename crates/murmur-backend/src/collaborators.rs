//! Seams for services the session uses but does not implement.

use std::sync::Arc;

use murmur_bridge::session::TranscriptRecord;

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// The collaborator cannot serve the request yet (e.g. still preparing a
    /// language pair).
    #[error("{0} is not ready")]
    NotReady(String),
    #[error("{0}")]
    Failed(String),
}

/// Translates confirmed transcript text.
///
/// Calls run on the blocking pool and never hold up transcription.
pub trait Translator: Send + Sync {
    /// Prepares the `source → target` language pair. Called once per pair
    /// before the first [`translate`](Self::translate).
    fn prepare(&self, source_language: &str, target_language: &str)
    -> Result<(), CollaboratorError>;

    fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, CollaboratorError>;
}

/// Stores finished transcripts.
pub trait TranscriptSink: Send + Sync {
    fn store(&self, record: &TranscriptRecord) -> Result<(), CollaboratorError>;
}

/// Optional collaborators installed into the backend.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub translator: Option<Arc<dyn Translator>>,
    pub sink: Option<Arc<dyn TranscriptSink>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Collaborators")
            .field("translator", &self.translator.is_some())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
