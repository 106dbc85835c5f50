use std::path::PathBuf;

use crate::model_catalog::EngineVariant;

/// Lifecycle of the loaded model.
///
/// `Unloaded → Loading → Loaded | Failed`, `Loaded → Unloaded` on release
/// and `Failed → Loading` on retry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModelState {
    #[default]
    Unloaded,
    Loading { model_id: String },
    Loaded { model_id: String },
    Failed { model_id: String, reason: String },
}

impl ModelState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelState::Loaded { .. })
    }

    pub fn model_id(&self) -> Option<&str> {
        match self {
            ModelState::Unloaded => None,
            ModelState::Loading { model_id }
            | ModelState::Loaded { model_id }
            | ModelState::Failed { model_id, .. } => Some(model_id),
        }
    }
}

/// Lifecycle of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Transcribing,
}

/// A catalog entry together with its local availability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSummary {
    pub id: String,
    pub display_name: String,
    pub variant: EngineVariant,
    pub languages: String,
    pub size_mb: u32,
    pub description: String,
    pub downloaded: bool,
    /// Whether this is the model currently loaded or loading.
    pub active: bool,
}

/// A finished transcript, handed off for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptRecord {
    pub text: String,
    pub duration_seconds: f64,
    pub model_id: String,
    pub language: Option<String>,
    /// Source file, when the audio came from one.
    pub audio_path: Option<PathBuf>,
}
