use std::path::PathBuf;
use std::sync::Arc;

use murmur_audio::device::HostInputDevice;
use murmur_bridge::config::Config;

use crate::capture::LiveCapture;

/// The core application state that holds configuration, the audio host, and
/// the running capture.
///
/// It is designed to be wrapped in an async-friendly lock (see
/// [`SharedState`]) to allow concurrent reads and occasional writes from
/// multiple tasks. Transcription state lives in the session, not here.
pub struct State {
    /// The loaded application configuration.
    pub config: Config,
    /// Directory holding one subdirectory per catalog model.
    pub models_root: PathBuf,
    pub active_host: Arc<cpal::Host>,
    /// The input device selected by the user, if it is still present.
    pub active_audio_device: Option<HostInputDevice>,
    /// Microphone stream feeding the current recording.
    pub capture: Option<LiveCapture>,
}

/// Thread-safe, async-friendly shared reference to the application [`State`].
pub type SharedState = Arc<tokio::sync::RwLock<State>>;
