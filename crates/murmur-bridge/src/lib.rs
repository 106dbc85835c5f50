//! Communication bridge between a presentation layer and the backend.
//!
//! This crate defines the types and protocols used to connect a frontend
//! (a GUI, or the console driver) with the asynchronous backend responsible
//! for audio capture, model loading, and transcription.
//!
//! The flow is unidirectional in both directions:
//! - The frontend sends commands (select a model, start recording,
//!   transcribe a file).
//! - The backend pushes events (state changes, transcript updates,
//!   waveform bars, notifications).
//!
//! Communication happens over bounded [`tokio::sync::mpsc`] channels wrapped
//! in [`BridgeChannels`].

pub mod audio;
pub mod config;
pub mod model_catalog;
pub mod notification;
pub mod session;

use std::path::PathBuf;

use tokio::sync::mpsc::{self, Receiver, Sender};

/// Messages emitted by the backend to inform the frontend of state updates.
#[derive(Debug, Clone)]
pub enum MessageFromBackend {
    NotificationMessage(notification::NotificationMessage),
    /// Response to [`MessageToBackend::ConfigurationRequest`].
    ConfigurationResponse(config::Config),
    /// Response to [`MessageToBackend::ModelCatalogRequest`].
    ModelCatalogResponse(Vec<session::ModelSummary>),
    AudioDevicesListResponse(Vec<audio::InputDevice>),
    ModelStateChanged(session::ModelState),
    SessionStateChanged(session::SessionState),
    /// The live transcript changed.
    TranscriptUpdate {
        /// Text no engine will revise.
        confirmed: String,
        /// In-flight streaming hypothesis; empty for batch engines.
        hypothesis: String,
        /// Translation of `confirmed`, once one is available.
        translated_confirmed: Option<String>,
    },
    /// Normalized magnitude bars of the most recent audio.
    WaveformUpdate(Vec<f32>),
    /// A recording or file finished transcribing.
    TranscriptionCompleted(session::TranscriptRecord),
}

/// Commands issued by the frontend to control or query the backend.
#[derive(Debug, Clone)]
pub enum MessageToBackend {
    /// Request for the application configuration.
    ConfigurationRequest,
    ModelCatalogRequest,
    /// Release any loaded model and load the catalog model with this id.
    SelectModel(String),
    ReleaseModel,
    /// Abort an in-flight [`MessageToBackend::SelectModel`].
    CancelModelLoad,
    AudioDevicesListRequest,
    SelectAudioDevice(String),
    /// Start capturing from the selected input device.
    StartRecordingRequest,
    StopRecordingRequest,
    /// Transcribe already-decoded interleaved PCM in one shot.
    TranscribeFileRequest {
        samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
        audio_path: Option<PathBuf>,
    },
    ClearTranscriptionRequest,
}

/// Paired `tokio::mpsc` channels for bidirectional communication between
/// frontend and backend.
pub struct BridgeChannels {
    /// Receiver used by the frontend to get messages from the backend.
    pub frontend_rx: Receiver<MessageFromBackend>,
    /// Sender used by the frontend to send commands to the backend.
    pub frontend_tx: Sender<MessageToBackend>,

    /// Receiver used by the backend to get commands from the frontend.
    pub backend_rx: Receiver<MessageToBackend>,
    /// Sender used by the backend to send events/responses to the frontend.
    pub backend_tx: Sender<MessageFromBackend>,
}

impl BridgeChannels {
    /// Creates a new pair of bridged channels with the given buffer capacity.
    pub fn new(buffer: usize) -> Self {
        let (to_backend_tx, to_backend_rx) = mpsc::channel(buffer);
        let (to_frontend_tx, to_frontend_rx) = mpsc::channel(buffer);
        Self {
            frontend_tx: to_backend_tx,
            frontend_rx: to_frontend_rx,
            backend_rx: to_backend_rx,
            backend_tx: to_frontend_tx,
        }
    }
}

impl Default for BridgeChannels {
    fn default() -> Self {
        Self::new(64)
    }
}
