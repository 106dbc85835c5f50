//! Application context and message dispatching utilities.
//!
//! The context contains the shared state, the transcription session, and the
//! publisher used to answer the frontend bridge.

use std::sync::Arc;

use murmur_bridge::notification::NotificationType;
use murmur_bridge::{MessageFromBackend, MessageToBackend};
use tokio::sync::mpsc::Receiver;

use crate::publisher::Publisher;
use crate::services;
use crate::session::TranscriptionSession;
use crate::state::SharedState;

/// Shared application context passed to services and message handlers.
pub(crate) struct AppContext {
    /// Mutable runtime application state shared across services.
    pub state: SharedState,
    pub session: Arc<TranscriptionSession>,
    /// Outbound half of the frontend bridge.
    pub publisher: Publisher,
}

impl AppContext {
    /// Read and dispatch messages from the frontend bridge until it closes.
    pub async fn consume_bridge_messages(self: &Arc<Self>, mut rx: Receiver<MessageToBackend>) {
        while let Some(message) = rx.recv().await {
            log::debug!("Got a frontend message: {}", describe(&message));
            self.dispatch_message(message).await;
        }
        log::info!("Frontend bridge closed");
        services::transcription_service::handle_stop_recording_request(self.clone()).await;
    }

    /// Dispatches the received message from frontend down to individual
    /// service handlers.
    ///
    /// Handlers that wait on an engine run as their own tasks, so a model load
    /// or a long transcription never holds up cancellation or queries.
    async fn dispatch_message(self: &Arc<Self>, message: MessageToBackend) {
        match message {
            MessageToBackend::ConfigurationRequest => {
                services::config_service::handle_config_request(self.clone()).await;
            }
            MessageToBackend::ModelCatalogRequest => {
                services::model_service::handle_model_catalog_request(self.clone()).await;
            }
            MessageToBackend::SelectModel(id) => {
                tokio::spawn(services::model_service::handle_select_model_request(
                    self.clone(),
                    id,
                ));
            }
            MessageToBackend::ReleaseModel => {
                tokio::spawn(services::model_service::handle_release_model_request(
                    self.clone(),
                ));
            }
            MessageToBackend::CancelModelLoad => {
                services::model_service::handle_cancel_model_load_request(self.clone());
            }
            MessageToBackend::AudioDevicesListRequest => {
                services::audio_service::handle_audio_devices_list_request(self.clone()).await;
            }
            MessageToBackend::SelectAudioDevice(id) => {
                services::audio_service::handle_audio_device_selection(self.clone(), id).await;
            }
            MessageToBackend::StartRecordingRequest => {
                services::transcription_service::handle_start_recording_request(self.clone())
                    .await;
            }
            MessageToBackend::StopRecordingRequest => {
                tokio::spawn(
                    services::transcription_service::handle_stop_recording_request(self.clone()),
                );
            }
            MessageToBackend::TranscribeFileRequest {
                samples,
                channels,
                sample_rate,
                audio_path,
            } => {
                tokio::spawn(
                    services::transcription_service::handle_transcribe_file_request(
                        self.clone(),
                        samples,
                        murmur_audio::AudioFormat::new(channels, sample_rate),
                        audio_path,
                    ),
                );
            }
            MessageToBackend::ClearTranscriptionRequest => {
                self.session.clear_transcription().await;
            }
        }
    }

    /// Send a message to the frontend bridge.
    pub async fn send(&self, message: MessageFromBackend) {
        self.publisher.publish(message).await;
    }

    /// Send a notification message to the frontend bridge.
    pub async fn send_notification(
        &self,
        notification_type: NotificationType,
        content: impl Into<String>,
    ) {
        self.publisher.notify(notification_type, content).await;
    }
}

/// Debug description of a command without its sample payload.
fn describe(message: &MessageToBackend) -> String {
    match message {
        MessageToBackend::TranscribeFileRequest {
            samples,
            channels,
            sample_rate,
            audio_path,
        } => format!(
            "TranscribeFileRequest({} samples, {channels}ch @ {sample_rate}Hz, {audio_path:?})",
            samples.len()
        ),
        other => format!("{other:?}"),
    }
}
