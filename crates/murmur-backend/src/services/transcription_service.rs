use std::path::PathBuf;

use murmur_audio::AudioFormat;
use murmur_audio::device::default_input_device;
use murmur_bridge::notification::NotificationType;
use murmur_bridge::session::SessionState;

use crate::capture::LiveCapture;

async fn ensure_model_loaded(context: &super::AppContextHandle) -> bool {
    if context.session.model_state().is_loaded() {
        return true;
    }
    context
        .send_notification(NotificationType::Warning, "Load a speech model first.")
        .await;
    false
}

/// Starts recording from the selected input device, falling back to the
/// host's default device.
pub async fn handle_start_recording_request(context: super::AppContextHandle) {
    if !ensure_model_loaded(&context).await {
        return;
    }

    let (active_device, host) = {
        let state = context.state.read().await;
        (state.active_audio_device.clone(), state.active_host.clone())
    };
    let Some(device) = active_device.or_else(|| default_input_device(&host)) else {
        context
            .send_notification(NotificationType::Error, "No input device is available.")
            .await;
        return;
    };

    let format = match device.input_format() {
        Ok(format) => format,
        Err(err) => {
            log::error!("Failed to read the input format of {device}: {err}");
            context
                .send_notification(NotificationType::Error, format!("Cannot use {device}: {err}"))
                .await;
            return;
        }
    };
    log::info!("Active device is: {device}, input format is {format}");

    let Some(sender) = context.session.start_recording(format).await else {
        return;
    };

    let capture = tokio::task::spawn_blocking(move || LiveCapture::start(device, sender)).await;
    let error = match capture {
        Ok(Ok(capture)) => {
            let previous = context.state.write().await.capture.replace(capture);
            if let Some(previous) = previous {
                log::warn!("Replacing a capture that was never stopped");
                tokio::task::spawn_blocking(move || previous.stop());
            }
            return;
        }
        Ok(Err(err)) => err.to_string(),
        Err(err) => err.to_string(),
    };

    log::error!("Failed to start capturing: {error}");
    context
        .send_notification(
            NotificationType::Error,
            format!("Could not open the input device: {error}"),
        )
        .await;
    context.session.stop_recording().await;
}

/// Stops capturing and waits for the recording to be transcribed.
pub async fn handle_stop_recording_request(context: super::AppContextHandle) {
    let capture = context.state.write().await.capture.take();
    if let Some(capture) = capture
        && let Err(err) = tokio::task::spawn_blocking(move || capture.stop()).await
    {
        log::error!("Failed to stop the capture thread: {err}");
    }

    if context.session.session_state() == SessionState::Recording {
        context.session.stop_recording().await;
    }
}

pub async fn handle_transcribe_file_request(
    context: super::AppContextHandle,
    samples: Vec<f32>,
    format: AudioFormat,
    audio_path: Option<PathBuf>,
) {
    if !ensure_model_loaded(&context).await {
        return;
    }
    log::info!(
        "Transcribing {:.1}s of {format} audio from {audio_path:?}",
        format.duration_seconds(samples.len())
    );
    context
        .session
        .transcribe_file(samples, format, audio_path)
        .await;
}
