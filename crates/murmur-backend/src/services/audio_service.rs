use murmur_bridge::audio::InputDevice;
use murmur_bridge::notification::NotificationType;

/// Handles an incoming audio devices list request (see
/// [`murmur_bridge::MessageToBackend::AudioDevicesListRequest`]).
pub async fn handle_audio_devices_list_request(context: super::AppContextHandle) {
    let (selected_id, host) = {
        let state = context.state.read().await;
        (
            state.config.audio_device_config.selected_device_id.clone(),
            state.active_host.clone(),
        )
    };

    let devices = match murmur_audio::device::list_host_input_devices(&host) {
        Ok(devices) => devices,
        Err(err) => {
            log::error!("Failed to obtain host's input devices: {err}");
            context
                .send_notification(NotificationType::Error, "Could not list input devices.")
                .await;
            return;
        }
    };
    let response_devices: Vec<InputDevice> = devices
        .iter()
        .map(|device| {
            let id = device.id.to_string();
            InputDevice {
                selected: selected_id.as_deref() == Some(id.as_str()),
                description: device.description.clone(),
                id,
            }
        })
        .collect();

    context
        .send(murmur_bridge::MessageFromBackend::AudioDevicesListResponse(
            response_devices,
        ))
        .await;
}

/// Handles an audio device selection request and persists it to config.
pub async fn handle_audio_device_selection(context: super::AppContextHandle, id: String) {
    let active_host = {
        let state = context.state.read().await;
        state.active_host.clone()
    };

    let audio_device = match murmur_audio::device::get_device_by_id(&active_host, &id) {
        Ok(device) => device,
        Err(err) => {
            log::error!("Invalid device id {id}: {err}");
            None
        }
    };

    match audio_device {
        Some(device) => {
            log::info!("Selected input device {device}");
            let config = {
                let mut state = context.state.write().await;
                state.active_audio_device = Some(device);
                state.config.audio_device_config.selected_device_id = Some(id);
                state.config.clone()
            };
            // persist the updated selection so it is remembered across runs
            if let Err(err) = crate::config::save_config(&config).await {
                log::error!("Failed to persist the selected device: {err}");
            }
        }
        None => {
            log::error!("Could not find the target device at {id}");
            context
                .send_notification(NotificationType::Warning, "That input device is not available.")
                .await;
        }
    }
}
