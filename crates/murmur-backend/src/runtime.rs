//! Backend runtime setup and orchestration.
//!
//! This module wires together configuration, shared state, the transcription
//! session, and the message dispatch loop that listens to frontend bridge
//! requests.

use std::{sync::Arc, thread, time::Duration};

use murmur_bridge::config::Config;
use murmur_bridge::notification::NotificationType;
use murmur_bridge::{MessageFromBackend, MessageToBackend};
use tokio::sync::{
    RwLock,
    mpsc::{Receiver, Sender},
};

use crate::app::AppContext;
use crate::collaborators::Collaborators;
use crate::publisher::Publisher;
use crate::services;
use crate::session::{EngineFactory, SessionSettings, TranscriptionSession, native_engine};
use crate::state::State;

/// How long blocking work (a model release, a capture thread) may take to
/// wind down once the frontend is gone.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Initialize backend state and start processing frontend messages.
async fn setup_backend(
    rx: Receiver<MessageToBackend>,
    tx: Sender<MessageFromBackend>,
    collaborators: Collaborators,
) {
    let publisher = Publisher::new(tx);

    let (config, cache_path) = match crate::config::load_config().await {
        Ok(loaded) => loaded,
        Err(err) => {
            log::error!("Failed to load config, falling back to defaults: {err}");
            publisher
                .notify(
                    NotificationType::Warning,
                    format!("Settings could not be loaded, using defaults: {err}"),
                )
                .await;
            let cache_path = crate::config::project_dirs()
                .map(|(_, cache_dir)| cache_dir)
                .unwrap_or_else(|_| std::env::temp_dir().join("murmur"));
            (Config::default(), cache_path)
        }
    };
    let models_root = crate::config::models_root(&config, &cache_path);
    log::info!("Models are read from {models_root:?}");

    let active_host = Arc::new(cpal::default_host()); // using default host for now
    let active_audio_device = match config.audio_device_config.selected_device_id {
        Some(ref device_id) => {
            match murmur_audio::device::get_device_by_id(&active_host, device_id) {
                Ok(Some(device)) => Some(device),
                Ok(None) => {
                    log::warn!("Selected input device {device_id} is gone, using the default");
                    None
                }
                Err(err) => {
                    log::warn!("Selected input device {device_id} is unusable: {err}");
                    None
                }
            }
        }
        None => None,
    };

    let factory: EngineFactory = Arc::new(native_engine);
    let session = TranscriptionSession::new(
        SessionSettings::from_config(&config, models_root.clone()),
        publisher.clone(),
        factory,
        collaborators,
    );
    let startup_model = config.transcription.active_model_id.clone();

    let state = Arc::new(RwLock::new(State {
        config,
        models_root,
        active_host,
        active_audio_device,
        capture: None,
    }));

    let context = Arc::new(AppContext {
        state,
        session,
        publisher,
    });
    tokio::spawn(services::model_service::autoload_model(
        context.clone(),
        startup_model,
    ));
    context.consume_bridge_messages(rx).await;
}

/// Spawn the backend runtime and begin processing bridge messages.
///
/// The returned thread exits once the frontend drops its command sender.
pub fn run(rx: Receiver<MessageToBackend>, tx: Sender<MessageFromBackend>) -> thread::JoinHandle<()> {
    run_with_collaborators(rx, tx, Collaborators::default())
}

/// Like [`run`], with a translator and transcript sink installed.
pub fn run_with_collaborators(
    rx: Receiver<MessageToBackend>,
    tx: Sender<MessageFromBackend>,
    collaborators: Collaborators,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("murmur-backend")
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                log::error!("Failed to build the backend runtime: {err}");
                return;
            }
        };
        runtime.block_on(async { setup_backend(rx, tx, collaborators).await });
        runtime.shutdown_timeout(SHUTDOWN_GRACE);
    })
}
