//! Drives the backend over the bridge and prints what it reports.

use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use murmur_bridge::model_catalog::{self, DEFAULT_MODEL_ID};
use murmur_bridge::notification::NotificationType;
use murmur_bridge::session::{ModelState, SessionState};
use murmur_bridge::{MessageFromBackend, MessageToBackend};
use tokio::sync::mpsc::{Receiver, Sender};

pub struct Console {
    rx: Receiver<MessageFromBackend>,
    tx: Sender<MessageToBackend>,
}

impl Console {
    pub fn new(rx: Receiver<MessageFromBackend>, tx: Sender<MessageToBackend>) -> Self {
        Self { rx, tx }
    }

    async fn send(&self, message: MessageToBackend) -> anyhow::Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| anyhow!("the backend stopped"))
    }

    async fn next(&mut self) -> anyhow::Result<MessageFromBackend> {
        self.rx.recv().await.context("the backend stopped")
    }

    /// Prints events until `done` picks one out.
    async fn until<T>(
        &mut self,
        mut done: impl FnMut(&MessageFromBackend) -> Option<T>,
    ) -> anyhow::Result<T> {
        loop {
            let message = self.next().await?;
            print_event(&message);
            if let Some(value) = done(&message) {
                return Ok(value);
            }
        }
    }

    pub async fn models(&mut self) -> anyhow::Result<()> {
        self.send(MessageToBackend::ModelCatalogRequest).await?;
        let catalog = self
            .until(|message| match message {
                MessageFromBackend::ModelCatalogResponse(catalog) => Some(catalog.clone()),
                _ => None,
            })
            .await?;

        for (variant, members) in model_catalog::grouped_by_variant() {
            println!("{variant}");
            for descriptor in members {
                let Some(model) = catalog.iter().find(|model| model.id == descriptor.id) else {
                    continue;
                };
                println!(
                    "  {} {:<16} {:>5} MB  {} ({})",
                    if model.downloaded { "*" } else { " " },
                    model.id,
                    model.size_mb,
                    model.display_name,
                    model.languages,
                );
            }
        }
        Ok(())
    }

    pub async fn devices(&mut self) -> anyhow::Result<()> {
        self.send(MessageToBackend::AudioDevicesListRequest).await?;
        let devices = self
            .until(|message| match message {
                MessageFromBackend::AudioDevicesListResponse(devices) => Some(devices.clone()),
                _ => None,
            })
            .await?;

        for device in devices {
            let marker = if device.selected { "*" } else { " " };
            println!("{marker} {}  {}", device.id, device.description);
        }
        Ok(())
    }

    pub async fn select_device(&mut self, id: String) -> anyhow::Result<()> {
        self.send(MessageToBackend::SelectAudioDevice(id)).await
    }

    /// Loads the requested model, or the configured one, and waits until it
    /// is ready.
    pub async fn ready_model(&mut self, requested: Option<String>) -> anyhow::Result<()> {
        let target = match requested {
            Some(id) => id,
            None => {
                self.send(MessageToBackend::ConfigurationRequest).await?;
                self.until(|message| match message {
                    MessageFromBackend::ConfigurationResponse(config) => {
                        Some(config.transcription.active_model_id.clone())
                    }
                    _ => None,
                })
                .await?
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string())
            }
        };

        self.send(MessageToBackend::ModelCatalogRequest).await?;
        let catalog = self
            .until(|message| match message {
                MessageFromBackend::ModelCatalogResponse(catalog) => Some(catalog.clone()),
                _ => None,
            })
            .await?;
        let Some(model) = catalog.iter().find(|model| model.id == target) else {
            bail!("unknown model \"{target}\", see `murmur models`");
        };
        if !model.downloaded {
            let mut message = format!(
                "{} is not downloaded into the models directory, it needs:",
                model.display_name
            );
            for file in model_catalog::find(&model.id).map_or(&[][..], |model| model.files) {
                let _ = write!(message, "\n  {} from {}", file.file_name, file.url);
            }
            bail!(message);
        }

        eprintln!("Loading {}...", model.display_name);
        self.send(MessageToBackend::SelectModel(target.clone()))
            .await?;
        self.until(|message| match message {
            MessageFromBackend::ModelStateChanged(ModelState::Loaded { model_id })
                if *model_id == target =>
            {
                Some(Ok(()))
            }
            MessageFromBackend::ModelStateChanged(ModelState::Failed { model_id, reason })
                if *model_id == target =>
            {
                Some(Err(anyhow!("failed to load {model_id}: {reason}")))
            }
            _ => None,
        })
        .await?
    }

    pub async fn transcribe(&mut self, path: PathBuf) -> anyhow::Result<()> {
        let audio = crate::wav::read(&path)?;
        self.send(MessageToBackend::TranscribeFileRequest {
            samples: audio.samples,
            channels: audio.channels,
            sample_rate: audio.sample_rate,
            audio_path: Some(path),
        })
        .await?;

        let finished = self
            .until(|message| match message {
                MessageFromBackend::TranscriptionCompleted(record) => Some(Ok(record.clone())),
                MessageFromBackend::NotificationMessage(notification)
                    if notification.notification_type != NotificationType::Info
                        && notification.notification_type != NotificationType::Success =>
                {
                    Some(Err(anyhow!(notification.message.clone())))
                }
                _ => None,
            })
            .await??;

        println!("{}", finished.text);
        Ok(())
    }

    pub async fn listen(&mut self, seconds: Option<u64>) -> anyhow::Result<()> {
        self.send(MessageToBackend::StartRecordingRequest).await?;
        self.until(|message| match message {
            MessageFromBackend::SessionStateChanged(SessionState::Recording) => Some(Ok(())),
            MessageFromBackend::NotificationMessage(notification)
                if notification.notification_type == NotificationType::Error
                    || notification.notification_type == NotificationType::Warning =>
            {
                Some(Err(anyhow!(notification.message.clone())))
            }
            _ => None,
        })
        .await??;

        let stop = async {
            match seconds {
                Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
                None => {
                    eprintln!("Listening, press Enter to stop.");
                    let _ = tokio::task::spawn_blocking(|| {
                        let mut line = String::new();
                        std::io::stdin().read_line(&mut line)
                    })
                    .await;
                }
            }
        };
        tokio::pin!(stop);

        // A capture that fails after starting ends the session on its own.
        let mut text = String::new();
        let mut failure = None;
        let mut ended = false;
        loop {
            tokio::select! {
                _ = &mut stop => break,
                message = self.rx.recv() => {
                    let message = message.context("the backend stopped")?;
                    print_event(&message);
                    match message {
                        MessageFromBackend::TranscriptionCompleted(record) => text = record.text,
                        MessageFromBackend::NotificationMessage(notification)
                            if notification.notification_type == NotificationType::Error =>
                        {
                            failure = Some(notification.message);
                        }
                        MessageFromBackend::SessionStateChanged(SessionState::Idle) => {
                            ended = true;
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        if !ended {
            self.send(MessageToBackend::StopRecordingRequest).await?;
            self.until(|message| match message {
                MessageFromBackend::TranscriptionCompleted(record) => {
                    text = record.text.clone();
                    None
                }
                MessageFromBackend::SessionStateChanged(SessionState::Idle) => Some(()),
                _ => None,
            })
            .await?;
        }
        if let Some(failure) = failure {
            bail!(failure);
        }

        println!("{}", text.trim());
        Ok(())
    }
}

/// Reports progress on stderr so stdout carries only transcripts.
fn print_event(message: &MessageFromBackend) {
    match message {
        MessageFromBackend::NotificationMessage(notification) => {
            eprintln!("[{:?}] {}", notification.notification_type, notification.message);
        }
        MessageFromBackend::ModelStateChanged(ModelState::Failed { model_id, reason }) => {
            eprintln!("{model_id} failed to load: {reason}");
        }
        MessageFromBackend::SessionStateChanged(SessionState::Transcribing) => {
            eprintln!("Transcribing...");
        }
        MessageFromBackend::TranscriptUpdate {
            confirmed,
            hypothesis,
            translated_confirmed,
        } => {
            eprintln!("> {}", format!("{confirmed} {hypothesis}").trim());
            if let Some(translated) = translated_confirmed {
                eprintln!("  {translated}");
            }
        }
        other => log::debug!("Backend event: {other:?}"),
    }
}
