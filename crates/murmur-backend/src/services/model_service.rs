use std::path::Path;

use murmur_bridge::MessageFromBackend;
use murmur_bridge::model_catalog::{self, ModelDescriptor};
use murmur_bridge::notification::NotificationType;
use murmur_bridge::session::ModelSummary;
use tokio_util::sync::CancellationToken;

fn summarize(model: &ModelDescriptor, models_root: &Path, active_id: Option<&str>) -> ModelSummary {
    ModelSummary {
        id: model.id.to_string(),
        display_name: model.display_name.to_string(),
        variant: model.variant(),
        languages: model.languages.to_string(),
        size_mb: model.size_mb,
        description: model.description.to_string(),
        downloaded: model.is_downloaded(models_root),
        active: active_id == Some(model.id),
    }
}

/// Every catalog model with its local availability, in catalog order.
pub fn catalog_summaries(models_root: &Path, active_id: Option<&str>) -> Vec<ModelSummary> {
    model_catalog::all()
        .iter()
        .map(|model| summarize(model, models_root, active_id))
        .collect()
}

/// Handles a catalog request (see
/// [`murmur_bridge::MessageToBackend::ModelCatalogRequest`]).
pub async fn handle_model_catalog_request(context: super::AppContextHandle) {
    let models_root = context.state.read().await.models_root.clone();
    let model_state = context.session.model_state();

    let summaries = catalog_summaries(&models_root, model_state.model_id());
    context
        .send(MessageFromBackend::ModelCatalogResponse(summaries))
        .await;
}

/// Loads the model with `id` and, once it is ready, remembers it as the
/// startup model.
pub async fn handle_select_model_request(context: super::AppContextHandle, id: String) {
    let Some(model) = model_catalog::find(&id) else {
        log::warn!("Requested unknown model {id}");
        context
            .send_notification(NotificationType::Error, format!("Unknown model \"{id}\"."))
            .await;
        return;
    };

    if !context
        .session
        .select_and_load_model(model, CancellationToken::new())
        .await
    {
        return;
    }

    let config = {
        let mut state = context.state.write().await;
        state.config.transcription.active_model_id = Some(id);
        state.config.clone()
    };
    if let Err(err) = crate::config::save_config(&config).await {
        log::error!("Failed to persist the active model: {err}");
    }
    context
        .send_notification(
            NotificationType::Success,
            format!("{} is ready.", model.display_name),
        )
        .await;
}

pub async fn handle_release_model_request(context: super::AppContextHandle) {
    context.session.release_model().await;
}

pub fn handle_cancel_model_load_request(context: super::AppContextHandle) {
    if !context.session.cancel_model_load() {
        log::debug!("No model load to cancel");
    }
}

/// Loads the configured model, or the default one, when its files are
/// already on disk.
pub async fn autoload_model(context: super::AppContextHandle, configured: Option<String>) {
    let model = match configured.as_deref().map(|id| (id, model_catalog::find(id))) {
        Some((_, Some(model))) => model,
        Some((id, None)) => {
            log::warn!("Configured model {id} is not in the catalog");
            model_catalog::default_model()
        }
        None => model_catalog::default_model(),
    };

    let models_root = context.state.read().await.models_root.clone();
    if !model.is_downloaded(&models_root) {
        log::info!("{} is not downloaded, nothing to load at startup", model.id);
        return;
    }

    log::info!("Loading {} at startup", model.id);
    context
        .session
        .select_and_load_model(model, CancellationToken::new())
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_report_files_and_activity() {
        let models_root = tempfile::tempdir().unwrap();
        let base = model_catalog::default_model();
        for (_, path) in base.file_paths(models_root.path()) {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"weights").unwrap();
        }

        let summaries = catalog_summaries(models_root.path(), Some(base.id));

        assert_eq!(summaries.len(), model_catalog::all().len());
        let summary = summaries.iter().find(|summary| summary.id == base.id).unwrap();
        assert!(summary.downloaded && summary.active);
        let tiny = summaries.iter().find(|summary| summary.id == "whisper-tiny").unwrap();
        assert!(!tiny.downloaded && !tiny.active);
        // file-less models never need a download
        let system = summaries.iter().find(|summary| summary.id == "system-speech").unwrap();
        assert!(system.downloaded);
    }
}
