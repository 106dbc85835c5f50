use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use murmur_bridge::config::Config;
use tokio::{
    fs::{OpenOptions, create_dir_all, read_to_string},
    io::AsyncWriteExt,
};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors that can occur while loading or resolving application configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to determine the user's configuration or data directories. This
    /// usually occurs when required environment variables are missing (e.g.,
    /// `$HOME` on Unix or `%APPDATA%` on Windows).
    #[error("failed to obtain user's directories")]
    DirectoriesNotFound,
    /// An I/O error occurred while reading or writing the configuration file.
    #[error("failed to read config: {0}")]
    IoError(#[from] std::io::Error),
    /// The configuration file contains invalid TOML or does not match the expected structure.
    #[error("failed to deserialize config: {0}")]
    DeserializeError(#[from] toml::de::Error),
    /// Failed to serialize the configuration to TOML (e.g., when saving changes).
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Returns the user's configuration and cache directories.
pub fn project_dirs() -> Result<(PathBuf, PathBuf), ConfigError> {
    match ProjectDirs::from("dev", "murmur", "murmur") {
        Some(path) => Ok((
            path.config_dir().to_path_buf(),
            path.cache_dir().to_path_buf(),
        )),
        None => Err(ConfigError::DirectoriesNotFound),
    }
}

/// Where model files live: the configured directory, or `models/` under the
/// cache directory.
pub fn models_root(config: &Config, cache_dir: &Path) -> PathBuf {
    config
        .models_dir
        .clone()
        .unwrap_or_else(|| cache_dir.join("models"))
}

/// Loads the application configuration from disk. Returns the loaded config,
/// as well as path to the cache directory.
pub async fn load_config() -> Result<(Config, PathBuf), ConfigError> {
    let (config_dir, cache_dir) = project_dirs()?;
    let config = load_config_from(&config_dir).await?;
    Ok((config, cache_dir))
}

/// Loads `config.toml` from `config_dir`, writing the defaults there first if
/// the file does not exist yet.
pub async fn load_config_from(config_dir: &Path) -> Result<Config, ConfigError> {
    let config_path = config_dir.join(CONFIG_FILE_NAME);
    log::info!("Loading configuration from {config_path:?}");
    if config_path.exists() {
        let contents = read_to_string(config_path).await?;
        return Ok(toml::from_str(&contents)?);
    }

    let config = Config::default();
    create_dir_all(config_dir).await?;

    let contents = toml::to_string_pretty(&config)?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(config_path)
        .await?;
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await?;

    Ok(config)
}

/// Saves the current configuration to disk, overwriting `config.toml` in the
/// user's configuration directory.
pub async fn save_config(config: &Config) -> Result<(), ConfigError> {
    let (config_dir, _) = project_dirs()?;
    save_config_to(&config_dir, config).await
}

pub async fn save_config_to(config_dir: &Path, config: &Config) -> Result<(), ConfigError> {
    create_dir_all(config_dir).await?;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(config_dir.join(CONFIG_FILE_NAME))
        .await?;

    let contents = toml::to_string_pretty(config)?;
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("murmur");

        let config = load_config_from(&config_dir).await.unwrap();

        assert_eq!(config, Config::default());
        assert!(config_dir.join(CONFIG_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn saved_selection_survives_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.transcription.active_model_id = Some("parakeet-tdt-v2".into());
        config.audio_device_config.selected_device_id = Some("alsa:default".into());

        save_config_to(dir.path(), &config).await.unwrap();

        assert_eq!(load_config_from(dir.path()).await.unwrap(), config);
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "transcription = 3").unwrap();

        let err = load_config_from(dir.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::DeserializeError(_)));
    }

    #[test]
    fn models_root_defaults_into_the_cache() {
        let mut config = Config::default();
        assert_eq!(
            models_root(&config, Path::new("/cache")),
            PathBuf::from("/cache/models")
        );

        config.models_dir = Some(PathBuf::from("/srv/models"));
        assert_eq!(
            models_root(&config, Path::new("/cache")),
            PathBuf::from("/srv/models")
        );
    }
}
