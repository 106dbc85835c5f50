use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for selecting specific audio devices and backends.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioDeviceConfig {
    /// Identifier of the preferred audio input device.
    pub selected_device_id: Option<String>,
}

/// How captured or decoded audio is turned into canonical samples.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Weight of the left channel when downmixing stereo.
    pub left_weight: f32,
    /// Weight of the right channel when downmixing stereo.
    pub right_weight: f32,
    /// FFT block size of the resampler, in input frames. Larger blocks cost
    /// latency and save CPU.
    pub resampler_block_size: u32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            left_weight: 0.5,
            right_weight: 0.5,
            resampler_block_size: 1024,
        }
    }
}

/// Settings passed to every transcription call.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Catalog id of the model to load at startup.
    pub active_model_id: Option<String>,
    /// ISO 639-1 language hint, or `"auto"` for detection.
    pub language: String,
    /// Inference threads; `0` uses every physical core.
    pub num_threads: usize,
    /// Number of bars in published waveform updates.
    pub waveform_bars: usize,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            active_model_id: None,
            language: "auto".to_string(),
            num_threads: 0,
            waveform_bars: 48,
        }
    }
}

/// Translation of confirmed text, when a translator is installed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub enabled: bool,
    pub target_language: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_language: "en".to_string(),
        }
    }
}

/// Global application configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub transcription: TranscriptionConfig,
    pub normalizer: NormalizerConfig,
    pub translation: TranslationConfig,
    /// Configuration for audio devices for the host.
    pub audio_device_config: AudioDeviceConfig,
    /// Where model files live. Defaults to `models/` in the cache directory.
    pub models_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [transcription]
            active_model_id = "vosk-small-en"
            "#,
        )
        .unwrap();
        assert_eq!(config.transcription.active_model_id.as_deref(), Some("vosk-small-en"));
        assert_eq!(config.transcription.language, "auto");
        assert_eq!(config.normalizer, NormalizerConfig::default());
        assert!(!config.translation.enabled);
    }

    #[test]
    fn serialized_config_reads_back() {
        let mut config = Config::default();
        config.models_dir = Some(PathBuf::from("/srv/models"));
        config.audio_device_config.selected_device_id = Some("alsa:hw:1".into());
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(toml::from_str::<Config>(&text).unwrap(), config);
    }
}
