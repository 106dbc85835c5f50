use std::path::Path;

use tokio_util::sync::CancellationToken;
use whisper_rs::{FullParams, WhisperContext, WhisperContextParameters, WhisperState};

use crate::engine::BatchBackend;
use crate::error::EngineError;
use crate::types::{TranscribeOptions, TranscriptSegment, TranscriptionResult};

/// Buffers shorter than this are padded with silence; whisper.cpp refuses
/// less than a second of audio.
const MIN_TRANSCRIPTION_SAMPLES: usize = crate::CANONICAL_SAMPLE_RATE as usize + 1_600;

/// Buffers quieter than this (in dBFS) are treated as silence and skipped.
// TODO: move the gate threshold into the per-model configuration.
const SILENCE_GATE_DB: f32 = -60.0;

/// Batch backend running ggml models through whisper.cpp.
#[derive(Default)]
pub struct WhisperBackend {
    state: Option<WhisperState>,
    scratch_buffer: Vec<f32>,
}

impl WhisperBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_context_params() -> WhisperContextParameters<'static> {
        let mut context_params = WhisperContextParameters::default();
        context_params.use_gpu(cfg!(feature = "metal"));
        context_params
    }

    fn build_request_params<'a>(options: &'a TranscribeOptions) -> FullParams<'a, 'a> {
        let mut params = FullParams::new(whisper_rs::SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_special(false);
        params.set_print_timestamps(false);
        params.set_debug_mode(false);

        params.set_n_threads(options.num_threads.clamp(1, i32::MAX as usize) as i32);
        params.set_no_timestamps(false);
        params.set_token_timestamps(false);
        params.set_single_segment(false);
        params.set_language(options.language.as_deref());

        params.set_offset_ms(0);
        params.set_suppress_nst(true);
        params
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

impl BatchBackend for WhisperBackend {
    fn name(&self) -> &'static str {
        "whisper.cpp"
    }

    fn load(&mut self, model_path: &Path) -> Result<(), EngineError> {
        let path = model_path
            .to_str()
            .ok_or_else(|| EngineError::Load(format!("non UTF-8 model path {model_path:?}")))?;

        whisper_rs::install_logging_hooks();
        log::info!("Loading whisper model from {path}");
        let context = WhisperContext::new_with_params(path, Self::build_context_params())
            .map_err(|err| EngineError::Load(err.to_string()))?;
        let state = context
            .create_state()
            .map_err(|err| EngineError::Load(err.to_string()))?;

        self.state = Some(state);
        Ok(())
    }

    fn transcribe(
        &mut self,
        samples: &[f32],
        options: &TranscribeOptions,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionResult, EngineError> {
        let state = self.state.as_mut().ok_or(EngineError::NotLoaded)?;

        let level = rms(samples);
        if level == 0.0 || 20.0 * level.log10() <= SILENCE_GATE_DB {
            log::debug!("Skipping silent buffer of {} samples", samples.len());
            return Ok(TranscriptionResult::empty().with_language(options.language.clone()));
        }

        let audio: &[f32] = if samples.len() >= MIN_TRANSCRIPTION_SAMPLES {
            samples
        } else {
            self.scratch_buffer.clear();
            self.scratch_buffer.extend_from_slice(samples);
            self.scratch_buffer.resize(MIN_TRANSCRIPTION_SAMPLES, 0.0);
            &self.scratch_buffer
        };

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        state
            .full(Self::build_request_params(options), audio)
            .map_err(|err| EngineError::Inference(err.to_string()))?;

        // with no hint whisper.cpp detects the language itself
        let language = options.language.clone().or_else(|| {
            state
                .full_lang_id_from_state()
                .ok()
                .and_then(whisper_rs::get_lang_str)
                .map(str::to_string)
        });

        let mut segments = Vec::new();
        for segment in state.as_iter() {
            let text = segment.to_str_lossy().unwrap_or_default();
            if text.trim().is_empty() {
                continue;
            }
            segments.push(TranscriptSegment {
                text: text.trim().to_string(),
                start_ms: segment.start_timestamp() * 10,
                end_ms: segment.end_timestamp() * 10,
                language: language.clone(),
            });
        }

        let text = segments
            .iter()
            .map(|segment| segment.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(TranscriptionResult {
            text,
            segments,
            language,
            ..TranscriptionResult::empty()
        })
    }

    fn release(&mut self) {
        self.state = None;
        self.scratch_buffer = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_gate_treats_zero_as_silence() {
        assert_eq!(rms(&[0.0; 100]), 0.0);
        assert!(20.0 * rms(&[0.5; 100]).log10() > SILENCE_GATE_DB);
    }

    #[test]
    #[ignore = "needs a ggml model at MURMUR_WHISPER_MODEL"]
    fn transcribes_with_a_real_model() {
        let Ok(path) = std::env::var("MURMUR_WHISPER_MODEL") else {
            return;
        };
        let mut backend = WhisperBackend::new();
        backend.load(Path::new(&path)).unwrap();
        let result = backend
            .transcribe(&[0.0; 16_000], &TranscribeOptions::default(), &CancellationToken::new())
            .unwrap();
        assert!(result.is_final);
    }

    #[test]
    #[ignore = "needs a ggml model at MURMUR_WHISPER_MODEL"]
    fn detection_fills_in_the_language() {
        let Ok(path) = std::env::var("MURMUR_WHISPER_MODEL") else {
            return;
        };
        let mut backend = WhisperBackend::new();
        backend.load(Path::new(&path)).unwrap();
        let tone: Vec<f32> = (0..32_000)
            .map(|n| 0.4 * (n as f32 * 440.0 * std::f32::consts::TAU / 16_000.0).sin())
            .collect();
        let result = backend
            .transcribe(&tone, &TranscribeOptions::new(None, Some("auto")), &CancellationToken::new())
            .unwrap();
        assert!(result.language.is_some());
    }
}
