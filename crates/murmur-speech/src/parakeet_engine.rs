use std::path::Path;

use parakeet_rs::{ParakeetTDT, Transcriber};
use tokio_util::sync::CancellationToken;

use crate::engine::BatchBackend;
use crate::error::EngineError;
use crate::types::{TranscribeOptions, TranscriptionResult};

/// Shortest buffer worth sending to the model, 0.15 s.
const MIN_AUDIO_SAMPLES: usize = 2_400;

/// Batch backend running NVIDIA Parakeet TDT through ONNX Runtime.
///
/// The model takes files rather than buffers, so every call writes the
/// canonical samples to a temporary 16-bit WAV first.
#[derive(Default)]
pub struct ParakeetBackend {
    model: Option<ParakeetTDT>,
}

impl ParakeetBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_temp_wav(samples: &[f32]) -> Result<tempfile::NamedTempFile, EngineError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: crate::CANONICAL_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut temp_file = tempfile::Builder::new()
            .suffix(".wav")
            .tempfile()
            .map_err(inference_error)?;
        {
            let mut writer =
                hound::WavWriter::new(&mut temp_file, spec).map_err(inference_error)?;
            for &sample in samples {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer.write_sample(value).map_err(inference_error)?;
            }
            writer.finalize().map_err(inference_error)?;
        }
        temp_file
            .as_file_mut()
            .sync_all()
            .map_err(inference_error)?;
        Ok(temp_file)
    }
}

fn inference_error(err: impl std::fmt::Display) -> EngineError {
    EngineError::Inference(err.to_string())
}

impl BatchBackend for ParakeetBackend {
    fn name(&self) -> &'static str {
        "parakeet"
    }

    fn load(&mut self, model_path: &Path) -> Result<(), EngineError> {
        let path = model_path
            .to_str()
            .ok_or_else(|| EngineError::Load(format!("non UTF-8 model path {model_path:?}")))?;

        log::info!("Loading Parakeet model from {path}");
        let model = ParakeetTDT::from_pretrained(path, None)
            .map_err(|err| EngineError::Load(err.to_string()))?;
        self.model = Some(model);
        Ok(())
    }

    fn transcribe(
        &mut self,
        samples: &[f32],
        options: &TranscribeOptions,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionResult, EngineError> {
        let model = self.model.as_mut().ok_or(EngineError::NotLoaded)?;
        if samples.len() < MIN_AUDIO_SAMPLES {
            return Ok(TranscriptionResult::empty());
        }

        let temp_file = Self::write_temp_wav(samples)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let result = model
            .transcribe_file(temp_file.path(), None)
            .map_err(|err| EngineError::Inference(err.to_string()))?;

        // parakeet-tdt-v2 is English only
        let language = options.language.clone().or_else(|| Some("en".to_string()));
        Ok(TranscriptionResult::final_text(result.text.trim()).with_language(language))
    }

    fn release(&mut self) {
        self.model = None;
    }
}
