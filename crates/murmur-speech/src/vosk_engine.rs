use std::path::Path;

use vosk::{DecodingState, Model, Recognizer};

use crate::engine::{StreamEvent, StreamingBackend};
use crate::error::EngineError;

/// Streaming backend driving a Kaldi recognizer through libvosk.
#[derive(Default)]
pub struct VoskBackend {
    recognizer: Option<Recognizer>,
    pcm: Vec<i16>,
}

impl VoskBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_pcm16(samples: &[f32], pcm: &mut Vec<i16>) {
    pcm.clear();
    pcm.extend(
        samples
            .iter()
            .map(|&sample| (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
    );
}

impl StreamingBackend for VoskBackend {
    fn name(&self) -> &'static str {
        "vosk"
    }

    fn load(&mut self, model_path: &Path) -> Result<(), EngineError> {
        let path = model_path
            .to_str()
            .ok_or_else(|| EngineError::Load(format!("non UTF-8 model path {model_path:?}")))?;

        log::info!("Loading Vosk model from {path}");
        let model = Model::new(path)
            .ok_or_else(|| EngineError::Load(format!("vosk could not open {path}")))?;
        let recognizer = Recognizer::new(&model, crate::CANONICAL_SAMPLE_RATE as f32)
            .ok_or_else(|| EngineError::Load("vosk could not create a recognizer".into()))?;

        self.recognizer = Some(recognizer);
        Ok(())
    }

    fn accept(&mut self, samples: &[f32]) -> Result<StreamEvent, EngineError> {
        let recognizer = self.recognizer.as_mut().ok_or(EngineError::NotLoaded)?;
        to_pcm16(samples, &mut self.pcm);

        let state = recognizer
            .accept_waveform(&self.pcm)
            .map_err(|err| EngineError::Inference(err.to_string()))?;
        if state == DecodingState::Finalized {
            let text = recognizer
                .result()
                .single()
                .map(|result| result.text.trim().to_string())
                .unwrap_or_default();
            return Ok(StreamEvent::Final(text));
        }

        let partial = recognizer.partial_result().partial.trim().to_string();
        if partial.is_empty() {
            Ok(StreamEvent::Pending)
        } else {
            Ok(StreamEvent::Partial(partial))
        }
    }

    fn finish(&mut self) -> Result<Option<String>, EngineError> {
        let recognizer = self.recognizer.as_mut().ok_or(EngineError::NotLoaded)?;
        Ok(recognizer
            .final_result()
            .single()
            .map(|result| result.text.trim().to_string())
            .filter(|text| !text.is_empty()))
    }

    fn reset(&mut self) {
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.reset();
        }
    }

    fn release(&mut self) {
        self.recognizer = None;
        self.pcm = Vec::new();
    }
}
