use std::path::Path;

use anyhow::Context;

/// Interleaved samples of a WAV file scaled to `[-1, 1]`, with the file's
/// channel count and sample rate.
pub struct WavAudio {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

pub fn read(path: &Path) -> anyhow::Result<WavAudio> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|sample| sample as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(WavAudio {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}
