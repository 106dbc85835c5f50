//! Channel mixing for interleaved PCM frames.

use num_traits::{FromPrimitive, Zero};

/// Per-channel gains applied when folding a stereo frame into mono.
///
/// The default weights are equal, which makes the mix an arithmetic mean of
/// the left and right channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoWeights {
    pub left: f32,
    pub right: f32,
}

impl Default for StereoWeights {
    fn default() -> Self {
        Self {
            left: 0.5,
            right: 0.5,
        }
    }
}

/// Mixes interleaved stereo audio samples down to mono.
///
/// This function converts a stereo audio buffer into mono by weighting the
/// left and right channels for each frame:
/// `mono = left * weights.left + right * weights.right`.
///
/// The input slice must contain interleaved stereo samples in the form
/// `[L0, R0, L1, R1, ...]`. The resulting mono samples are written into
/// `samples_accumulator`, which must hold at least `samples_frame_data.len() / 2`
/// values.
///
/// # Returns
/// Returns the number of mono frames written to `samples_accumulator`.
pub fn mix_stereo_to_mono<T>(
    samples_accumulator: &mut [T],
    samples_frame_data: &[T],
    weights: StereoWeights,
) -> usize
where
    T: Copy + Zero + FromPrimitive + std::ops::Add<Output = T> + std::ops::Mul<Output = T>,
{
    let frames = (samples_frame_data.len() / 2).min(samples_accumulator.len());
    let left_weight = T::from_f32(weights.left).unwrap_or_else(T::zero);
    let right_weight = T::from_f32(weights.right).unwrap_or_else(T::zero);
    for i in 0..frames {
        let left_channel_sample = samples_frame_data[i * 2];
        let right_channel_sample = samples_frame_data[(i * 2) + 1];
        samples_accumulator[i] =
            left_channel_sample * left_weight + right_channel_sample * right_weight;
    }
    frames
}

/// Mixes interleaved audio with any number of channels down to mono by
/// averaging every channel of a frame.
///
/// Trailing samples that do not form a complete frame are ignored.
///
/// # Returns
/// Returns the number of mono frames written to `samples_accumulator`.
pub fn mix_channels_to_mono<T>(
    samples_accumulator: &mut [T],
    samples_frame_data: &[T],
    channels: usize,
) -> usize
where
    T: Copy + Zero + FromPrimitive + std::ops::Add<Output = T> + std::ops::Mul<Output = T>,
{
    if channels == 0 {
        return 0;
    }

    let scale = T::from_f32(1.0 / channels as f32).unwrap_or_else(T::zero);
    let mut written = 0;
    for (slot, frame) in samples_accumulator
        .iter_mut()
        .zip(samples_frame_data.chunks_exact(channels))
    {
        let sum = frame.iter().fold(T::zero(), |acc, &sample| acc + sample);
        *slot = sum * scale;
        written += 1;
    }
    written
}

/// Folds interleaved `f32` frames into a freshly allocated mono buffer.
///
/// Mono input is copied as-is, stereo input uses `weights`, and anything wider
/// is averaged across channels.
pub fn downmix(samples_frame_data: &[f32], channels: u16, weights: StereoWeights) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples_frame_data.to_vec(),
        2 => {
            let mut mono = vec![0.0; samples_frame_data.len() / 2];
            mix_stereo_to_mono(&mut mono, samples_frame_data, weights);
            mono
        }
        wide => {
            let channels = wide as usize;
            let mut mono = vec![0.0; samples_frame_data.len() / channels];
            mix_channels_to_mono(&mut mono, samples_frame_data, channels);
            mono
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_default_weights_average() {
        let mono = downmix(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2, StereoWeights::default());
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn stereo_custom_weights_apply_per_channel() {
        let weights = StereoWeights {
            left: 1.0,
            right: 0.0,
        };
        let mono = downmix(&[0.25, 0.75, -0.5, 0.9], 2, weights);
        assert_eq!(mono, vec![0.25, -0.5]);
    }

    #[test]
    fn wide_layouts_average_all_channels() {
        let frame = [0.6, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mono = downmix(&frame, 6, StereoWeights::default());
        assert_eq!(mono.len(), 1);
        assert!((mono[0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn incomplete_trailing_frame_is_ignored() {
        let mono = downmix(&[0.2, 0.4, 0.6, 0.2, 0.2], 3, StereoWeights::default());
        assert_eq!(mono.len(), 1);
    }

    #[test]
    fn zero_channels_produce_nothing() {
        assert!(downmix(&[0.1, 0.2], 0, StereoWeights::default()).is_empty());
    }
}
