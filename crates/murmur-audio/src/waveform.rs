//! Waveform magnitude bars for visualization.

/// Computes the root-mean-square magnitude of a block of samples.
///
/// Returns `0.0` for an empty block.
pub fn calculate_samples_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_of_squares: f64 = samples
        .iter()
        .map(|&sample| (sample as f64) * (sample as f64))
        .sum();
    (sum_of_squares / samples.len() as f64).sqrt() as f32
}

/// Splits `samples` into `bar_count` windows and returns one normalized RMS
/// magnitude per window.
///
/// Windows have equal length except the last one, which may be shorter (or
/// empty when the buffer holds fewer samples than bars). Values are scaled so
/// the loudest window is exactly `1.0`. A silent buffer produces all-zero bars
/// without attempting the division.
pub fn magnitude_bars(samples: &[f32], bar_count: usize) -> Vec<f32> {
    if bar_count == 0 {
        return Vec::new();
    }

    let window_len = samples.len().div_ceil(bar_count).max(1);
    let mut bars: Vec<f32> = (0..bar_count)
        .map(|index| {
            let start = (index * window_len).min(samples.len());
            let end = (start + window_len).min(samples.len());
            calculate_samples_rms(&samples[start..end])
        })
        .collect();

    let peak = bars.iter().copied().fold(0.0f32, f32::max);
    if peak > 0.0 && peak.is_finite() {
        for bar in &mut bars {
            *bar /= peak;
        }
    } else {
        bars.fill(0.0);
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_produces_zero_bars() {
        let bars = magnitude_bars(&[0.0; 16_000], 32);
        assert_eq!(bars.len(), 32);
        assert!(bars.iter().all(|&bar| bar == 0.0));
    }

    #[test]
    fn loudest_window_is_normalized_to_one() {
        let mut samples = vec![0.1f32; 400];
        samples[300..400].fill(0.8);
        let bars = magnitude_bars(&samples, 4);
        assert_eq!(bars[3], 1.0);
        assert!((bars[0] - 0.125).abs() < 1e-6);
        assert!(bars.iter().all(|bar| bar.is_finite()));
    }

    #[test]
    fn short_buffers_leave_trailing_bars_empty() {
        let bars = magnitude_bars(&[0.5, -0.5], 5);
        assert_eq!(bars, vec![1.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn last_window_may_be_shorter() {
        let samples = vec![0.5f32; 10];
        let bars = magnitude_bars(&samples, 3);
        assert_eq!(bars.len(), 3);
        assert!(bars.iter().all(|&bar| (bar - 1.0).abs() < 1e-6));
    }

    #[test]
    fn zero_bars_requested() {
        assert!(magnitude_bars(&[0.3; 10], 0).is_empty());
        assert!(magnitude_bars(&[], 4).iter().all(|&bar| bar == 0.0));
    }

    #[test]
    fn rms_of_constant_signal() {
        assert!((calculate_samples_rms(&[0.5; 64]) - 0.5).abs() < 1e-6);
        assert_eq!(calculate_samples_rms(&[]), 0.0);
    }
}
