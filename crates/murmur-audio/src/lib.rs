//! Audio utilities for capturing, mixing, resampling, and normalizing input
//! streams.
//!
//! Every speech engine consumes one canonical format: mono, 32-bit float PCM
//! at 16 kHz. This crate turns whatever a capture source or a decoded file
//! delivers into that format, and derives visualization data from it. It
//! focuses on:
//! - Enumerating input devices and building input streams with `cpal`.
//! - Converting interleaved multi-channel frames to mono samples.
//! - Resampling mono audio streams with FFT-based resamplers.
//! - Normalizing whole buffers or live chunk streams into canonical audio.
//! - Computing waveform magnitude bars.
//!
//! # Real-time constraints
//! Audio callbacks run on a real-time thread. Avoid allocations, locks, and
//! blocking I/O inside callbacks whenever possible.

pub mod device;
pub mod mixer;
pub mod normalizer;
pub mod resampler;
pub mod waveform;

/// Sample rate of canonical audio, in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// A fallback fixed buffer size (in frames) used when the audio device reports
/// an unknown supported buffer size.
///
/// It is used in `target_buffer_size` when `cpal` cannot determine the
/// device's preferred or maximum buffer size.
pub const FIXED_FRAME_COUNT: u32 = 4096;

/// Declared layout of an interleaved PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Number of interleaved channels per frame.
    pub channels: u16,
    /// Frames per second.
    pub sample_rate: u32,
}

impl AudioFormat {
    /// The canonical engine format: mono at [`TARGET_SAMPLE_RATE`].
    pub const CANONICAL: AudioFormat = AudioFormat {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
    };

    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    /// Returns `true` when samples in this format can be fed to an engine
    /// without conversion.
    pub fn is_canonical(&self) -> bool {
        *self == Self::CANONICAL
    }

    /// Duration in seconds of `sample_count` interleaved samples.
    pub fn duration_seconds(&self, sample_count: usize) -> f64 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        let frames = sample_count / self.channels as usize;
        frames as f64 / self.sample_rate as f64
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{} Hz, {} channel(-s)",
            self.sample_rate, self.channels
        )
    }
}

/// Computes the greatest common divisor (GCD) of two unsigned integers.
///
/// This function implements the classic Euclidean algorithm.
pub(crate) fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let temp = a % b;
        a = b;
        b = temp;
    }
    a
}

/// Rounds `base` to the nearest multiple of `denominator`.
///
/// This function finds the closest integer to `base` that is evenly divisible
/// by `denominator`. In case of a tie (exactly halfway between two multiples),
/// it rounds away from zero (i.e., upward when `remainder * 2 == denominator`).
pub(crate) fn find_nearest_to(base: u32, denominator: u32) -> u32 {
    let remainder = base % denominator;
    if remainder * 2 <= denominator {
        base - remainder
    } else {
        base - remainder + denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcd_of_common_rates() {
        assert_eq!(gcd(48_000, 16_000), 16_000);
        assert_eq!(gcd(44_100, 16_000), 100);
        assert_eq!(gcd(7, 0), 7);
    }

    #[test]
    fn nearest_multiple_rounds_half_down() {
        assert_eq!(find_nearest_to(1000, 441), 882);
        assert_eq!(find_nearest_to(4096, 3), 4095);
        assert_eq!(find_nearest_to(10, 4), 8);
        assert_eq!(find_nearest_to(11, 4), 12);
    }

    #[test]
    fn format_duration_counts_frames() {
        let format = AudioFormat::new(2, 48_000);
        assert_eq!(format.duration_seconds(96_000), 1.0);
        assert_eq!(AudioFormat::new(0, 48_000).duration_seconds(10), 0.0);
        assert!(AudioFormat::CANONICAL.is_canonical());
    }
}
