//! Canonicalization of arbitrary PCM into engine-ready audio.
//!
//! Engines only ever see mono `f32` samples at [`TARGET_SAMPLE_RATE`]. The
//! normalizer downmixes interleaved frames (see [`crate::mixer`]) and then
//! streams them through a [`StreamingResampler`] when the source rate differs.
//! Resampler latency is trimmed from the head of the output and the tail is
//! flushed with silence, so a finished stream holds exactly
//! `round(frames * 16000 / source_rate)` samples.
//!
//! Failures never escape as faults: a stream that cannot be converted yields
//! an empty buffer, which callers treat as "could not decode".

use crate::mixer::{self, StereoWeights};
use crate::resampler::{AudioResampler, ResamplerError, StreamingResampler};
use crate::{AudioFormat, TARGET_SAMPLE_RATE};

/// Default FFT block size, in input frames, for the normalizer's resampler.
pub const DEFAULT_RESAMPLER_BLOCK: u32 = 1024;

/// Upper bound on silent blocks pushed while flushing a stream tail.
const MAX_FLUSH_BLOCKS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("unsupported source format: {channels} channel(-s) at {sample_rate} Hz")]
    InvalidFormat { channels: u16, sample_rate: u32 },
    #[error(transparent)]
    Resampler(#[from] ResamplerError),
    #[error("stream already failed")]
    Failed,
}

/// Stateful normalizer for audio that arrives in chunks.
///
/// Chunks may have any length, including partial frames: leftover samples
/// are carried over to the next call. Resampler state is preserved between
/// chunks so concatenating every [`push`](Self::push) output followed by
/// [`finish`](Self::finish) equals normalizing the whole stream at once.
pub struct StreamNormalizer {
    format: AudioFormat,
    weights: StereoWeights,
    resampler: Option<StreamingResampler<f32>>,
    /// Interleaved samples that did not complete a frame yet.
    carry: Vec<f32>,
    /// Leading output samples still to be discarded as filter latency.
    pending_delay: usize,
    input_frames: u64,
    emitted: u64,
    failed: bool,
}

impl StreamNormalizer {
    /// Creates a normalizer for a stream in `format`.
    ///
    /// # Errors
    /// Returns [`NormalizeError::InvalidFormat`] when the format declares zero
    /// channels or a zero sample rate, or a resampler error when no resampler
    /// can be built for the rate pair.
    pub fn new(
        format: AudioFormat,
        weights: StereoWeights,
        block_size: u32,
    ) -> Result<Self, NormalizeError> {
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(NormalizeError::InvalidFormat {
                channels: format.channels,
                sample_rate: format.sample_rate,
            });
        }

        let resampler = if format.sample_rate == TARGET_SAMPLE_RATE {
            None
        } else {
            Some(StreamingResampler::new(
                format.sample_rate,
                TARGET_SAMPLE_RATE,
                block_size.max(1),
            )?)
        };
        let pending_delay = resampler
            .as_ref()
            .map(|resampler| resampler.output_delay())
            .unwrap_or(0);

        Ok(Self {
            format,
            weights,
            resampler,
            carry: Vec::new(),
            pending_delay,
            input_frames: 0,
            emitted: 0,
            failed: false,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Number of canonical samples the stream should hold once finished.
    fn expected_output(&self) -> u64 {
        let rate = self.format.sample_rate as u64;
        (self.input_frames * TARGET_SAMPLE_RATE as u64 + rate / 2) / rate
    }

    /// Normalizes one chunk of interleaved samples.
    ///
    /// Returns the canonical samples that became available; the resampler may
    /// hold some back until more input arrives or the stream is finished.
    pub fn try_push(&mut self, chunk: &[f32]) -> Result<Vec<f32>, NormalizeError> {
        if self.failed {
            return Err(NormalizeError::Failed);
        }

        let channels = self.format.channels as usize;
        let mono = if self.carry.is_empty() && chunk.len() % channels == 0 {
            mixer::downmix(chunk, self.format.channels, self.weights)
        } else {
            self.carry.extend_from_slice(chunk);
            let whole = self.carry.len() - self.carry.len() % channels;
            let mono = mixer::downmix(&self.carry[..whole], self.format.channels, self.weights);
            self.carry.drain(..whole);
            mono
        };
        self.input_frames += mono.len() as u64;

        let Some(resampler) = self.resampler.as_mut() else {
            self.emitted += mono.len() as u64;
            return Ok(mono);
        };

        let mut output = Vec::with_capacity(mono.len());
        let result = resampler.process_callback(&mono, &mut |resampled| {
            output.extend_from_slice(resampled)
        });
        if let Err(err) = result {
            self.failed = true;
            return Err(err.into());
        }

        Ok(self.trim_output(output))
    }

    /// Normalizes one chunk, logging and returning an empty buffer on failure.
    pub fn push(&mut self, chunk: &[f32]) -> Vec<f32> {
        self.try_push(chunk).unwrap_or_else(|err| {
            log::warn!("Dropping audio chunk that could not be normalized: {err}");
            Vec::new()
        })
    }

    /// Flushes the resampler tail and returns the remaining canonical samples.
    pub fn try_finish(&mut self) -> Result<Vec<f32>, NormalizeError> {
        if self.failed {
            return Err(NormalizeError::Failed);
        }

        self.carry.clear();
        let expected = self.expected_output();
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };

        let mut output = Vec::new();
        let mut blocks = 0;
        while self.emitted + (output.len() as u64) < expected && blocks < MAX_FLUSH_BLOCKS {
            let before = output.len();
            if let Err(err) = resampler.flush_block(&mut |resampled| {
                output.extend_from_slice(resampled)
            }) {
                self.failed = true;
                return Err(err.into());
            }
            blocks += 1;

            let fresh = output.len() - before;
            let delay_eaten = fresh.min(self.pending_delay);
            self.pending_delay -= delay_eaten;
            output.drain(before..before + delay_eaten);
        }

        let remaining = expected.saturating_sub(self.emitted) as usize;
        output.truncate(remaining);
        self.emitted += output.len() as u64;
        Ok(output)
    }

    /// Flushes the stream, logging and returning an empty buffer on failure.
    pub fn finish(&mut self) -> Vec<f32> {
        self.try_finish().unwrap_or_else(|err| {
            log::warn!("Failed to flush normalized audio stream: {err}");
            Vec::new()
        })
    }

    /// Drops filter latency from the head of the stream and never emits more
    /// samples than the input so far accounts for.
    fn trim_output(&mut self, mut output: Vec<f32>) -> Vec<f32> {
        if self.pending_delay > 0 {
            let eaten = output.len().min(self.pending_delay);
            output.drain(..eaten);
            self.pending_delay -= eaten;
        }

        let allowed = self.expected_output().saturating_sub(self.emitted) as usize;
        output.truncate(allowed);
        self.emitted += output.len() as u64;
        output
    }
}

/// Converts a complete interleaved buffer into canonical audio.
///
/// # Errors
/// Returns [`NormalizeError`] if the format is invalid or resampling fails.
pub fn try_normalize(
    samples: &[f32],
    format: AudioFormat,
    weights: StereoWeights,
    block_size: u32,
) -> Result<Vec<f32>, NormalizeError> {
    let mut normalizer = StreamNormalizer::new(format, weights, block_size)?;
    let mut output = normalizer.try_push(samples)?;
    output.extend(normalizer.try_finish()?);
    Ok(output)
}

/// Converts a complete interleaved buffer into canonical audio.
///
/// Any failure is logged and reported as an empty buffer; callers treat empty
/// output as "could not decode".
pub fn normalize(samples: &[f32], format: AudioFormat, weights: StereoWeights) -> Vec<f32> {
    match try_normalize(samples, format, weights, DEFAULT_RESAMPLER_BLOCK) {
        Ok(output) => output,
        Err(err) => {
            log::warn!("Could not normalize {} samples ({format}): {err}", samples.len());
            Vec::new()
        }
    }
}
