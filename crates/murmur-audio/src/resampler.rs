use std::collections::VecDeque;

use rubato::{FftFixedInOut, Resampler, ResamplerConstructionError};

/// Errors that can occur during audio resampling.
///
/// This error type represents failures caused by invalid input/output provided
/// to the resampler.
#[derive(Debug, thiserror::Error)]
pub enum ResamplerError {
    /// Failed to construct the underlying resampling engine for the requested
    /// rates and block size.
    #[error("failed to construct resampler: {0}")]
    Construction(#[from] ResamplerConstructionError),
    /// Failed to resample the provided audio samples.
    ///
    /// This error is returned when the underlying resampling engine encounters
    /// a failure while processing input samples.
    #[error("failed to resample input samples: {0}")]
    ResampleError(#[from] rubato::ResampleError),
}

/// Real-time audio stream resampler trait.
///
/// This trait defines a common interface for resampling a continuous audio
/// stream. Implementations consume input samples and deliver resampled output
/// through a user-provided callback.
pub trait AudioResampler<T: rubato::Sample>: Send {
    /// Process an input audio buffer and emit resampled output via a callback.
    ///
    /// The input slice contains mono audio samples (single channel,
    /// non-interleaved). Implementations may consume all or only part of the
    /// input immediately, depending on their internal buffering strategy.
    ///
    /// The provided callback is invoked zero or more times with contiguous
    /// slices of resampled output data.
    ///
    /// # Returns
    /// Returns the total number of output samples written during this call.
    ///
    /// # Errors
    /// Returns [`ResamplerError`] if resampling fails.
    fn process_callback(
        &mut self,
        input: &[T],
        callback: &mut dyn FnMut(&[T]),
    ) -> Result<usize, ResamplerError>;

    /// Pushes one block of silence through the resampler so that buffered
    /// input and filter latency are emitted via the callback.
    ///
    /// Callers that know how much output they expect call this repeatedly at
    /// end of stream until enough samples have been produced.
    fn flush_block(&mut self, callback: &mut dyn FnMut(&[T])) -> Result<usize, ResamplerError>;

    /// Number of leading output samples that are filter latency rather than
    /// signal.
    fn output_delay(&self) -> usize;
}

/// FFT-based streaming resampler for arbitrary input block sizes.
///
/// This resampler is designed for streaming scenarios where input buffers may
/// arrive in unpredictable sizes, including partial audio frames.
///
/// It internally buffers incoming samples in a FIFO queue and feeds the
/// resampling engine whenever enough data is available. Output samples are
/// produced as soon as possible and delivered via the callback.
pub struct StreamingResampler<T: rubato::Sample> {
    resampler: FftFixedInOut<T>,
    frames_queue: VecDeque<T>,

    input_buffer: Vec<T>,
    output_buffer: Vec<T>,
}

impl<T: rubato::Sample> StreamingResampler<T> {
    /// Creates a new FFT-based streaming resampler for mono audio.
    ///
    /// Any number of input samples may be provided per call, including zero.
    /// The `block_size` parameter controls the internal FFT processing size
    /// and therefore affects latency and performance, but it does not impose
    /// any constraints on the public API.
    ///
    /// This function performs internal memory allocations and should be called
    /// during initialization, not from a real-time audio thread.
    ///
    /// # Errors
    /// Returns [`ResamplerError::Construction`] if the resampler cannot be
    /// constructed with the given parameters.
    pub fn new(
        original_rate: u32,
        target_rate: u32,
        block_size: u32,
    ) -> Result<Self, ResamplerError> {
        let resampler = FftFixedInOut::new(
            original_rate as usize,
            target_rate as usize,
            block_size as usize,
            1, // we're using mono
        )?;

        let mut raw_input_buffer = resampler.input_buffer_allocate(true);
        let mut raw_output_buffer = resampler.output_buffer_allocate(true);
        let frames_queue = VecDeque::with_capacity(resampler.input_frames_max() * 2);

        Ok(Self {
            frames_queue,
            input_buffer: raw_input_buffer.pop().unwrap_or_default(),
            output_buffer: raw_output_buffer.pop().unwrap_or_default(),
            resampler,
        })
    }

    /// Number of input frames waiting for a complete processing block.
    pub fn queued_frames(&self) -> usize {
        self.frames_queue.len()
    }

    /// Runs every complete block currently waiting in the queue.
    fn drain_queue(&mut self, callback: &mut dyn FnMut(&[T])) -> Result<usize, ResamplerError> {
        let mut total_written = 0usize;

        loop {
            let wanted_len = self.resampler.input_frames_next();
            if self.frames_queue.len() < wanted_len {
                break;
            }

            if self.input_buffer.len() != wanted_len {
                self.input_buffer.resize(wanted_len, T::zero());
            }
            for (slot, frame_value) in self
                .input_buffer
                .iter_mut()
                .zip(self.frames_queue.drain(..wanted_len))
            {
                *slot = frame_value;
            }

            let output_wanted = self.resampler.output_frames_next();
            if self.output_buffer.len() < output_wanted {
                self.output_buffer.resize(output_wanted, T::zero());
            }

            let input_buffer = &[&self.input_buffer];
            let output_buffer = &mut [&mut self.output_buffer];
            let (_, output_written) =
                self.resampler
                    .process_into_buffer(input_buffer, output_buffer, None)?;

            // don't call callback if nothing was written
            if output_written > 0 {
                callback(&self.output_buffer[..output_written]);
                total_written += output_written;
            }
        }

        Ok(total_written)
    }
}

impl<T: rubato::Sample> AudioResampler<T> for StreamingResampler<T> {
    fn process_callback(
        &mut self,
        input: &[T],
        callback: &mut dyn FnMut(&[T]),
    ) -> Result<usize, ResamplerError> {
        self.frames_queue.extend(input.iter().copied());
        self.drain_queue(callback)
    }

    fn flush_block(&mut self, callback: &mut dyn FnMut(&[T])) -> Result<usize, ResamplerError> {
        let wanted_len = self.resampler.input_frames_next();
        let padding = wanted_len - (self.frames_queue.len() % wanted_len);
        self.frames_queue
            .extend(std::iter::repeat_n(T::zero(), padding));
        self.drain_queue(callback)
    }

    fn output_delay(&self) -> usize {
        self.resampler.output_delay()
    }
}
