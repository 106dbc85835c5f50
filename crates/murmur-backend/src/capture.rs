//! Live microphone capture.
//!
//! The cpal stream lives on a dedicated thread for its whole life. Its
//! callback only copies samples into a ring buffer; the same thread drains
//! the ring and forwards chunks to the session's queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use cpal::traits::StreamTrait;
use murmur_audio::TARGET_SAMPLE_RATE;
use murmur_audio::device::{self, DeviceError, HostInputDevice};
use ringbuf_blocking::{
    BlockingHeapRb,
    traits::{Consumer, Producer, Split},
};

use crate::session::ChunkSender;

/// Seconds of device audio the ring holds before the callback starts
/// dropping samples.
const RING_SECONDS: usize = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("failed to spawn the capture thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("capture thread exited before the stream started")]
    Exited,
}

/// A running input stream feeding one recording.
pub struct LiveCapture {
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl LiveCapture {
    /// Opens `device` and starts forwarding its interleaved samples to
    /// `sender`. Blocks until the stream is playing.
    ///
    /// Capture ends on [`stop`](Self::stop) or once the recording stops
    /// accepting chunks.
    pub fn start(device: HostInputDevice, sender: ChunkSender) -> Result<Self, CaptureError> {
        let format = device.input_format()?;
        let channels = format.channels.max(1) as usize;
        let capacity = format.sample_rate as usize * channels * RING_SECONDS;
        // ~100ms per forwarded chunk
        let chunk_len = (format.sample_rate as usize / 10).max(1) * channels;

        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let worker_running = running.clone();
        let worker = thread::Builder::new()
            .name("murmur-capture".into())
            .spawn(move || {
                let (mut producer, mut consumer) = BlockingHeapRb::<f32>::new(capacity).split();
                let dropped = Arc::new(AtomicUsize::new(0));
                let callback_dropped = dropped.clone();

                let stream = device::open_cpal_input_stream(
                    &device,
                    TARGET_SAMPLE_RATE,
                    move |data: &[f32]| {
                        let pushed = producer.push_slice(data);
                        if pushed < data.len() {
                            callback_dropped.fetch_add(data.len() - pushed, Ordering::Relaxed);
                        }
                    },
                    |error| {
                        log::error!("An error occured while processing the input stream data: {error}");
                    },
                )
                .and_then(|stream| {
                    stream.play()?;
                    Ok(stream)
                });
                let stream = match stream {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                log::info!("Capturing from {device}");

                let mut buffer = vec![0.0f32; chunk_len];
                let mut reported = 0;
                while worker_running.load(Ordering::Acquire) {
                    let len = consumer.pop_slice(&mut buffer);
                    if len == 0 {
                        thread::sleep(POLL_INTERVAL);
                        continue;
                    }

                    let total_dropped = dropped.load(Ordering::Relaxed);
                    if total_dropped > reported {
                        log::warn!(
                            "Input ring overflowed, {} samples were dropped",
                            total_dropped - reported
                        );
                        reported = total_dropped;
                    }

                    if !sender.blocking_send(buffer[..len].to_vec()) {
                        log::debug!("Recording no longer accepts audio");
                        break;
                    }
                }

                drop(stream);
                log::info!("Stopped capturing from {device}");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                running,
                worker: Some(worker),
            }),
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err.into())
            }
            Err(_) => {
                let _ = worker.join();
                Err(CaptureError::Exited)
            }
        }
    }

    /// Stops the stream and waits for the capture thread to exit.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            log::error!("Capture thread panicked");
        }
    }
}

impl Drop for LiveCapture {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
