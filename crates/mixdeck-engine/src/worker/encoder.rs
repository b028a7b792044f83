//! Encoder that writes behind playback on its own thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mixdeck_core::{AudioEncoder, Frame, FrameFormat, Result};
use tracing::info;

use super::WorkerThread;
use crate::config::WorkerConfig;
use crate::queue::{spsc_queue, Consumer, Producer};

#[derive(Debug)]
struct EncoderShared {
    run: AtomicBool,
    ended: AtomicBool,
    error: AtomicBool,
}

/// An [`AudioEncoder`] whose encoding happens on a background thread.
///
/// Dropping it waits until every frame already sent has reached the
/// wrapped encoder.
pub struct AsyncEncoder {
    frames: Producer<Frame>,
    shared: Arc<EncoderShared>,
    worker: WorkerThread,
    sample_rate: u32,
    format: FrameFormat,
}

impl AsyncEncoder {
    pub fn new(encoder: Box<dyn AudioEncoder>) -> Result<Self> {
        Self::with_config(encoder, WorkerConfig::default())
    }

    pub fn with_config(encoder: Box<dyn AudioEncoder>, config: WorkerConfig) -> Result<Self> {
        config.validate()?;

        let sample_rate = encoder.sample_rate();
        let format = encoder.format();
        let (frames, frame_rx) = spsc_queue(config.capacity(sample_rate));
        let shared = Arc::new(EncoderShared {
            run: AtomicBool::new(true),
            ended: AtomicBool::new(false),
            error: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let idle = Duration::from_millis(config.underrun_sleep_ms.max(1));
        let worker = WorkerThread::spawn("async-encoder", move || {
            encode_behind(encoder, &frame_rx, &worker_shared, idle);
        })?;

        Ok(Self {
            frames,
            shared,
            worker,
            sample_rate,
            format,
        })
    }
}

impl AudioEncoder for AsyncEncoder {
    /// Queue a frame, spinning while the queue is full. Frames are dropped
    /// once the encoder has ended or failed.
    fn send(&mut self, frame: &Frame) {
        while self.frames.try_push(*frame).is_err() {
            if self.error_occurred() || self.ended() {
                return;
            }
            self.worker.wake();
            thread::yield_now();
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn format(&self) -> FrameFormat {
        self.format
    }

    fn error_occurred(&self) -> bool {
        self.shared.error.load(Ordering::Acquire)
    }

    fn ended(&self) -> bool {
        self.shared.ended.load(Ordering::Acquire)
    }
}

impl Drop for AsyncEncoder {
    fn drop(&mut self) {
        self.shared.run.store(false, Ordering::Release);
        self.worker.join();
    }
}

/// Worker loop: move queued frames into the encoder until told to stop,
/// then flush what is left.
fn encode_behind(
    mut encoder: Box<dyn AudioEncoder>,
    frames: &Consumer<Frame>,
    shared: &EncoderShared,
    idle: Duration,
) {
    info!(
        "Async encoder started ({} Hz, {:?})",
        encoder.sample_rate(),
        encoder.format()
    );

    let mut written = 0u64;
    loop {
        // Read the flag first: frames sent before the stop are then visible
        // to the drain below.
        let running = shared.run.load(Ordering::Acquire);

        let mut wrote = false;
        while let Some(frame) = frames.try_pop() {
            encoder.send(&frame);
            written += 1;
            wrote = true;
        }

        if encoder.ended() {
            shared.ended.store(true, Ordering::Release);
        }
        if encoder.error_occurred() {
            shared.error.store(true, Ordering::Release);
        }

        if !running {
            break;
        }
        if !wrote {
            thread::park_timeout(idle);
        }
    }

    info!("Async encoder stopped after {written} frames");
}
