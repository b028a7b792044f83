//! Decoder that runs ahead of playback on its own thread.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mixdeck_core::{AudioDecoder, Frame, FrameFormat, Result, SILENCE};
use tracing::{debug, info, trace};

use super::WorkerThread;
use crate::config::WorkerConfig;
use crate::queue::{spsc_queue, Consumer, Producer};

/// Control messages are rare; this only has to absorb short bursts.
const CONTROL_QUEUE_CAPACITY: usize = 32;

/// Requests from the consumer to the decoding thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderControl {
    /// Jump to `position`. Frames tagged with an older epoch are stale.
    Seek { epoch: u32, position: u64 },
    SetLooped(bool),
}

/// A decoded frame and where it came from.
#[derive(Debug, Clone, Copy)]
struct Decoded {
    epoch: u32,
    position: u64,
    frame: Frame,
}

#[derive(Debug)]
struct DecoderShared {
    run: AtomicBool,
    /// The wrapped decoder ran out of frames in the current epoch.
    ended: AtomicBool,
    error: AtomicBool,
    /// Number of control messages the worker has applied.
    applied: AtomicU32,
}

/// An [`AudioDecoder`] whose decoding happens on a background thread.
///
/// Stream properties are captured when the decoder is wrapped. `get` never
/// waits longer than the configured underrun budget; if the worker falls
/// behind further, silence is returned in place of the late frame.
pub struct AsyncDecoder {
    frames: Consumer<Decoded>,
    control: Producer<DecoderControl>,
    shared: Arc<DecoderShared>,
    worker: WorkerThread,
    config: WorkerConfig,
    epoch: u32,
    /// Number of control messages sent to the worker.
    sent: u32,
    position: u64,
    length: u64,
    sample_rate: u32,
    format: FrameFormat,
    loop_start: u64,
    loop_end: u64,
}

impl AsyncDecoder {
    pub fn new(decoder: Box<dyn AudioDecoder>, looped: bool) -> Result<Self> {
        Self::with_config(decoder, looped, WorkerConfig::default())
    }

    pub fn with_config(
        mut decoder: Box<dyn AudioDecoder>,
        looped: bool,
        config: WorkerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let sample_rate = decoder.sample_rate();
        let (frame_tx, frames) = spsc_queue(config.capacity(sample_rate));
        let (control, control_rx) = spsc_queue(CONTROL_QUEUE_CAPACITY);
        let shared = Arc::new(DecoderShared {
            run: AtomicBool::new(true),
            ended: AtomicBool::new(false),
            error: AtomicBool::new(false),
            applied: AtomicU32::new(0),
        });

        let length = decoder.length();
        let format = decoder.format();
        let loop_start = decoder.loop_start();
        let loop_end = decoder.loop_end();
        let position = decoder.position();
        decoder.set_looped(looped);

        let worker_shared = Arc::clone(&shared);
        let idle = Duration::from_millis(config.idle_sleep_ms);
        let worker = WorkerThread::spawn("async-decoder", move || {
            decode_ahead(decoder, &frame_tx, &control_rx, &worker_shared, idle);
        })?;

        Ok(Self {
            frames,
            control,
            shared,
            worker,
            config,
            epoch: 0,
            sent: 0,
            position,
            length,
            sample_rate,
            format,
            loop_start,
            loop_end,
        })
    }

    fn send_control(&mut self, message: DecoderControl) {
        self.control.wait_and_push(message);
        self.sent = self.sent.wrapping_add(1);
        self.worker.wake();
    }

    fn accept(&mut self, decoded: &Decoded, output: &mut Frame) {
        *output = decoded.frame;
        self.position = decoded.position + 1;
    }
}

impl AudioDecoder for AsyncDecoder {
    fn get(&mut self, output: &mut Frame) -> bool {
        if self.shared.error.load(Ordering::Acquire) {
            return false;
        }

        let mut retries = 0;
        loop {
            if let Some(decoded) = self.frames.try_pop() {
                if decoded.epoch == self.epoch {
                    self.accept(&decoded, output);
                    return true;
                }
                continue;
            }

            // `ended` describes the worker's state before any control message
            // still in flight; it can only be trusted once all are applied.
            let caught_up = self.shared.applied.load(Ordering::Acquire) == self.sent;
            if caught_up && self.shared.ended.load(Ordering::Acquire) {
                // Everything pushed before `ended` is visible now.
                match self.frames.try_pop() {
                    Some(decoded) if decoded.epoch == self.epoch => {
                        self.accept(&decoded, output);
                        return true;
                    }
                    Some(_) => continue,
                    None => return false,
                }
            }

            if retries >= self.config.underrun_retries {
                trace!("Async decoder underrun, playing silence");
                *output = SILENCE;
                return true;
            }
            retries += 1;
            self.worker.wake();
            thread::sleep(Duration::from_millis(self.config.underrun_sleep_ms));
        }
    }

    fn seek(&mut self, position: u64) {
        self.epoch = self.epoch.wrapping_add(1);
        self.position = position;
        self.send_control(DecoderControl::Seek {
            epoch: self.epoch,
            position,
        });
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn loop_start(&self) -> u64 {
        self.loop_start
    }

    fn loop_end(&self) -> u64 {
        self.loop_end
    }

    fn set_looped(&mut self, looped: bool) {
        self.send_control(DecoderControl::SetLooped(looped));
    }

    fn error_occurred(&self) -> bool {
        self.shared.error.load(Ordering::Acquire)
    }

    fn format(&self) -> FrameFormat {
        self.format
    }
}

impl Drop for AsyncDecoder {
    fn drop(&mut self) {
        self.shared.run.store(false, Ordering::Release);
        self.worker.join();
    }
}

/// Worker loop: apply control messages, refill the queue, sleep.
fn decode_ahead(
    mut decoder: Box<dyn AudioDecoder>,
    frames: &Producer<Decoded>,
    control: &Consumer<DecoderControl>,
    shared: &DecoderShared,
    idle: Duration,
) {
    info!(
        "Async decoder started ({} frames at {} Hz)",
        decoder.length(),
        decoder.sample_rate()
    );

    let mut epoch = 0u32;
    let mut pending: Option<Decoded> = None;

    while shared.run.load(Ordering::Acquire) {
        while let Some(message) = control.try_pop() {
            match message {
                DecoderControl::Seek {
                    epoch: next,
                    position,
                } => {
                    decoder.seek(position);
                    pending = None;
                    shared.ended.store(false, Ordering::Release);
                    shared.error.store(false, Ordering::Release);
                    epoch = next;
                    debug!("Async decoder seeked to frame {position}");
                }
                DecoderControl::SetLooped(looped) => {
                    decoder.set_looped(looped);
                    if looped {
                        shared.ended.store(false, Ordering::Release);
                    }
                }
            }
            shared.applied.fetch_add(1, Ordering::AcqRel);
        }

        while !shared.ended.load(Ordering::Acquire) {
            let decoded = match pending.take() {
                Some(decoded) => decoded,
                None => {
                    let mut frame = SILENCE;
                    if !decoder.get(&mut frame) {
                        shared.ended.store(true, Ordering::Release);
                        break;
                    }
                    Decoded {
                        epoch,
                        position: decoder.position().saturating_sub(1),
                        frame,
                    }
                }
            };

            if let Err(decoded) = frames.try_push(decoded) {
                pending = Some(decoded);
                break;
            }
            if !shared.run.load(Ordering::Acquire) {
                return;
            }
        }

        if decoder.error_occurred() {
            shared.error.store(true, Ordering::Release);
        }

        thread::park_timeout(idle);
    }

    info!("Async decoder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::BufferDecoder;
    use mixdeck_core::SoundBuffer;

    #[allow(clippy::cast_precision_loss)]
    fn ramp(length: usize) -> BufferDecoder {
        let frames = (0..length).map(|i| [i as f32, 0.0]).collect();
        BufferDecoder::new(SoundBuffer::from_frames(1000, FrameFormat::Mono, frames))
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            buffered_ms: 4,
            idle_sleep_ms: 1,
            underrun_sleep_ms: 1,
            underrun_retries: 1000,
        }
    }

    fn spawn(length: usize, looped: bool) -> AsyncDecoder {
        AsyncDecoder::with_config(Box::new(ramp(length)), looped, fast_config()).unwrap()
    }

    fn drain(decoder: &mut AsyncDecoder) -> Vec<f32> {
        let mut frame = SILENCE;
        let mut out = Vec::new();
        while decoder.get(&mut frame) {
            out.push(frame[0]);
            assert!(out.len() < 10_000);
        }
        out
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_reads_whole_stream_in_order() {
        let mut decoder = spawn(50, false);
        assert_eq!(decoder.length(), 50);
        assert_eq!(decoder.sample_rate(), 1000);

        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 50);
        assert_eq!(frames[0], 0.0);
        assert_eq!(frames[49], 49.0);
        assert_eq!(decoder.position(), 50);
    }

    #[test]
    #[allow(clippy::float_cmp, clippy::cast_precision_loss)]
    fn test_seek_discards_stale_frames() {
        let mut decoder = spawn(50, false);
        let mut frame = SILENCE;
        assert!(decoder.get(&mut frame));

        decoder.seek(40);
        assert_eq!(decoder.position(), 40);
        let frames = drain(&mut decoder);
        assert_eq!(frames, (40..50).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_seek_after_end_restarts() {
        let mut decoder = spawn(5, false);
        assert_eq!(drain(&mut decoder).len(), 5);

        decoder.seek(0);
        assert_eq!(drain(&mut decoder).len(), 5);
    }

    #[test]
    fn test_looped_keeps_going() {
        let mut decoder = spawn(5, true);
        let mut frame = SILENCE;
        for _ in 0..23 {
            assert!(decoder.get(&mut frame));
        }

        // At most what was queued, one held-back frame, and the rest of
        // the current pass.
        decoder.set_looped(false);
        let rest = drain(&mut decoder);
        assert!(rest.len() <= fast_config().capacity(1000) + 1 + 5);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_set_looped_revives_ended_stream() {
        for _ in 0..20 {
            let mut decoder = spawn(5, false);
            assert_eq!(drain(&mut decoder).len(), 5);

            decoder.set_looped(true);
            let mut frame = [9.0, 9.0];
            assert!(decoder.get(&mut frame));
            assert_eq!(frame, [0.0, 0.0]);
            assert!(decoder.get(&mut frame));
            assert_eq!(frame[0], 1.0);
        }
    }

    #[test]
    fn test_oversized_buffer_is_config_error() {
        let config = WorkerConfig {
            buffered_ms: u64::MAX,
            ..fast_config()
        };
        let result = AsyncDecoder::with_config(Box::new(ramp(5)), false, config);
        assert!(matches!(result, Err(mixdeck_core::Error::Config(_))));
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_underrun_returns_silence() {
        let config = WorkerConfig {
            buffered_ms: 4,
            idle_sleep_ms: 1000,
            underrun_sleep_ms: 1,
            underrun_retries: 0,
        };
        let mut decoder = AsyncDecoder::with_config(Box::new(ramp(500)), false, config).unwrap();
        let mut frame = [9.0, 9.0];
        let mut silent = 0;
        for _ in 0..20 {
            assert!(decoder.get(&mut frame));
            if frame == SILENCE {
                silent += 1;
            }
        }
        assert!(silent > 0);
    }
}
