//! Channel-backed output for consuming mixed audio on another thread.

use crossbeam_channel::{bounded, Receiver, Sender};
use mixdeck_core::{AudioOutput, Frame, FrameFormat};
use tracing::debug;

/// An [`AudioOutput`] that forwards every frame into a bounded channel.
///
/// `send` blocks while the channel is full, so the receiving side sets the
/// pace of the engine loop. The output ends once the receiver is dropped.
#[derive(Debug)]
pub struct ChannelOutput {
    frames: Sender<Frame>,
    format: FrameFormat,
    sample_rate: u32,
    ended: bool,
}

impl ChannelOutput {
    pub fn bounded(format: FrameFormat, capacity: usize) -> (Self, Receiver<Frame>) {
        let (frames, receiver) = bounded(capacity);
        let output = Self {
            frames,
            format,
            sample_rate: 0,
            ended: false,
        };
        (output, receiver)
    }

    /// Rate the engine announced, or 0 before registration.
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl AudioOutput for ChannelOutput {
    fn send(&mut self, frame: &Frame) {
        if self.ended {
            return;
        }
        if self.frames.send(*frame).is_err() {
            debug!("Channel output receiver dropped");
            self.ended = true;
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    fn error_occurred(&self) -> bool {
        false
    }

    fn ended(&self) -> bool {
        self.ended
    }

    fn format(&self) -> FrameFormat {
        self.format
    }
}
