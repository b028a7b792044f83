//! Frames, channel layouts, and layout conversion.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};

/// A single audio sample.
pub type Sample = f32;

/// Maximum number of channels in any frame.
pub const MAX_CHANNELS: usize = 2;

/// One sample per channel at a single point in time.
///
/// Mono frames only use the first slot; the second is kept at zero.
pub type Frame = [Sample; MAX_CHANNELS];

/// A frame of silence.
pub const SILENCE: Frame = [0.0; MAX_CHANNELS];

/// Channel layout of a frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum FrameFormat {
    Mono,
    #[default]
    Stereo,
}

impl FrameFormat {
    /// Number of channels carried by this layout.
    pub const fn channels(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }

    /// Parse a layout name ("mono" or "stereo", case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("mono") {
            Some(Self::Mono)
        } else if name.eq_ignore_ascii_case("stereo") {
            Some(Self::Stereo)
        } else {
            None
        }
    }
}

/// Convert `input` laid out as `from` into `output` laid out as `to`.
///
/// Mono is duplicated onto both stereo channels; stereo is folded to mono by
/// summing left and right. Slots beyond the target layout are zeroed.
pub fn convert_frame(input: &Frame, from: FrameFormat, output: &mut Frame, to: FrameFormat) {
    *output = SILENCE;
    match (from, to) {
        (FrameFormat::Mono, FrameFormat::Mono) => output[0] = input[0],
        (FrameFormat::Stereo, FrameFormat::Stereo) => *output = *input,
        (FrameFormat::Mono, FrameFormat::Stereo) => {
            output[0] = input[0];
            output[1] = input[0];
        }
        (FrameFormat::Stereo, FrameFormat::Mono) => output[0] = input[0] + input[1],
    }
}

/// Add `frame` into `accumulator`, channel by channel, for the given layout.
pub fn accumulate(accumulator: &mut Frame, frame: &Frame, format: FrameFormat) {
    for (acc, sample) in accumulator.iter_mut().zip(frame).take(format.channels()) {
        *acc += sample;
    }
}

/// Returns true if every channel of the frame is exactly zero.
pub fn is_silent(frame: &Frame) -> bool {
    frame.iter().all(|s| *s == 0.0)
}
