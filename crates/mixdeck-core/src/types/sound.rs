//! In-memory sound storage.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use super::frame::{Frame, FrameFormat, SILENCE};

/// A fully decoded sound held in memory.
///
/// Frames are stored in the fixed-size `Frame` layout regardless of channel
/// count, which keeps random access by frame index trivial.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundBuffer {
    sample_rate: u32,
    format: FrameFormat,
    frames: Vec<Frame>,
    loop_start: usize,
    loop_end: usize,
}

impl SoundBuffer {
    /// Create a silent buffer of `length` frames that loops over its whole length.
    pub fn new(sample_rate: u32, format: FrameFormat, length: usize) -> Self {
        Self::with_loop(sample_rate, format, length, 0, length)
    }

    /// Create a silent buffer with explicit loop points.
    ///
    /// Loop points are clamped into `0..=length` and ordered.
    pub fn with_loop(
        sample_rate: u32,
        format: FrameFormat,
        length: usize,
        loop_start: usize,
        loop_end: usize,
    ) -> Self {
        let loop_end = loop_end.min(length);
        Self {
            sample_rate,
            format,
            frames: vec![SILENCE; length],
            loop_start: loop_start.min(loop_end),
            loop_end,
        }
    }

    /// Build a buffer from existing frames.
    pub fn from_frames(sample_rate: u32, format: FrameFormat, frames: Vec<Frame>) -> Self {
        let length = frames.len();
        Self {
            sample_rate,
            format,
            frames,
            loop_start: 0,
            loop_end: length,
        }
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn format(&self) -> FrameFormat {
        self.format
    }

    /// Length in frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub const fn loop_start(&self) -> usize {
        self.loop_start
    }

    pub const fn loop_end(&self) -> usize {
        self.loop_end
    }

    /// Frame at `index`, or `None` past the end.
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Overwrite the frame at `index`. Writes past the end are ignored.
    pub fn set_frame(&mut self, index: usize, frame: Frame) {
        if let Some(slot) = self.frames.get_mut(index) {
            *slot = frame;
        }
    }

    /// Append a frame, growing the buffer. The loop end follows the length
    /// when it was tracking it.
    pub fn push(&mut self, frame: Frame) {
        let tracking = self.loop_end == self.frames.len();
        self.frames.push(frame);
        if tracking {
            self.loop_end = self.frames.len();
        }
    }

    /// Move the loop points, clamped into `0..=len()` and ordered.
    pub fn set_loop(&mut self, loop_start: usize, loop_end: usize) {
        self.loop_end = loop_end.min(self.frames.len());
        self.loop_start = loop_start.min(self.loop_end);
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_silent() {
        let buffer = SoundBuffer::new(44100, FrameFormat::Mono, 4);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.loop_end(), 4);
        assert!(buffer.frames().iter().all(|f| *f == SILENCE));
    }

    #[test]
    fn test_loop_points_clamped() {
        let buffer = SoundBuffer::with_loop(44100, FrameFormat::Stereo, 10, 12, 20);
        assert_eq!(buffer.loop_end(), 10);
        assert_eq!(buffer.loop_start(), 10);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_set_and_push() {
        let mut buffer = SoundBuffer::new(48000, FrameFormat::Stereo, 2);
        buffer.set_frame(1, [0.5, -0.5]);
        buffer.set_frame(9, [1.0, 1.0]);
        buffer.push([0.25, 0.25]);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.loop_end(), 3);
        assert_eq!(buffer.frame(1).unwrap(), &[0.5, -0.5]);
        assert!(buffer.frame(3).is_none());
    }
}
