//! Source, sink and codec contracts consumed by the engine.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::types::{Frame, FrameFormat, ParameterValue, SoundBuffer, SILENCE};
use crate::{Error, Result};

/// A source of frames, pulled once per tick by the engine thread.
pub trait AudioInput: Send {
    /// Fill `output` with the next frame.
    fn get(&mut self, output: &mut Frame);

    fn set_sample_rate(&mut self, sample_rate: u32);

    fn set_parameter(&mut self, _id: usize, _value: ParameterValue) {}

    fn output_value(&self, _id: usize) -> ParameterValue {
        ParameterValue::default()
    }

    /// Sticky error flag.
    fn error_occurred(&self) -> bool;

    fn is_playing(&self) -> bool;

    fn format(&self) -> FrameFormat;
}

/// A sink of frames, flushed once per tick by the engine thread.
///
/// `send` may block; a blocking sink is what paces the engine loop.
pub trait AudioOutput: Send {
    fn send(&mut self, frame: &Frame);

    fn set_sample_rate(&mut self, sample_rate: u32);

    fn set_parameter(&mut self, _id: usize, _value: ParameterValue) {}

    fn output_value(&self, _id: usize) -> ParameterValue {
        ParameterValue::default()
    }

    /// Sticky error flag.
    fn error_occurred(&self) -> bool;

    fn ended(&self) -> bool;

    fn format(&self) -> FrameFormat;
}

/// Frame-by-frame access to a decoded stream.
pub trait AudioDecoder: Send {
    /// Fill `output` with the next frame; false at end of stream.
    fn get(&mut self, output: &mut Frame) -> bool;

    /// Jump to a frame position.
    fn seek(&mut self, position: u64);

    /// Length in frames.
    fn length(&self) -> u64;

    fn sample_rate(&self) -> u32;

    /// Current frame position.
    fn position(&self) -> u64;

    fn loop_start(&self) -> u64 {
        0
    }

    fn loop_end(&self) -> u64 {
        self.length()
    }

    fn set_looped(&mut self, looped: bool);

    fn error_occurred(&self) -> bool;

    fn format(&self) -> FrameFormat;
}

/// Frame-by-frame writer to an encoded stream.
pub trait AudioEncoder: Send {
    fn send(&mut self, frame: &Frame);

    fn sample_rate(&self) -> u32;

    fn format(&self) -> FrameFormat;

    fn error_occurred(&self) -> bool;

    fn ended(&self) -> bool;
}

/// Frames reserved up front by [`decode_sound`]; longer streams grow as they decode.
const MAX_PREALLOCATED_FRAMES: u64 = 1 << 20;

/// Decode a whole stream into memory.
pub fn decode_sound(decoder: &mut dyn AudioDecoder) -> Result<SoundBuffer> {
    let reserved = decoder.length().min(MAX_PREALLOCATED_FRAMES);
    let mut frames = Vec::with_capacity(reserved as usize);
    let mut frame = SILENCE;
    while decoder.get(&mut frame) {
        frames.push(frame);
    }

    if decoder.error_occurred() {
        return Err(Error::AudioDecode(
            "Decoder reported an error while decoding".to_string(),
        ));
    }

    let mut sound = SoundBuffer::from_frames(decoder.sample_rate(), decoder.format(), frames);
    sound.set_loop(decoder.loop_start() as usize, decoder.loop_end() as usize);
    Ok(sound)
}

/// Write a whole buffer through an encoder.
pub fn encode_sound(encoder: &mut dyn AudioEncoder, sound: &SoundBuffer) -> Result<()> {
    if encoder.sample_rate() != sound.sample_rate() {
        return Err(Error::AudioEncode(format!(
            "Sample rate mismatch: encoder {} Hz, sound {} Hz",
            encoder.sample_rate(),
            sound.sample_rate()
        )));
    }
    if encoder.format() != sound.format() {
        return Err(Error::AudioEncode(format!(
            "Format mismatch: encoder {:?}, sound {:?}",
            encoder.format(),
            sound.format()
        )));
    }

    for frame in sound.frames() {
        encoder.send(frame);
    }

    if encoder.error_occurred() {
        return Err(Error::AudioEncode(
            "Encoder reported an error while encoding".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingDecoder {
        remaining: u64,
        position: u64,
        length: u64,
        fail: bool,
    }

    impl AudioDecoder for CountingDecoder {
        fn get(&mut self, output: &mut Frame) -> bool {
            if self.remaining == 0 {
                return false;
            }
            self.remaining -= 1;
            self.position += 1;
            *output = [self.position as f32, 0.0];
            true
        }

        fn seek(&mut self, position: u64) {
            self.position = position;
        }

        fn length(&self) -> u64 {
            self.length
        }

        fn sample_rate(&self) -> u32 {
            8000
        }

        fn position(&self) -> u64 {
            self.position
        }

        fn loop_start(&self) -> u64 {
            1
        }

        fn set_looped(&mut self, _looped: bool) {}

        fn error_occurred(&self) -> bool {
            self.fail
        }

        fn format(&self) -> FrameFormat {
            FrameFormat::Mono
        }
    }

    #[derive(Default)]
    struct VecEncoder {
        frames: Vec<Frame>,
    }

    impl AudioEncoder for VecEncoder {
        fn send(&mut self, frame: &Frame) {
            self.frames.push(*frame);
        }

        fn sample_rate(&self) -> u32 {
            8000
        }

        fn format(&self) -> FrameFormat {
            FrameFormat::Mono
        }

        fn error_occurred(&self) -> bool {
            false
        }

        fn ended(&self) -> bool {
            false
        }
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_decode_sound() {
        let mut decoder = CountingDecoder {
            remaining: 3,
            position: 0,
            length: 3,
            fail: false,
        };
        let sound = decode_sound(&mut decoder).unwrap();
        assert_eq!(sound.len(), 3);
        assert_eq!(sound.sample_rate(), 8000);
        assert_eq!(sound.loop_start(), 1);
        assert_eq!(sound.loop_end(), 3);
        assert_eq!(sound.frame(2).unwrap()[0], 3.0);
    }

    #[test]
    fn test_decode_sound_error() {
        let mut decoder = CountingDecoder {
            remaining: 1,
            position: 0,
            length: 3,
            fail: true,
        };
        assert!(matches!(
            decode_sound(&mut decoder),
            Err(Error::AudioDecode(_))
        ));
    }

    #[test]
    fn test_decode_sound_ignores_inflated_length() {
        let mut decoder = CountingDecoder {
            remaining: 2,
            position: 0,
            length: u64::MAX,
            fail: false,
        };
        let sound = decode_sound(&mut decoder).unwrap();
        assert_eq!(sound.len(), 2);
        assert_eq!(sound.loop_end(), 2);
    }

    #[test]
    fn test_encode_sound() {
        let sound = SoundBuffer::from_frames(8000, FrameFormat::Mono, vec![[0.1, 0.0]; 5]);
        let mut encoder = VecEncoder::default();
        encode_sound(&mut encoder, &sound).unwrap();
        assert_eq!(encoder.frames.len(), 5);

        let wrong_rate = SoundBuffer::new(44100, FrameFormat::Mono, 1);
        assert!(encode_sound(&mut encoder, &wrong_rate).is_err());
    }
}
