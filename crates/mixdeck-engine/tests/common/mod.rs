//! Shared fixtures for engine integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::panic)]

use std::sync::{Arc, Once};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use mixdeck_core::{
    is_silent, AudioEncoder, AudioInput, Effect, Frame, FrameFormat, ParameterValue, SILENCE,
};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

pub const RATE: u32 = 1000;

/// Upper bound on frames skipped while waiting for commands to land.
pub const MAX_FRAMES: usize = 100_000;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Constant source. Parameter 0 switches it on and off.
pub struct Constant {
    pub value: f32,
    pub format: FrameFormat,
    pub playing: bool,
}

impl Constant {
    pub fn mono(value: f32) -> Box<dyn AudioInput> {
        Box::new(Self {
            value,
            format: FrameFormat::Mono,
            playing: true,
        })
    }
}

impl AudioInput for Constant {
    fn get(&mut self, output: &mut Frame) {
        *output = if self.playing {
            [self.value, self.value]
        } else {
            SILENCE
        };
    }

    fn set_sample_rate(&mut self, _sample_rate: u32) {}

    fn set_parameter(&mut self, id: usize, value: ParameterValue) {
        if id == 0 {
            self.playing = value.as_bool();
        }
    }

    fn error_occurred(&self) -> bool {
        false
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn format(&self) -> FrameFormat {
        self.format
    }
}

/// Stereo gain. Parameter 0 sets the gain, output value 0 reads it back.
#[derive(Clone)]
pub struct Gain {
    pub gain: f32,
    pub tail: u32,
}

impl Effect for Gain {
    fn input_format(&self) -> FrameFormat {
        FrameFormat::Stereo
    }

    fn output_format(&self) -> FrameFormat {
        FrameFormat::Stereo
    }

    fn process(&mut self, input: &Frame, output: &mut Frame) {
        *output = [input[0] * self.gain, input[1] * self.gain];
    }

    fn set_sample_rate(&mut self, _sample_rate: u32) {}

    fn tail_time(&self) -> u32 {
        self.tail
    }

    fn set_parameter(&mut self, id: usize, value: ParameterValue) {
        if id == 0 {
            self.gain = value.as_float() as f32;
        }
    }

    fn output_value(&self, id: usize) -> ParameterValue {
        if id == 0 {
            ParameterValue::float(f64::from(self.gain))
        } else {
            ParameterValue::default()
        }
    }

    fn clone_box(&self) -> Box<dyn Effect> {
        Box::new(self.clone())
    }
}

/// Encoder that records into memory and ends after `limit` non-silent frames.
#[derive(Clone)]
pub struct RecordingEncoder {
    pub frames: Arc<Mutex<Vec<Frame>>>,
    pub limit: usize,
}

impl RecordingEncoder {
    pub fn new(limit: usize) -> Self {
        Self {
            frames: Arc::new(Mutex::new(Vec::new())),
            limit,
        }
    }
}

impl AudioEncoder for RecordingEncoder {
    fn send(&mut self, frame: &Frame) {
        if !is_silent(frame) {
            self.frames.lock().push(*frame);
        }
    }

    fn sample_rate(&self) -> u32 {
        RATE
    }

    fn format(&self) -> FrameFormat {
        FrameFormat::Stereo
    }

    fn error_occurred(&self) -> bool {
        false
    }

    fn ended(&self) -> bool {
        self.frames.lock().len() >= self.limit
    }
}

/// Receive until the first non-silent frame.
pub fn first_sound(receiver: &Receiver<Frame>) -> Frame {
    for _ in 0..MAX_FRAMES {
        let frame = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        if !is_silent(&frame) {
            return frame;
        }
    }
    panic!("no sound after {MAX_FRAMES} frames");
}

/// Receive until `count` consecutive silent frames have been seen.
pub fn wait_for_silence(receiver: &Receiver<Frame>, count: usize) {
    let mut silent = 0;
    for _ in 0..MAX_FRAMES {
        let frame = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        if is_silent(&frame) {
            silent += 1;
            if silent == count {
                return;
            }
        } else {
            silent = 0;
        }
    }
    panic!("still sounding after {MAX_FRAMES} frames");
}

/// Keep the engine ticking by consuming frames on another thread.
pub fn drain(receiver: Receiver<Frame>) -> JoinHandle<usize> {
    thread::spawn(move || receiver.iter().count())
}

/// Poll `condition` until it holds or five seconds pass.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

pub fn assert_frame_eq(actual: Frame, expected: Frame) {
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-6, "expected {expected:?}, got {actual:?}");
    }
}
