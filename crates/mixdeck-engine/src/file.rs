//! Stream-backed inputs and outputs.
//!
//! [`FileInput`] plays an [`AudioDecoder`] and [`FileOutput`] records into an
//! [`AudioEncoder`]. Either can run its codec on a background thread through
//! the `buffered` constructors. Neither resamples: a stream whose rate differs
//! from the engine's sets the sticky error flag.

use std::sync::Arc;

use mixdeck_core::{
    AudioDecoder, AudioEncoder, AudioInput, AudioOutput, Frame, FrameFormat, ParameterValue,
    Result, SoundBuffer, SILENCE,
};
use tracing::warn;

use crate::config::WorkerConfig;
use crate::worker::{AsyncDecoder, AsyncEncoder};

/// Plays a [`SoundBuffer`] held in memory, honoring its loop points.
#[derive(Debug, Clone)]
pub struct BufferDecoder {
    sound: Arc<SoundBuffer>,
    position: u64,
    looped: bool,
}

impl BufferDecoder {
    pub fn new(sound: SoundBuffer) -> Self {
        Self::from_shared(Arc::new(sound))
    }

    /// Share one decoded sound between several decoders.
    pub const fn from_shared(sound: Arc<SoundBuffer>) -> Self {
        Self {
            sound,
            position: 0,
            looped: false,
        }
    }

    pub fn sound(&self) -> &SoundBuffer {
        &self.sound
    }
}

impl AudioDecoder for BufferDecoder {
    fn get(&mut self, output: &mut Frame) -> bool {
        if self.looped && self.position == self.loop_end() {
            self.position = self.loop_start();
        }

        match self.sound.frame(self.position as usize) {
            Some(frame) => {
                *output = *frame;
                self.position += 1;
                true
            }
            None => false,
        }
    }

    fn seek(&mut self, position: u64) {
        self.position = position.min(self.length());
    }

    fn length(&self) -> u64 {
        self.sound.len() as u64
    }

    fn sample_rate(&self) -> u32 {
        self.sound.sample_rate()
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn loop_start(&self) -> u64 {
        self.sound.loop_start() as u64
    }

    fn loop_end(&self) -> u64 {
        self.sound.loop_end() as u64
    }

    fn set_looped(&mut self, looped: bool) {
        self.looped = looped;
    }

    fn error_occurred(&self) -> bool {
        false
    }

    fn format(&self) -> FrameFormat {
        self.sound.format()
    }
}

/// Linear fade to silence.
#[derive(Debug, Clone, Copy)]
struct Fade {
    remaining: u64,
    total: u64,
}

/// An [`AudioInput`] that plays a decoded stream.
///
/// Parameters: [`PLAYING`](Self::PLAYING), [`LOOPED`](Self::LOOPED),
/// [`POSITION`](Self::POSITION) and [`FADE_OUT`](Self::FADE_OUT), the last two
/// in seconds. Output values: [`GET_POSITION`](Self::GET_POSITION) and
/// [`GET_LENGTH`](Self::GET_LENGTH), in seconds.
pub struct FileInput {
    decoder: Box<dyn AudioDecoder>,
    playing: bool,
    ended: bool,
    error: bool,
    fade: Option<Fade>,
}

impl FileInput {
    pub const PLAYING: usize = 0;
    pub const LOOPED: usize = 1;
    pub const POSITION: usize = 2;
    pub const GET_POSITION: usize = 4;
    pub const GET_LENGTH: usize = 5;
    pub const FADE_OUT: usize = 6;

    /// Play `decoder` on the engine thread. Playback starts immediately.
    pub fn new(mut decoder: Box<dyn AudioDecoder>, looped: bool) -> Self {
        decoder.set_looped(looped);
        Self {
            decoder,
            playing: true,
            ended: false,
            error: false,
            fade: None,
        }
    }

    /// Play an in-memory sound.
    pub fn from_sound(sound: SoundBuffer, looped: bool) -> Self {
        Self::new(Box::new(BufferDecoder::new(sound)), looped)
    }

    /// Decode ahead on a worker thread.
    pub fn buffered(
        decoder: Box<dyn AudioDecoder>,
        looped: bool,
        config: WorkerConfig,
    ) -> Result<Self> {
        let decoder = AsyncDecoder::with_config(decoder, looped, config)?;
        Ok(Self::new(Box::new(decoder), looped))
    }

    fn seconds_to_frames(&self, value: ParameterValue) -> u64 {
        (value.as_duration().as_secs_f64() * f64::from(self.decoder.sample_rate())) as u64
    }

    fn frames_to_seconds(&self, frames: u64) -> ParameterValue {
        let rate = self.decoder.sample_rate();
        if rate == 0 {
            return ParameterValue::float(0.0);
        }
        ParameterValue::float(frames as f64 / f64::from(rate))
    }

    fn apply_fade(&mut self, output: &mut Frame) {
        let Some(fade) = self.fade.as_mut() else {
            return;
        };

        let gain = fade.remaining as f32 / fade.total as f32;
        for sample in output.iter_mut() {
            *sample *= gain;
        }

        fade.remaining = fade.remaining.saturating_sub(1);
        if fade.remaining == 0 {
            self.fade = None;
            self.ended = true;
        }
    }
}

impl AudioInput for FileInput {
    fn get(&mut self, output: &mut Frame) {
        if !self.playing || self.ended {
            *output = SILENCE;
            return;
        }

        if !self.decoder.get(output) {
            *output = SILENCE;
            self.ended = true;
        }
        if self.decoder.error_occurred() {
            self.error = true;
        }

        self.apply_fade(output);
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate != self.decoder.sample_rate() {
            warn!(
                "File input is {} Hz but the engine runs at {sample_rate} Hz",
                self.decoder.sample_rate()
            );
            self.error = true;
        }
    }

    fn set_parameter(&mut self, id: usize, value: ParameterValue) {
        match id {
            Self::PLAYING => self.playing = value.as_bool(),
            Self::LOOPED => {
                self.decoder.set_looped(value.as_bool());
                self.ended = false;
            }
            Self::POSITION => {
                let position = self.seconds_to_frames(value);
                self.decoder.seek(position);
                self.ended = false;
            }
            Self::FADE_OUT => {
                let total = self.seconds_to_frames(value);
                if total == 0 {
                    self.ended = true;
                } else {
                    self.fade = Some(Fade {
                        remaining: total,
                        total,
                    });
                }
            }
            _ => {}
        }
    }

    fn output_value(&self, id: usize) -> ParameterValue {
        match id {
            Self::GET_POSITION => self.frames_to_seconds(self.decoder.position()),
            Self::GET_LENGTH => self.frames_to_seconds(self.decoder.length()),
            _ => ParameterValue::default(),
        }
    }

    fn error_occurred(&self) -> bool {
        self.error || self.decoder.error_occurred()
    }

    fn is_playing(&self) -> bool {
        self.playing && !self.ended
    }

    fn format(&self) -> FrameFormat {
        self.decoder.format()
    }
}

/// An [`AudioOutput`] that records into an encoder until
/// [`STOP`](Self::STOP) is set or the encoder ends.
pub struct FileOutput {
    encoder: Box<dyn AudioEncoder>,
    stopped: bool,
    error: bool,
}

impl FileOutput {
    pub const STOP: usize = 0;

    pub fn new(encoder: Box<dyn AudioEncoder>) -> Self {
        Self {
            encoder,
            stopped: false,
            error: false,
        }
    }

    /// Encode on a worker thread.
    pub fn buffered(encoder: Box<dyn AudioEncoder>, config: WorkerConfig) -> Result<Self> {
        let encoder = AsyncEncoder::with_config(encoder, config)?;
        Ok(Self::new(Box::new(encoder)))
    }
}

impl AudioOutput for FileOutput {
    fn send(&mut self, frame: &Frame) {
        if !self.ended() {
            self.encoder.send(frame);
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate != self.encoder.sample_rate() {
            warn!(
                "File output is {} Hz but the engine runs at {sample_rate} Hz",
                self.encoder.sample_rate()
            );
            self.error = true;
        }
    }

    fn set_parameter(&mut self, id: usize, value: ParameterValue) {
        if id == Self::STOP {
            self.stopped = value.as_bool();
        }
    }

    fn error_occurred(&self) -> bool {
        self.error || self.encoder.error_occurred()
    }

    fn ended(&self) -> bool {
        self.stopped || self.encoder.ended() || self.encoder.error_occurred()
    }

    fn format(&self) -> FrameFormat {
        self.encoder.format()
    }
}
