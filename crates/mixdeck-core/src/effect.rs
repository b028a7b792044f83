//! The effect contract and the built-in structural effects.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::types::{convert_frame, Frame, FrameFormat, ParameterValue, SoundBuffer, SILENCE};

/// A per-frame audio processor.
///
/// Once an effect has been registered with an engine it is owned by the
/// engine thread; every method below is then only ever called from there.
pub trait Effect: Send {
    /// Layout of the frames passed to [`Effect::process`].
    fn input_format(&self) -> FrameFormat;

    /// Layout of the frames produced by [`Effect::process`].
    fn output_format(&self) -> FrameFormat;

    /// Process one frame. Called once per track per tick.
    fn process(&mut self, input: &Frame, output: &mut Frame);

    /// Called once, when the effect is attached to an engine.
    fn set_sample_rate(&mut self, sample_rate: u32);

    /// Number of frames of meaningful output left after the input goes silent.
    fn tail_time(&self) -> u32;

    fn set_parameter(&mut self, id: usize, value: ParameterValue);

    /// Address a parameter of a member effect inside a composite.
    fn set_nested_parameter(&mut self, _index: usize, _id: usize, _value: ParameterValue) {}

    fn output_value(&self, _id: usize) -> ParameterValue {
        ParameterValue::default()
    }

    fn error_occurred(&self) -> bool {
        false
    }

    /// Fresh copy carrying the same settings and independent DSP state.
    fn clone_box(&self) -> Box<dyn Effect>;
}

impl Clone for Box<dyn Effect> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Pass-through effect that only converts between layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BypassEffect {
    input: FrameFormat,
    output: FrameFormat,
}

impl BypassEffect {
    pub const fn new(input: FrameFormat, output: FrameFormat) -> Self {
        Self { input, output }
    }
}

impl Effect for BypassEffect {
    fn input_format(&self) -> FrameFormat {
        self.input
    }

    fn output_format(&self) -> FrameFormat {
        self.output
    }

    fn process(&mut self, input: &Frame, output: &mut Frame) {
        convert_frame(input, self.input, output, self.output);
    }

    fn set_sample_rate(&mut self, _sample_rate: u32) {}

    fn tail_time(&self) -> u32 {
        0
    }

    fn set_parameter(&mut self, _id: usize, _value: ParameterValue) {}

    fn clone_box(&self) -> Box<dyn Effect> {
        Box::new(*self)
    }
}

/// Chain of effects applied one after another.
///
/// Member parameters are reached with [`Effect::set_nested_parameter`], where
/// the index selects the member in chain order.
#[derive(Clone)]
pub struct SerialEffect {
    effects: Vec<Box<dyn Effect>>,
    format: FrameFormat,
}

impl SerialEffect {
    /// An empty chain behaves as a bypass in `format`.
    pub fn new(format: FrameFormat) -> Self {
        Self {
            effects: Vec::new(),
            format,
        }
    }

    pub fn with(mut self, effect: Box<dyn Effect>) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn push(&mut self, effect: Box<dyn Effect>) {
        self.effects.push(effect);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl Effect for SerialEffect {
    fn input_format(&self) -> FrameFormat {
        self.effects.first().map_or(self.format, |e| e.input_format())
    }

    fn output_format(&self) -> FrameFormat {
        self.effects.last().map_or(self.format, |e| e.output_format())
    }

    fn process(&mut self, input: &Frame, output: &mut Frame) {
        let mut current = *input;
        let mut current_format = self.input_format();
        for effect in &mut self.effects {
            let mut converted = SILENCE;
            convert_frame(&current, current_format, &mut converted, effect.input_format());
            effect.process(&converted, &mut current);
            current_format = effect.output_format();
        }
        *output = current;
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        for effect in &mut self.effects {
            effect.set_sample_rate(sample_rate);
        }
    }

    fn tail_time(&self) -> u32 {
        self.effects
            .iter()
            .map(|e| e.tail_time())
            .fold(0u32, u32::saturating_add)
    }

    fn set_parameter(&mut self, _id: usize, _value: ParameterValue) {}

    fn set_nested_parameter(&mut self, index: usize, id: usize, value: ParameterValue) {
        if let Some(effect) = self.effects.get_mut(index) {
            effect.set_parameter(id, value);
        }
    }

    fn error_occurred(&self) -> bool {
        self.effects.iter().any(|e| e.error_occurred())
    }

    fn clone_box(&self) -> Box<dyn Effect> {
        Box::new(self.clone())
    }
}

/// Render a whole buffer through an effect offline, including its tail.
///
/// The result is `input.len() + effect.tail_time()` frames long and laid out
/// in the effect's output format.
pub fn process_buffer(effect: &mut dyn Effect, input: &SoundBuffer) -> SoundBuffer {
    effect.set_sample_rate(input.sample_rate());
    let length = input.len() + effect.tail_time() as usize;
    let mut output = SoundBuffer::new(input.sample_rate(), effect.output_format(), length);

    for index in 0..length {
        let source = input.frame(index).copied().unwrap_or(SILENCE);
        let mut converted = SILENCE;
        convert_frame(&source, input.format(), &mut converted, effect.input_format());
        let mut processed = SILENCE;
        effect.process(&converted, &mut processed);
        output.set_frame(index, processed);
    }

    output
}
