//! Engine-side wrappers around registered inputs and outputs.

use mixdeck_core::{accumulate, AudioInput, AudioOutput, Frame, FrameFormat, SILENCE};

use crate::handle::Token;

/// A registered input with its per-tick frame cache.
pub(crate) struct EngineInput {
    input: Box<dyn AudioInput>,
    token: Token,
    cache: Frame,
    cached: bool,
    use_count: usize,
}

impl EngineInput {
    pub(crate) fn new(input: Box<dyn AudioInput>, token: Token) -> Self {
        Self {
            input,
            token,
            cache: SILENCE,
            cached: false,
            use_count: 0,
        }
    }

    /// The input's frame for this tick. Only the first call per tick pulls
    /// from the source.
    pub(crate) fn get(&mut self, output: &mut Frame) {
        if !self.cached {
            self.cache = SILENCE;
            self.input.get(&mut self.cache);
            self.cached = true;
        }
        *output = self.cache;
    }

    pub(crate) fn reset_cached(&mut self) {
        self.cached = false;
    }

    pub(crate) fn increment_use_count(&mut self) {
        self.use_count += 1;
    }

    pub(crate) fn decrement_use_count(&mut self) {
        self.use_count = self.use_count.saturating_sub(1);
    }

    pub(crate) const fn use_count(&self) -> usize {
        self.use_count
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.input.is_playing()
    }

    /// Not playing and no caller can reach it anymore.
    pub(crate) fn died(&self) -> bool {
        !self.input.is_playing() && self.token.is_orphaned()
    }

    pub(crate) fn inner(&self) -> &dyn AudioInput {
        self.input.as_ref()
    }

    pub(crate) fn inner_mut(&mut self) -> &mut dyn AudioInput {
        self.input.as_mut()
    }
}

/// A registered output with its fan-in accumulator.
pub(crate) struct EngineOutput {
    output: Box<dyn AudioOutput>,
    accumulator: Frame,
    use_count: usize,
}

impl EngineOutput {
    pub(crate) fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            accumulator: SILENCE,
            use_count: 0,
        }
    }

    /// Add a frame, already in the output's format, into this tick's mix.
    pub(crate) fn send(&mut self, frame: &Frame) {
        accumulate(&mut self.accumulator, frame, self.output.format());
    }

    /// Flush the accumulated frame to the sink and start over from silence.
    pub(crate) fn finished_frame(&mut self) {
        self.output.send(&self.accumulator);
        self.accumulator = SILENCE;
    }

    pub(crate) fn increment_use_count(&mut self) {
        self.use_count += 1;
    }

    pub(crate) fn decrement_use_count(&mut self) {
        self.use_count = self.use_count.saturating_sub(1);
    }

    pub(crate) const fn use_count(&self) -> usize {
        self.use_count
    }

    pub(crate) fn format(&self) -> FrameFormat {
        self.output.format()
    }

    pub(crate) fn inner(&self) -> &dyn AudioOutput {
        self.output.as_ref()
    }

    pub(crate) fn inner_mut(&mut self) -> &mut dyn AudioOutput {
        self.output.as_mut()
    }
}
