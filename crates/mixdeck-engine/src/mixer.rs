//! Per-tick summation of tracks, tail decay, and the mixer-level effect.

use std::collections::HashMap;

use mixdeck_core::{accumulate, convert_frame, BypassEffect, Frame, FrameFormat, SILENCE};

use crate::effects::{EffectRegistry, EffectSlot};
use crate::handle::{InputId, Token};
use crate::wrappers::EngineInput;

/// An input being played through its own effect.
struct Track {
    input: InputId,
    effect: EffectSlot,
    /// Whether the input reported playing on the previous tick.
    playing: bool,
    /// Ticks of effect tail left once the input stopped by itself.
    remaining: u32,
}

/// The effect of a stopped track, fed silence until its tail has rung out.
struct Tail {
    effect: EffectSlot,
    remaining: u32,
}

/// A bus summing tracks into one frame per tick.
pub(crate) struct Mixer {
    tracks: Vec<Track>,
    tails: Vec<Tail>,
    effect: EffectSlot,
    /// Layout of the frames this mixer produces.
    format: FrameFormat,
    /// Layout tracks are summed in, the mixer effect's input.
    bus_format: FrameFormat,
    error: bool,
    token: Token,
    cache: Option<Frame>,
}

impl Mixer {
    /// A mixer whose effect is a pass-through in `format`.
    pub(crate) const fn new(format: FrameFormat, token: Token) -> Self {
        Self::with_slot(
            EffectSlot::Bypass(BypassEffect::new(format, format)),
            format,
            format,
            token,
        )
    }

    /// A mixer driven by a claimed effect with the given layouts.
    pub(crate) const fn with_slot(
        effect: EffectSlot,
        bus_format: FrameFormat,
        format: FrameFormat,
        token: Token,
    ) -> Self {
        Self {
            tracks: Vec::new(),
            tails: Vec::new(),
            effect,
            format,
            bus_format,
            error: false,
            token,
            cache: None,
        }
    }

    /// Swap the mixer effect, returning the previous one for release.
    pub(crate) fn set_effect(
        &mut self,
        effect: EffectSlot,
        bus_format: FrameFormat,
        format: FrameFormat,
    ) -> EffectSlot {
        self.bus_format = bus_format;
        self.format = format;
        std::mem::replace(&mut self.effect, effect)
    }

    /// Start a track. The caller has checked that `input` is registered.
    pub(crate) fn add(
        &mut self,
        input: InputId,
        effect: EffectSlot,
        inputs: &mut HashMap<InputId, EngineInput>,
    ) {
        if let Some(engine_input) = inputs.get_mut(&input) {
            engine_input.increment_use_count();
        }
        self.tracks.push(Track {
            input,
            effect,
            playing: false,
            remaining: 0,
        });
    }

    /// Stop every track playing `input`. Effects with a tail keep sounding
    /// from the tail list; the rest are released right away.
    ///
    /// Returns the number of tracks stopped.
    pub(crate) fn stop(
        &mut self,
        input: InputId,
        inputs: &mut HashMap<InputId, EngineInput>,
        effects: &mut EffectRegistry,
    ) -> usize {
        let mut stopped = 0;
        let mut index = 0;
        while index < self.tracks.len() {
            if self.tracks[index].input != input {
                index += 1;
                continue;
            }

            let track = self.tracks.swap_remove(index);
            if let Some(engine_input) = inputs.get_mut(&input) {
                engine_input.decrement_use_count();
            }
            let remaining = track.effect.tail_time(effects);
            if remaining > 0 {
                self.tails.push(Tail {
                    effect: track.effect,
                    remaining,
                });
            } else {
                track.effect.release(effects);
            }
            stopped += 1;
        }
        stopped
    }

    /// This tick's frame, in [`Mixer::format`].
    ///
    /// The first call per tick mixes; later calls in the same tick return the
    /// cached result so a mixer feeding several outputs advances only once.
    pub(crate) fn get(
        &mut self,
        inputs: &mut HashMap<InputId, EngineInput>,
        effects: &mut EffectRegistry,
        output: &mut Frame,
    ) {
        if let Some(frame) = self.cache {
            *output = frame;
            return;
        }

        let mut bus = SILENCE;
        let mut source = SILENCE;
        let mut converted = SILENCE;
        let mut processed = SILENCE;

        for track in &mut self.tracks {
            let Some(input) = inputs.get_mut(&track.input) else {
                self.error = true;
                continue;
            };
            input.get(&mut source);
            if input.inner().error_occurred() {
                self.error = true;
            }

            let input_format = input.inner().format();
            let Some(effect) = track.effect.get_mut(effects) else {
                self.error = true;
                continue;
            };

            if input.is_playing() {
                track.playing = true;
            } else {
                if track.playing {
                    track.playing = false;
                    track.remaining = effect.tail_time();
                }
                track.remaining = track.remaining.saturating_sub(1);
            }

            convert_frame(&source, input_format, &mut converted, effect.input_format());
            effect.process(&converted, &mut processed);
            if effect.error_occurred() {
                self.error = true;
            }
            convert_frame(&processed, effect.output_format(), &mut converted, self.bus_format);
            accumulate(&mut bus, &converted, self.bus_format);
        }

        self.sweep_tracks(inputs, effects);

        for tail in &mut self.tails {
            let Some(effect) = tail.effect.get_mut(effects) else {
                tail.remaining = 0;
                continue;
            };
            effect.process(&SILENCE, &mut processed);
            convert_frame(&processed, effect.output_format(), &mut converted, self.bus_format);
            accumulate(&mut bus, &converted, self.bus_format);
            tail.remaining = tail.remaining.saturating_sub(1);
        }

        self.sweep_tails(effects);

        match self.effect.get_mut(effects) {
            Some(effect) => {
                effect.process(&bus, output);
                if effect.error_occurred() {
                    self.error = true;
                }
            }
            None => {
                self.error = true;
                convert_frame(&bus, self.bus_format, output, self.format);
            }
        }

        self.cache = Some(*output);
    }

    /// Drop tracks whose input died and whose tail has rung out.
    fn sweep_tracks(
        &mut self,
        inputs: &mut HashMap<InputId, EngineInput>,
        effects: &mut EffectRegistry,
    ) {
        let mut index = 0;
        while index < self.tracks.len() {
            let track = &self.tracks[index];
            let died = inputs.get(&track.input).map_or(true, EngineInput::died);
            if !(died && track.remaining == 0) {
                index += 1;
                continue;
            }

            let track = self.tracks.swap_remove(index);
            if let Some(engine_input) = inputs.get_mut(&track.input) {
                engine_input.decrement_use_count();
            }
            track.effect.release(effects);
        }
    }

    fn sweep_tails(&mut self, effects: &mut EffectRegistry) {
        let mut index = 0;
        while index < self.tails.len() {
            if self.tails[index].remaining > 0 {
                index += 1;
                continue;
            }
            self.tails.swap_remove(index).effect.release(effects);
        }
    }

    /// Forget this tick's cached frame.
    pub(crate) fn reset_cache(&mut self) {
        self.cache = None;
    }

    /// Give every input and effect this mixer holds back.
    pub(crate) fn release(
        &mut self,
        inputs: &mut HashMap<InputId, EngineInput>,
        effects: &mut EffectRegistry,
    ) {
        for track in self.tracks.drain(..) {
            if let Some(engine_input) = inputs.get_mut(&track.input) {
                engine_input.decrement_use_count();
            }
            track.effect.release(effects);
        }
        for tail in self.tails.drain(..) {
            tail.effect.release(effects);
        }
        let bypass = EffectSlot::Bypass(BypassEffect::new(self.bus_format, self.format));
        std::mem::replace(&mut self.effect, bypass).release(effects);
    }

    /// True while at least one track is active. Tails do not count.
    pub(crate) fn is_playing(&self) -> bool {
        !self.tracks.is_empty()
    }

    /// No tracks and no tails left.
    pub(crate) fn is_silent(&self) -> bool {
        self.tracks.is_empty() && self.tails.is_empty()
    }

    pub(crate) fn is_orphaned(&self) -> bool {
        self.token.is_orphaned()
    }

    pub(crate) const fn error_occurred(&self) -> bool {
        self.error
    }

    pub(crate) const fn format(&self) -> FrameFormat {
        self.format
    }

    pub(crate) const fn bus_format(&self) -> FrameFormat {
        self.bus_format
    }

    pub(crate) fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub(crate) fn tail_count(&self) -> usize {
        self.tails.len()
    }
}
