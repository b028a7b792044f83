//! Messages from the control thread to the engine thread.
//!
//! Commands reference resources through handle clones, so a resource cannot
//! be collected between the moment a command is queued and the moment the
//! engine thread applies it.

use mixdeck_core::{AudioInput, AudioOutput, Effect, FrameFormat, ParameterValue, Result};

use crate::handle::{
    EffectHandle, EffectId, InputHandle, InputId, MixerHandle, MixerId, OutputHandle, OutputId,
    Token,
};

/// What a new mixer is built from.
pub(crate) enum MixerSource {
    /// Pass-through bus in the given layout.
    Format(FrameFormat),
    /// Driven by a registered effect.
    Effect(EffectHandle),
}

pub(crate) enum Command {
    AddInput {
        id: InputId,
        input: Box<dyn AudioInput>,
        token: Token,
    },
    AddOutput {
        id: OutputId,
        output: Box<dyn AudioOutput>,
    },
    AddEffect {
        id: EffectId,
        effect: Box<dyn Effect>,
        token: Token,
    },
    AddMixer {
        id: MixerId,
        source: MixerSource,
        token: Token,
    },
    AddMixerOutput {
        mixer: MixerHandle,
        output: OutputHandle,
    },
    RemoveMixerOutput {
        mixer: MixerHandle,
        output: OutputHandle,
    },
    SetMixerEffect {
        mixer: MixerHandle,
        effect: EffectHandle,
    },
    Play {
        mixer: MixerHandle,
        input: InputHandle,
        /// `None` plays through an engine-owned bypass.
        effect: Option<EffectHandle>,
    },
    Stop {
        mixer: MixerHandle,
        input: InputHandle,
    },
    SetEffectParameter {
        effect: EffectHandle,
        id: usize,
        value: ParameterValue,
    },
    SetNestedEffectParameter {
        effect: EffectHandle,
        index: usize,
        id: usize,
        value: ParameterValue,
    },
    SetInputParameter {
        input: InputHandle,
        id: usize,
        value: ParameterValue,
    },
    SetOutputParameter {
        output: OutputHandle,
        id: usize,
        value: ParameterValue,
    },
    /// Answered with exactly one [`Reply`].
    Query(Query),
    /// Applied back to back within a single drain.
    Batch(Vec<Command>),
}

pub(crate) enum Query {
    IsPlaying(InputHandle),
    HasEnded(OutputHandle),
    InputValue(InputHandle, usize),
    OutputValue(OutputHandle, usize),
    EffectValue(EffectHandle, usize),
}

/// Answer to a [`Query`], in submission order.
pub(crate) type Reply = Result<ParameterValue>;

impl Command {
    /// Short name for log messages.
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Self::AddInput { .. } => "AddInput",
            Self::AddOutput { .. } => "AddOutput",
            Self::AddEffect { .. } => "AddEffect",
            Self::AddMixer { .. } => "AddMixer",
            Self::AddMixerOutput { .. } => "AddMixerOutput",
            Self::RemoveMixerOutput { .. } => "RemoveMixerOutput",
            Self::SetMixerEffect { .. } => "SetMixerEffect",
            Self::Play { .. } => "Play",
            Self::Stop { .. } => "Stop",
            Self::SetEffectParameter { .. } => "SetEffectParameter",
            Self::SetNestedEffectParameter { .. } => "SetNestedEffectParameter",
            Self::SetInputParameter { .. } => "SetInputParameter",
            Self::SetOutputParameter { .. } => "SetOutputParameter",
            Self::Query(_) => "Query",
            Self::Batch(_) => "Batch",
        }
    }
}
