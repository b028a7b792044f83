//! Core domain types for mixdeck.

pub mod frame;
pub mod parameter;
pub mod sound;

pub use frame::{
    accumulate, convert_frame, is_silent, Frame, FrameFormat, Sample, MAX_CHANNELS, SILENCE,
};
pub use parameter::ParameterValue;
pub use sound::SoundBuffer;
