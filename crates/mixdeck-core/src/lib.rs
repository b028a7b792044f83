//! # mixdeck-core
//!
//! Core types, collaborator traits, and error handling for the mixdeck engine.

pub mod effect;
pub mod error;
pub mod io;
pub mod types;

pub use effect::{process_buffer, BypassEffect, Effect, SerialEffect};
pub use error::{Error, HandleKind, Result};
pub use io::{decode_sound, encode_sound, AudioDecoder, AudioEncoder, AudioInput, AudioOutput};
pub use types::*;
