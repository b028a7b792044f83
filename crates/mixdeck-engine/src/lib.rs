//! # mixdeck-engine
//!
//! Real-time mixing engine for mixdeck.
//!
//! Features:
//! - Lock-free SPSC command queue between control code and the engine thread
//! - Mixers with per-track effects, effect tails and multi-output routing
//! - Decoders and encoders that run ahead of playback on worker threads
//! - Handle-based resource lifetimes, collected on the engine thread

mod command;
pub mod config;
mod effects;
pub mod engine;
pub mod file;
pub mod handle;
mod mixer;
pub mod queue;
pub mod shared;
pub mod sink;
pub mod worker;
mod wrappers;

pub use config::{EngineConfig, WorkerConfig};
pub use engine::{AudioEngine, Batch};
pub use file::{BufferDecoder, FileInput, FileOutput};
pub use handle::{
    EffectHandle, EffectId, EffectKind, EngineId, Handle, InputHandle, InputId, InputKind,
    MixerHandle, MixerId, MixerKind, OutputHandle, OutputId, OutputKind, ResourceId, ResourceKind,
};
pub use queue::{spsc_queue, Consumer, Producer};
pub use shared::SharedEngine;
pub use sink::ChannelOutput;
pub use worker::{AsyncDecoder, AsyncEncoder, DecoderControl};
