//! Engine and worker configuration.

use mixdeck_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Audio engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rate handed to every input, output and effect at registration.
    pub sample_rate: u32,
    /// Commands that may be queued before the control thread spins.
    pub command_queue_capacity: usize,
    /// Replies that may be queued for the control thread.
    pub reply_queue_capacity: usize,
    /// Name of the engine thread.
    pub thread_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            command_queue_capacity: 256,
            reply_queue_capacity: 2,
            thread_name: "audio-engine".to_string(),
        }
    }
}

impl EngineConfig {
    /// Default configuration at the given sample rate.
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be non-zero".to_string()));
        }
        if self.command_queue_capacity == 0 {
            return Err(Error::Config(
                "command_queue_capacity must be non-zero".to_string(),
            ));
        }
        if self.reply_queue_capacity == 0 {
            return Err(Error::Config(
                "reply_queue_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration of an async decoder or encoder worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How far ahead of (or behind) the engine the worker may run.
    pub buffered_ms: u64,
    /// Worker sleep between refills; bounds control message latency.
    pub idle_sleep_ms: u64,
    /// Consumer sleep while waiting for a late frame.
    pub underrun_sleep_ms: u64,
    /// Sleeps before an underrun gives up and plays silence.
    pub underrun_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            buffered_ms: 1000,
            idle_sleep_ms: 100,
            underrun_sleep_ms: 1,
            underrun_retries: 10,
        }
    }
}

impl WorkerConfig {
    /// Longest buffer a worker may hold, one minute of audio.
    pub const MAX_BUFFERED_MS: u64 = 60_000;

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffered_ms == 0 {
            return Err(Error::Config("buffered_ms must be non-zero".to_string()));
        }
        if self.buffered_ms > Self::MAX_BUFFERED_MS {
            return Err(Error::Config(format!(
                "buffered_ms must be at most {}, got {}",
                Self::MAX_BUFFERED_MS,
                self.buffered_ms
            )));
        }
        Ok(())
    }

    /// Frame capacity of the worker's queue at `sample_rate`. At least one.
    pub fn capacity(&self, sample_rate: u32) -> usize {
        let frames = self.buffered_ms.saturating_mul(u64::from(sample_rate)) / 1000;
        usize::try_from(frames).unwrap_or(usize::MAX).max(1)
    }
}
