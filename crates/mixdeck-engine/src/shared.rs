//! Multi-producer access to one engine.

use std::sync::Arc;

use mixdeck_core::Result;
use parking_lot::{Mutex, MutexGuard};

use crate::config::EngineConfig;
use crate::engine::AudioEngine;

/// A cloneable engine handle for several control threads.
///
/// [`AudioEngine`] has a single-producer command queue. This serializes
/// callers on a mutex so each call (and each query round trip) runs alone.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<AudioEngine>>,
}

impl SharedEngine {
    pub fn new(engine: AudioEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        AudioEngine::with_config(config).map(Self::new)
    }

    /// Lock the engine for a sequence of calls.
    pub fn lock(&self) -> MutexGuard<'_, AudioEngine> {
        self.inner.lock()
    }

    /// Run `f` with the engine locked.
    pub fn with<R>(&self, f: impl FnOnce(&AudioEngine) -> R) -> R {
        f(&self.inner.lock())
    }
}

impl From<AudioEngine> for SharedEngine {
    fn from(engine: AudioEngine) -> Self {
        Self::new(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdeck_core::FrameFormat;
    use std::thread;

    #[test]
    fn test_calls_from_several_threads() {
        let shared = SharedEngine::with_config(EngineConfig::with_sample_rate(8000)).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        shared.with(|engine| engine.add_mixer(FrameFormat::Stereo)).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let engine = shared.lock();
        assert!(engine.is_running());
        assert!(!engine.error_occurred());
        assert_eq!(engine.sample_rate(), 8000);
    }
}
