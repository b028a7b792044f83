//! Background threads that keep slow codec work off the engine thread.
//!
//! Each worker owns one decoder or encoder and exchanges frames with the
//! engine side through an SPSC queue sized by [`WorkerConfig`](crate::WorkerConfig).

pub mod decoder;
pub mod encoder;

pub use decoder::{AsyncDecoder, DecoderControl};
pub use encoder::AsyncEncoder;

use std::thread::{self, JoinHandle};

use mixdeck_core::{Error, Result};
use tracing::error;

/// Join handle of a worker thread that can be woken early.
pub(crate) struct WorkerThread {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|e| Error::ThreadSpawn(format!("Failed to spawn {name} thread: {e}")))?;
        Ok(Self {
            name,
            handle: Some(handle),
        })
    }

    /// Cut the worker's current sleep short.
    pub(crate) fn wake(&self) {
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
    }

    /// Wake the worker and wait for it to exit. The caller clears the
    /// worker's run flag first.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                error!("{} thread panicked", self.name);
            }
        }
    }
}
