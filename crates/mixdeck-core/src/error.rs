//! Error types for mixdeck.

use std::fmt;

use thiserror::Error;

/// Result type alias using mixdeck's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of engine resource a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Input,
    Output,
    Effect,
    Mixer,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Effect => "effect",
            Self::Mixer => "mixer",
        };
        f.write_str(name)
    }
}

/// Main error type for mixdeck.
#[derive(Error, Debug)]
pub enum Error {
    // Handle errors
    #[error("Unknown {kind} handle #{id}")]
    UnknownHandle { kind: HandleKind, id: u64 },

    #[error("Effect #{0} is already attached to a track or mixer")]
    EffectInUse(u64),

    #[error("Mixer #{mixer} is not routed to output #{output}")]
    NotRouted { mixer: u64, output: u64 },

    // Engine lifecycle errors
    #[error("Engine thread is not running")]
    EngineStopped,

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // Codec errors
    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    #[error("Audio encode error: {0}")]
    AudioEncode(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if the error was caused by a handle the engine does not know.
    pub const fn is_unknown_handle(&self) -> bool {
        matches!(self, Self::UnknownHandle { .. })
    }

    /// Build an `UnknownHandle` error.
    pub const fn unknown(kind: HandleKind, id: u64) -> Self {
        Self::UnknownHandle { kind, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_handle() {
        let err = Error::unknown(HandleKind::Mixer, 7);
        assert!(err.is_unknown_handle());
        assert!(!Error::EngineStopped.is_unknown_handle());
    }

    #[test]
    fn test_error_display() {
        let err = Error::unknown(HandleKind::Input, 3);
        assert_eq!(err.to_string(), "Unknown input handle #3");

        let err = Error::NotRouted {
            mixer: 1,
            output: 2,
        };
        assert_eq!(err.to_string(), "Mixer #1 is not routed to output #2");
    }
}
