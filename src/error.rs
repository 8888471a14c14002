//! Error types for stream reconstruction.

use thiserror::Error;

/// Boxed upstream error, kept as-is so callers can downcast it
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Errors that terminate a completion's unit stream.
///
/// None of these are recovered from inside the crate. A protocol violation
/// means the accumulated window cannot be trusted; a transport error means
/// the whole completion has to be restarted by the caller.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A tool call fragment does not fit the window being accumulated.
    #[error("malformed tool call fragment at index {index}: {reason}")]
    MalformedFragment { index: u32, reason: String },

    /// Upstream ended while a tool call window was still open.
    #[error("stream ended with an open tool call window (indices {open_indices:?})")]
    IncompleteStream { open_indices: Vec<u32> },

    /// A tool call's arguments grew past the configured cap.
    #[error("arguments of tool call at index {index} exceeded {limit} bytes")]
    ArgumentsTooLarge { index: u32, limit: usize },

    /// Error reported by the transport delivering raw chunks.
    #[error("upstream transport error: {0}")]
    Transport(#[source] BoxError),

    /// A wire payload was not valid chunk JSON.
    #[error("failed to decode chunk: {0}")]
    Decode(#[from] serde_json::Error),

    /// The reconstructor was used again after it reported an error.
    #[error("reconstructor already failed; start a new one for the next completion")]
    Poisoned,
}

impl StreamError {
    /// Wrap an upstream error
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }

    /// Whether the upstream sent something this crate refuses to assemble
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::MalformedFragment { .. }
                | Self::IncompleteStream { .. }
                | Self::ArgumentsTooLarge { .. }
        )
    }

    /// Whether the error came from the transport layer
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
