//! Crate-level error type.

use thiserror::Error;

/// Errors surfaced across the coordinator's public API.
///
/// Invariant violations inside the engine (e.g. a `last_update` entry whose
/// address is missing from `state`) are *not* represented here: those are
/// programmer errors and are reported via `panic!`/`unreachable!` rather than
/// a `Result`, per the engine's error handling design.
#[derive(Debug, Error)]
pub enum CoordError {
    /// A gossip call to `addr` failed or was rejected by the peer.
    #[error("gossip call to {addr} failed: {source}")]
    Transport {
        /// The remote peer address the call was directed at.
        addr: String,
        /// The underlying transport failure, boxed so callers can plug in
        /// any error type for their own `Transport` implementation.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A gossip call to `addr` did not complete within `call_remote_timeout`.
    #[error("gossip call to {addr} timed out")]
    Timeout {
        /// The remote peer address the call was directed at.
        addr: String,
    },

    /// An internal channel was closed while the engine still expected to use it.
    #[error("internal channel closed: {0}")]
    ChannelClosed(&'static str),
}

/// Result alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, CoordError>;
