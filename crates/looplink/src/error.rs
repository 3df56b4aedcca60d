//! Bridge error taxonomy

use looplink_api::{ForeignError, RawFd};
use thiserror::Error;

/// Errors surfaced by the bridge and host layer.
///
/// The misuse variants (`DuplicateRegistration`, `NotRegistered`,
/// `InvalidInterest`, `WrongThread`, `AlreadyRunning`, `ClosedLoop`,
/// `Unsupported`) indicate caller bugs, not transient conditions; callers
/// should not retry them. Foreign-API failures pass through as `Foreign`.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The fd is already registered with the bridge.
    #[error("fd {0} is already registered")]
    DuplicateRegistration(RawFd),

    /// The fd is not registered with the bridge.
    #[error("fd {0} is not registered")]
    NotRegistered(RawFd),

    /// An empty interest mask was passed to `register`.
    #[error("empty interest mask for fd {0}")]
    InvalidInterest(RawFd),

    /// The operation was attempted from a thread that does not own the
    /// context.
    #[error("operation attempted from a non-owner thread")]
    WrongThread,

    /// The host's drive call was re-entered while already running.
    #[error("scheduler host is already running")]
    AlreadyRunning,

    /// The host or bridge has been closed; no further operations are valid.
    #[error("event loop is closed")]
    ClosedLoop,

    /// The operation is not supported by this policy or host.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// An error reported by the foreign loop's own API.
    #[error(transparent)]
    Foreign(#[from] ForeignError),
}
