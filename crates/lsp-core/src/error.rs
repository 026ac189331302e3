use thiserror::Error;

/// Errors surfaced to API callers. Internal faults (datagram send errors,
/// decode failures) never reach this type — the epoch-driven retransmission
/// is the sole recovery mechanism for those.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LspError {
    /// Handshake did not complete within `epoch_limit` ticks.
    #[error("connection failed: handshake did not complete before the epoch limit")]
    ConnectionFailed,

    /// Peer went silent for `epoch_limit` ticks after establishment, or a
    /// close could not drain pending Data before loss.
    #[error("connection lost: peer silent for the epoch limit")]
    ConnectionLost,

    /// The user closed the endpoint; further API calls fail with this.
    #[error("endpoint is closed")]
    Closed,

    /// Server write/close for a `conn_id` that does not exist.
    #[error("no such connection: {0}")]
    NoSuchConnection(u32),

    /// A `Params` field was not a strictly positive integer.
    #[error("invalid params: {0}")]
    InvalidParams(&'static str),
}
