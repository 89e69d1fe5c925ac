//! Error kinds surfaced by endpoints and sessions.

use std::io;

use thiserror::Error;

/// Status of a failed endpoint or session operation.
///
/// The first transport or protocol error latches an endpoint's sticky
/// status; every later operation on the dead endpoint returns the latched
/// value. EAGAIN is deliberately absent from this enum: "not ready" is
/// reported as `Ok(None)` from `recv` (or `io::ErrorKind::WouldBlock` at
/// the transport seam) and means "park on the poll loop", not failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The underlying byte stream failed.
    #[error("transport error: {0:?}")]
    Transport(io::ErrorKind),

    /// The peer closed the connection. Terminal for an endpoint; a session
    /// recovers by reconnecting.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Malformed JSON or an invalid message poisoned the stream. There is
    /// no resync: one bad message kills the whole endpoint.
    #[error("protocol error")]
    Protocol,

    /// A session operation was attempted with no live endpoint.
    #[error("not connected")]
    NotConnected,
}
