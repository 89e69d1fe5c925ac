//! Byte-stream transport seams.
//!
//! Endpoints and sessions consume their transports through these traits
//! rather than owning sockets directly, so the same framing and
//! reconnection logic runs over TCP, Unix sockets, or an in-memory pipe.
//! Implementations follow the usual non-blocking discipline:
//! [`io::ErrorKind::WouldBlock`] means "not ready, try again after the poll
//! loop wakes", and `Ok(0)` from a read means end-of-stream.

use std::io;

use crate::poll::PollLoop;

/// A non-blocking byte stream carrying JSON-RPC text.
///
/// The `*_wait` hooks register readiness interest with the caller's poll
/// loop; streams that are always ready (such as in-memory pipes) may keep
/// the default no-ops, and streams with no handshake may keep the default
/// `connect`.
pub trait Stream {
    /// The stream's name, snapshotted by the endpoint at open.
    fn name(&self) -> &str;

    /// Drives internal progress not tied to any one send or receive.
    fn run(&mut self) {}

    /// Reports connection establishment: `Ok` once connected, `WouldBlock`
    /// while still in progress, any other error on failure.
    fn connect(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Writes as many bytes from `buf` as the transport accepts, returning
    /// the count.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Reads into `buf`, returning the count; `Ok(0)` means end-of-stream.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Registers interest in whatever [`run`](Stream::run) needs next.
    fn run_wait(&self, _poll: &mut dyn PollLoop) {}

    /// Registers interest in connection-establishment progress.
    fn connect_wait(&self, _poll: &mut dyn PollLoop) {}

    /// Registers interest in write readiness.
    fn send_wait(&self, _poll: &mut dyn PollLoop) {}

    /// Registers interest in read readiness.
    fn recv_wait(&self, _poll: &mut dyn PollLoop) {}
}

/// Opens streams by name on behalf of a reconnecting session.
pub trait Connector {
    type Stream: Stream;

    /// Starts opening a connection to `name`.
    ///
    /// A returned stream may still be connecting; the session polls
    /// [`Stream::connect`] until it settles.
    fn open(&mut self, name: &str) -> io::Result<Self::Stream>;
}
