//! Reconnecting wrapper around a JSON-RPC endpoint.
//!
//! A [`Session`] keeps one logical JSON-RPC connection alive across
//! transient failures. It owns at most one [`Endpoint`] (or a stream still
//! connecting) and a [`Reconnect`] controller that decides when to retry,
//! back off, and probe. Endpoint death is never surfaced as an error:
//! callers observe a [`seqno`](Session::seqno) bump and, until the
//! controller has reconnected, `is_connected() == false`.
//!
//! The session also answers keepalive traffic on behalf of its caller: an
//! inbound `echo` request is replied to and consumed, and the reply to this
//! session's own probe is discarded, so neither ever reaches `recv`'s
//! caller.

use std::io;
use std::mem;
use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::RpcError;
use crate::message::Message;
use crate::poll::PollLoop;
use crate::reconnect::{Action, Reconnect};
use crate::transport::{Connector, Stream};

/// What the session currently possesses.
enum Conn<S> {
    Idle,
    Connecting(S),
    Connected(Endpoint<S>),
}

/// A JSON-RPC connection that survives transient failures.
///
/// The name reported by the session is the controller's name, stable across
/// reconnects; endpoint names change with each underlying stream.
pub struct Session<C: Connector> {
    connector: C,
    reconnect: Reconnect,
    conn: Conn<C::Stream>,
    seqno: u64,
}

impl<C: Connector> Session<C> {
    /// Opens a session that connects, and reconnects with backoff, to
    /// `name` through `connector`.
    pub fn open(connector: C, name: &str, now: Instant) -> Self {
        let mut reconnect = Reconnect::new(now);
        reconnect.set_name(name);
        reconnect.enable(now);
        Session {
            connector,
            reconnect,
            conn: Conn::Idle,
            seqno: 0,
        }
    }

    /// Wraps an endpoint that is already connected, typically one accepted
    /// by a server. If the connection drops it is never reconnected.
    pub fn open_attached(connector: C, endpoint: Endpoint<C::Stream>, now: Instant) -> Self {
        let mut reconnect = Reconnect::new(now);
        reconnect.set_name(endpoint.name());
        reconnect.set_max_tries(Some(0));
        reconnect.connected(now);
        Session {
            connector,
            reconnect,
            conn: Conn::Connected(endpoint),
            seqno: 0,
        }
    }

    /// The controller's name, stable across reconnects.
    pub fn name(&self) -> &str {
        self.reconnect.name()
    }

    /// Monotone counter bumped on every possession change; observe it to
    /// detect reconnects.
    pub fn seqno(&self) -> u64 {
        self.seqno
    }

    /// True while a live endpoint exists.
    pub fn is_connected(&self) -> bool {
        matches!(self.conn, Conn::Connected(_))
    }

    /// True while the session holds a connection, live or in progress,
    /// or the controller still has attempts left.
    pub fn is_alive(&self) -> bool {
        !matches!(self.conn, Conn::Idle) || self.reconnect.tries_left() != Some(0)
    }

    /// Total unsent bytes queued on the live endpoint, if any.
    pub fn backlog(&self) -> usize {
        match &self.conn {
            Conn::Connected(ep) => ep.backlog(),
            _ => 0,
        }
    }

    fn disconnect(&mut self) {
        match mem::replace(&mut self.conn, Conn::Idle) {
            Conn::Connected(_) | Conn::Connecting(_) => self.seqno += 1,
            Conn::Idle => {}
        }
    }

    fn connect(&mut self, now: Instant) {
        self.disconnect();
        match self.connector.open(self.reconnect.name()) {
            Ok(stream) => {
                self.reconnect.connecting(now);
                self.conn = Conn::Connecting(stream);
            }
            Err(e) => self.reconnect.connect_failed(now, &e),
        }
        self.seqno += 1;
    }

    /// One cooperative step: drive whatever the session possesses, then
    /// act on the controller's decision for this tick.
    pub fn run(&mut self, now: Instant) {
        match mem::replace(&mut self.conn, Conn::Idle) {
            Conn::Connected(mut ep) => {
                ep.run();
                match ep.status() {
                    Ok(()) => self.conn = Conn::Connected(ep),
                    Err(error) => {
                        self.reconnect.disconnected(now, Some(&error));
                        self.seqno += 1;
                    }
                }
            }
            Conn::Connecting(mut stream) => {
                stream.run();
                match stream.connect() {
                    Ok(()) => {
                        self.reconnect.connected(now);
                        self.conn = Conn::Connected(Endpoint::open(stream));
                        self.seqno += 1;
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        self.conn = Conn::Connecting(stream);
                    }
                    Err(e) => {
                        self.reconnect.connect_failed(now, &e);
                        self.seqno += 1;
                    }
                }
            }
            Conn::Idle => {}
        }

        match self.reconnect.run(now) {
            Some(Action::Connect) => self.connect(now),
            Some(Action::Disconnect) => {
                self.reconnect.disconnected(now, None);
                self.disconnect();
            }
            Some(Action::Probe) => self.probe(),
            None => {}
        }
    }

    fn probe(&mut self) {
        if let Conn::Connected(ep) = &mut self.conn {
            debug!("{}: sending keepalive probe", ep.name());
            let probe = Message::Request {
                method: "echo".to_owned(),
                params: Vec::new(),
                // The literal string "echo" in place of a minted integer
                // id, so the reply can be recognized and suppressed.
                id: Value::String("echo".to_owned()),
            };
            let _ = ep.send(probe);
        }
    }

    /// Registers poll interest combining connection readiness with the
    /// controller's next timer.
    pub fn wait(&self, poll: &mut dyn PollLoop, now: Instant) {
        match &self.conn {
            Conn::Connected(ep) => ep.wait(poll),
            Conn::Connecting(stream) => {
                stream.run_wait(poll);
                stream.connect_wait(poll);
            }
            Conn::Idle => {}
        }
        self.reconnect.wait(poll, now);
    }

    /// Registers receive readiness on the live endpoint.
    pub fn recv_wait(&self, poll: &mut dyn PollLoop) {
        if let Conn::Connected(ep) = &self.conn {
            ep.recv_wait(poll);
        }
    }

    /// Queues `msg` on the live endpoint, or reports `NotConnected`.
    pub fn send(&mut self, msg: Message) -> Result<(), RpcError> {
        match &mut self.conn {
            Conn::Connected(ep) => ep.send(msg),
            _ => Err(RpcError::NotConnected),
        }
    }

    /// Delivers the next inbound message, if one is ready.
    ///
    /// Receipt of any message counts as liveness for the controller. Echo
    /// keepalive traffic is handled transparently; everything else passes
    /// through. Endpoint failures are not surfaced here; they show up as
    /// a `seqno` bump on a later [`run`](Session::run).
    pub fn recv(&mut self, now: Instant) -> Option<Message> {
        let Conn::Connected(ep) = &mut self.conn else {
            return None;
        };
        let msg = ep.recv().ok().flatten()?;
        self.reconnect.received(now);
        match msg {
            Message::Request { method, params, id } => {
                if method == "echo" {
                    // The peer's keepalive: answer with its own params.
                    let reply = Message::reply(Value::Array(params), id);
                    let _ = ep.send(reply);
                    None
                } else {
                    Some(Message::Request { method, params, id })
                }
            }
            Message::Reply { result, id } => {
                if id.as_str() == Some("echo") {
                    debug!("{}: discarding keepalive reply", ep.name());
                    None
                } else {
                    Some(Message::Reply { result, id })
                }
            }
            other => Some(other),
        }
    }

    /// Asks the controller to drop the current connection and retry.
    pub fn force_reconnect(&mut self, now: Instant) {
        self.reconnect.force_reconnect(now);
    }
}
