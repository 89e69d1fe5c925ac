//! Non-blocking framed JSON-RPC over a single byte stream.
//!
//! An [`Endpoint`] owns one transport stream and turns it into a message
//! pipe: outbound messages are serialized into an ordered send queue and
//! drained as the transport accepts bytes; inbound bytes flow through a
//! [`ByteRing`] into an incremental [`JsonFramer`] until a complete message
//! is ready. Nothing here ever blocks: `send`, `recv`, and `run` either
//! make progress or report that the transport is not ready, and the
//! blocking helpers at the bottom spin those operations against the
//! caller's poll loop.
//!
//! Failure is terminal: the first transport or protocol error latches a
//! sticky status, every owned resource is released, and the endpoint must
//! be replaced by a new one around a fresh stream.

use std::collections::VecDeque;
use std::io;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RpcError;
use crate::frame::JsonFramer;
use crate::message::Message;
use crate::poll::PollLoop;
use crate::ring::ByteRing;
use crate::transport::Stream;

/// A queued outbound buffer, with a cursor over the bytes already handed to
/// the transport.
#[derive(Debug)]
struct Pending {
    buf: Vec<u8>,
    sent: usize,
}

impl Pending {
    fn remaining(&self) -> &[u8] {
        &self.buf[self.sent..]
    }
}

/// A JSON-RPC connection over one non-blocking byte stream.
///
/// The endpoint owns its stream exclusively and snapshots the stream's name
/// at open. At most one inbound message is buffered between `recv` calls;
/// `backlog` is the total number of unsent bytes across the send queue.
#[derive(Debug)]
pub struct Endpoint<S> {
    stream: Option<S>,
    name: String,
    status: Option<RpcError>,

    // Input.
    input: ByteRing,
    framer: Option<JsonFramer>,
    received: Option<Message>,

    // Output.
    output: VecDeque<Pending>,
    backlog: usize,
}

impl<S: Stream> Endpoint<S> {
    /// Takes ownership of `stream` and wraps it in a healthy endpoint.
    pub fn open(stream: S) -> Self {
        Endpoint {
            name: stream.name().to_owned(),
            stream: Some(stream),
            status: None,
            input: ByteRing::new(),
            framer: None,
            received: None,
            output: VecDeque::new(),
            backlog: 0,
        }
    }

    /// The stream name snapshotted at open, stable for the endpoint's life.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sticky status: `Ok` while healthy, the latched error once dead.
    pub fn status(&self) -> Result<(), RpcError> {
        match &self.status {
            None => Ok(()),
            Some(error) => Err(error.clone()),
        }
    }

    /// Total unsent bytes across the send queue; 0 once dead.
    pub fn backlog(&self) -> usize {
        self.backlog
    }

    /// Latches `error` and releases every owned resource.
    ///
    /// The first latch wins. A dead endpoint answers `status`, `backlog`,
    /// and `name`; everything else is a no-op returning the latched error.
    pub fn fail(&mut self, error: RpcError) {
        if self.status.is_none() {
            self.status = Some(error);
            self.cleanup();
        }
    }

    fn cleanup(&mut self) {
        self.stream = None;
        self.framer = None;
        self.received = None;
        self.output.clear();
        self.backlog = 0;
    }

    /// Drains the send queue against the transport.
    ///
    /// Each queued buffer is written as far as the transport accepts; a
    /// partial write leaves the remainder at the queue head for the next
    /// run. A not-ready transport returns without error; any other
    /// transport error latches the status and tears the endpoint down.
    pub fn run(&mut self) {
        let mut failure = None;
        if let Some(stream) = self.stream.as_mut() {
            stream.run();
            while let Some(head) = self.output.front_mut() {
                match stream.send(head.remaining()) {
                    Ok(0) => break,
                    Ok(n) => {
                        head.sent += n;
                        self.backlog -= n;
                        if head.sent == head.buf.len() {
                            self.output.pop_front();
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }
        if let Some(e) = failure {
            warn!("{}: send error: {}", self.name, e);
            self.fail(RpcError::Transport(e.kind()));
        }
    }

    /// Registers poll interest for the next actionable event: transport
    /// drive, plus write readiness while the queue is non-empty. No-op on
    /// a dead endpoint.
    pub fn wait(&self, poll: &mut dyn PollLoop) {
        if let Some(stream) = &self.stream {
            stream.run_wait(poll);
            if !self.output.is_empty() {
                stream.send_wait(poll);
            }
        }
    }

    /// Serializes `msg`, appends it to the send queue, and pushes bytes
    /// immediately if the queue was idle.
    ///
    /// Consumes `msg` on every path (serialized, or dropped if the
    /// endpoint is already dead) and returns the current status.
    pub fn send(&mut self, msg: Message) -> Result<(), RpcError> {
        if let Some(error) = &self.status {
            return Err(error.clone());
        }
        debug!("{}: send {:?}", self.name, msg);
        let buf = msg.into_json().to_string().into_bytes();
        self.backlog += buf.len();
        self.output.push_back(Pending { buf, sent: 0 });
        if self.output.len() == 1 {
            self.run();
        }
        self.status()
    }

    /// Delivers the next fully parsed message.
    ///
    /// `Ok(None)` means no complete message is available and the transport
    /// is not ready: park on the poll loop. `Err` is the latched status,
    /// including end-of-stream. Ownership of a returned message transfers
    /// to the caller.
    pub fn recv(&mut self) -> Result<Option<Message>, RpcError> {
        loop {
            if let Some(error) = &self.status {
                return Err(error.clone());
            }
            if let Some(msg) = self.received.take() {
                debug!("{}: received {:?}", self.name, msg);
                return Ok(Some(msg));
            }
            if self.input.is_empty() {
                // The stream is released only when a status latches, and a
                // latched status already returned above.
                let stream = self
                    .stream
                    .as_mut()
                    .expect("healthy endpoint owns a stream");
                match stream.recv(self.input.head_free_space()) {
                    Ok(0) => {
                        info!("{}: connection closed by peer", self.name);
                        self.fail(RpcError::ConnectionClosed);
                    }
                    Ok(n) => self.input.advance_head(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                    Err(e) => {
                        warn!("{}: receive error: {}", self.name, e);
                        self.fail(RpcError::Transport(e.kind()));
                    }
                }
            } else {
                let framer = self.framer.get_or_insert_with(JsonFramer::new);
                let used = framer.feed(self.input.tail_readable_span());
                let done = framer.is_done();
                // Advance by what the framer consumed, not what was offered.
                self.input.advance_tail(used);
                if done {
                    if let Some(framer) = self.framer.take() {
                        self.absorb(framer);
                    }
                }
            }
        }
    }

    /// Finalizes a completed framer into the buffered inbound message,
    /// latching a protocol error on malformed or invalid input.
    fn absorb(&mut self, framer: JsonFramer) {
        match framer.finish() {
            Ok(value) => match Message::from_json(value) {
                Ok(msg) => self.received = Some(msg),
                Err(e) => {
                    warn!("{}: received bad JSON-RPC message: {}", self.name, e);
                    self.fail(RpcError::Protocol);
                }
            },
            Err(e) => {
                warn!("{}: error parsing stream: {}", self.name, e);
                self.fail(RpcError::Protocol);
            }
        }
    }

    /// Registers receive readiness: an immediate wake when the endpoint is
    /// dead, a message is already buffered, or undrained bytes sit in the
    /// ring; otherwise transport read readiness.
    pub fn recv_wait(&self, poll: &mut dyn PollLoop) {
        if self.status.is_some() || self.received.is_some() || !self.input.is_empty() {
            poll.immediate_wake();
        } else if let Some(stream) = &self.stream {
            stream.recv_wait(poll);
        }
    }

    /// Sends `msg` and spins the poll loop until every byte has been
    /// handed to the transport or the endpoint dies.
    pub fn send_block(&mut self, poll: &mut dyn PollLoop, msg: Message) -> Result<(), RpcError> {
        self.send(msg)?;
        loop {
            self.run();
            self.status()?;
            if self.output.is_empty() {
                return Ok(());
            }
            self.wait(poll);
            poll.block();
        }
    }

    /// Receives the next message, spinning the poll loop across not-ready
    /// transports.
    pub fn recv_block(&mut self, poll: &mut dyn PollLoop) -> Result<Message, RpcError> {
        loop {
            if let Some(msg) = self.recv()? {
                return Ok(msg);
            }
            self.run();
            self.wait(poll);
            self.recv_wait(poll);
            poll.block();
        }
    }

    /// Sends `request` and waits for the reply whose id equals the
    /// request's id (deep JSON equality), discarding every unrelated
    /// message that arrives in between.
    pub fn transact_block(
        &mut self,
        poll: &mut dyn PollLoop,
        request: Message,
    ) -> Result<Message, RpcError> {
        let id = request.id().cloned().unwrap_or(Value::Null);
        self.send_block(poll, request)?;
        loop {
            let reply = self.recv_block(poll)?;
            if let Message::Reply { id: reply_id, .. } = &reply {
                if *reply_id == id {
                    return Ok(reply);
                }
            }
            debug!("{}: discarding unrelated {}", self.name, reply.variant());
        }
    }
}
