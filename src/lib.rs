//! # JSON-RPC session library
//!
//! `jsonrpc-session` implements the framing and session core for long-lived,
//! bidirectional JSON-RPC 1.0 control-plane connections, such as those
//! between management and data-plane daemons.
//!
//! The library provides two layers:
//!
//! - **Endpoint**: a non-blocking JSON-RPC connection over one byte stream.
//!   Outbound messages are serialized into an ordered send queue with an
//!   explicit byte backlog; inbound bytes are framed incrementally (one
//!   top-level JSON value per message, no envelope) and validated against
//!   the strict JSON-RPC 1.0 shapes. The first transport or protocol error
//!   latches a sticky status and kills the endpoint.
//! - **Session**: a reconnecting wrapper that keeps an endpoint alive under
//!   transient failures, driven by a backoff/liveness controller, with a
//!   transparent `echo` keepalive probe. Consumers detect reconnects by
//!   watching the session's monotone `seqno`.
//!
//! ## Architecture
//!
//! - **message**: the four-variant message model (request, notification,
//!   reply, error), validation, and JSON conversion
//! - **ring** / **frame**: the input path, a fixed byte ring feeding an
//!   incremental JSON framer
//! - **endpoint**: framed non-blocking I/O, status latch, blocking helpers,
//!   and request/reply transactions
//! - **reconnect**: the retry, backoff, and probe state machine
//! - **session**: possession state (idle / connecting / connected) on top
//!   of the controller
//! - **transport** / **poll**: the seams for byte streams and the caller's
//!   poll loop
//!
//! Scheduling is single-threaded and cooperative: `send`, `recv`, and `run`
//! never block, and components publish readiness through the `wait` calls
//! so the caller's poll loop can park exactly once per iteration.

pub mod endpoint;
pub mod error;
pub mod frame;
pub mod message;
pub mod poll;
pub mod reconnect;
pub mod ring;
pub mod session;
pub mod transport;

pub use endpoint::Endpoint;
pub use error::RpcError;
pub use message::{Message, MessageError};
pub use poll::PollLoop;
pub use reconnect::{Action, Reconnect};
pub use session::Session;
pub use transport::{Connector, Stream};
