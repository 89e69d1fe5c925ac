#![allow(dead_code)]

//! In-memory transport plumbing shared by the integration suites.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Instant;

use jsonrpc_session::poll::PollLoop;
use jsonrpc_session::transport::{Connector, Stream};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// One direction of a loopback byte pipe.
#[derive(Debug, Default)]
struct Pipe {
    data: VecDeque<u8>,
    eof: bool,
    /// Bytes a send may still deposit before the pipe reports not-ready;
    /// `None` is unlimited.
    budget: Option<usize>,
    fail: Option<io::ErrorKind>,
}

/// Test-side handles to a stream's pipes.
///
/// The stream itself is consumed by `Endpoint::open`, so tests drive the
/// peer side through these shared handles instead.
#[derive(Debug, Clone)]
pub struct PipeEnds {
    inbound: Rc<RefCell<Pipe>>,
    outbound: Rc<RefCell<Pipe>>,
}

impl PipeEnds {
    /// Queues `text` as bytes the stream will read.
    pub fn push_inbound(&self, text: &str) {
        self.inbound.borrow_mut().data.extend(text.as_bytes());
    }

    /// Marks the read side closed once drained.
    pub fn close_inbound(&self) {
        self.inbound.borrow_mut().eof = true;
    }

    /// Makes every subsequent read fail with `kind`.
    pub fn fail_inbound(&self, kind: io::ErrorKind) {
        self.inbound.borrow_mut().fail = Some(kind);
    }

    /// Makes every subsequent write fail with `kind`.
    pub fn fail_outbound(&self, kind: io::ErrorKind) {
        self.outbound.borrow_mut().fail = Some(kind);
    }

    /// Caps how many more bytes writes may deposit (`None` = unlimited).
    pub fn set_outbound_budget(&self, budget: Option<usize>) {
        self.outbound.borrow_mut().budget = budget;
    }

    /// Drains and returns everything the stream has written.
    pub fn take_outbound(&self) -> String {
        let bytes: Vec<u8> = self.outbound.borrow_mut().data.drain(..).collect();
        String::from_utf8(bytes).expect("outbound bytes are JSON text")
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.borrow().data.len()
    }
}

/// One end of an in-memory byte-stream pair.
#[derive(Debug)]
pub struct LoopbackStream {
    name: String,
    inbound: Rc<RefCell<Pipe>>,
    outbound: Rc<RefCell<Pipe>>,
    /// Largest chunk a single `recv` returns, to exercise arbitrary
    /// read boundaries.
    pub recv_chunk: Option<usize>,
    /// `connect()` reports in-progress this many times before settling.
    pub connect_polls: usize,
}

impl LoopbackStream {
    pub fn new(name: &str) -> (Self, PipeEnds) {
        let inbound = Rc::new(RefCell::new(Pipe::default()));
        let outbound = Rc::new(RefCell::new(Pipe::default()));
        let ends = PipeEnds {
            inbound: inbound.clone(),
            outbound: outbound.clone(),
        };
        (
            LoopbackStream {
                name: name.to_owned(),
                inbound,
                outbound,
                recv_chunk: None,
                connect_polls: 0,
            },
            ends,
        )
    }
}

impl Stream for LoopbackStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> io::Result<()> {
        if self.connect_polls > 0 {
            self.connect_polls -= 1;
            return Err(io::ErrorKind::WouldBlock.into());
        }
        Ok(())
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut pipe = self.outbound.borrow_mut();
        if let Some(kind) = pipe.fail {
            return Err(kind.into());
        }
        let n = match pipe.budget {
            Some(budget) => buf.len().min(budget),
            None => buf.len(),
        };
        if n == 0 && !buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        if let Some(budget) = &mut pipe.budget {
            *budget -= n;
        }
        pipe.data.extend(&buf[..n]);
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = self.inbound.borrow_mut();
        if let Some(kind) = pipe.fail {
            return Err(kind.into());
        }
        if pipe.data.is_empty() {
            return if pipe.eof {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let limit = match self.recv_chunk {
            Some(chunk) => buf.len().min(chunk),
            None => buf.len(),
        };
        let mut n = 0;
        while n < limit {
            match pipe.data.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

/// Scripted connector handing out pre-built streams (or failures) in order.
pub struct ScriptedConnector {
    outcomes: VecDeque<io::Result<LoopbackStream>>,
    pub opened: Rc<RefCell<usize>>,
}

impl ScriptedConnector {
    pub fn new(outcomes: Vec<io::Result<LoopbackStream>>) -> Self {
        ScriptedConnector {
            outcomes: outcomes.into(),
            opened: Rc::new(RefCell::new(0)),
        }
    }

    /// A connector that must never be asked for a stream.
    pub fn unreachable() -> Self {
        Self::new(Vec::new())
    }
}

impl Connector for ScriptedConnector {
    type Stream = LoopbackStream;

    fn open(&mut self, _name: &str) -> io::Result<LoopbackStream> {
        *self.opened.borrow_mut() += 1;
        self.outcomes
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::ConnectionRefused.into()))
    }
}

/// Poll loop stub that records registrations.
///
/// `block` runs an optional hook (used to simulate the peer making
/// progress while the caller is parked) and trips a wedge guard so a test
/// that would really block panics instead of hanging.
#[derive(Default)]
pub struct TestPoll {
    pub immediate_wakes: usize,
    pub timers: Vec<Instant>,
    pub blocks: usize,
    pub on_block: Option<Box<dyn FnMut()>>,
}

impl PollLoop for TestPoll {
    fn immediate_wake(&mut self) {
        self.immediate_wakes += 1;
    }

    fn timer_wake(&mut self, when: Instant) {
        self.timers.push(when);
    }

    fn block(&mut self) {
        self.blocks += 1;
        assert!(self.blocks < 10_000, "poll loop wedged");
        if let Some(hook) = &mut self.on_block {
            hook();
        }
    }
}
