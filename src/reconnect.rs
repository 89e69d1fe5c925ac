//! Connection retry and liveness state machine for reconnecting sessions.
//!
//! The controller owns all timing in the session layer: exponential backoff
//! between connection attempts, a connect timeout, and the keepalive probe
//! schedule. It performs no I/O itself. The session reports what happened
//! (`connecting`, `connected`, `connect_failed`, `disconnected`,
//! `received`) and asks for a decision each tick through [`run`]; the
//! endpoint stays timeless.
//!
//! [`run`]: Reconnect::run

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::RpcError;
use crate::poll::PollLoop;

/// Default lower bound between connection attempts.
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(1);
/// Default upper bound between connection attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(8);
/// Default interval of silence before a keepalive probe is sent, and again
/// before the probed connection is declared dead.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// What the session should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open a new stream toward the configured name.
    Connect,
    /// Tear down the current endpoint or in-progress stream.
    Disconnect,
    /// Send a keepalive probe on the live endpoint.
    Probe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Disabled, or gave up after exhausting `max_tries`.
    Void,
    /// Waiting out the backoff before the next connection attempt.
    Backoff,
    /// A connection attempt is in flight.
    ConnectInProgress,
    /// Connected, traffic seen recently.
    Active,
    /// Connected, probe sent, waiting for any traffic.
    ProbeSent,
}

/// Backoff and liveness controller for one named peer.
#[derive(Debug)]
pub struct Reconnect {
    name: String,
    min_backoff: Duration,
    max_backoff: Duration,
    probe_interval: Duration,
    /// Remaining connection attempts; `None` is unlimited.
    max_tries: Option<u32>,

    state: State,
    entered: Instant,
    backoff: Duration,
    last_received: Instant,
    reconnect_requested: bool,
}

impl Reconnect {
    /// Creates a disabled controller anchored at `now`.
    pub fn new(now: Instant) -> Self {
        Reconnect {
            name: String::from("void"),
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            max_tries: None,
            state: State::Void,
            entered: now,
            backoff: Duration::ZERO,
            last_received: now,
            reconnect_requested: false,
        }
    }

    /// The peer name, stable across reconnects.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Caps the number of connection attempts; `None` is unlimited and
    /// `Some(0)` disables reconnection entirely.
    pub fn set_max_tries(&mut self, max_tries: Option<u32>) {
        self.max_tries = max_tries;
    }

    /// Remaining connection attempts; `None` is unlimited.
    pub fn tries_left(&self) -> Option<u32> {
        self.max_tries
    }

    /// Enables the controller. The first Connect decision fires on the
    /// next [`run`](Reconnect::run).
    pub fn enable(&mut self, now: Instant) {
        if self.state == State::Void && self.may_retry() {
            self.backoff = Duration::ZERO;
            self.transition(now, State::Backoff);
        }
    }

    fn may_retry(&self) -> bool {
        self.max_tries != Some(0)
    }

    fn transition(&mut self, now: Instant, state: State) {
        if self.state != state {
            debug!("{}: entering {:?}", self.name, state);
        }
        self.state = state;
        self.entered = now;
    }

    /// Records that a connection attempt has started.
    pub fn connecting(&mut self, now: Instant) {
        info!("{}: connecting", self.name);
        if let Some(tries) = &mut self.max_tries {
            *tries = tries.saturating_sub(1);
        }
        self.transition(now, State::ConnectInProgress);
    }

    /// Records a successfully established connection.
    pub fn connected(&mut self, now: Instant) {
        info!("{}: connected", self.name);
        self.backoff = Duration::ZERO;
        self.last_received = now;
        self.transition(now, State::Active);
    }

    /// Records a failed connection attempt.
    pub fn connect_failed(&mut self, now: Instant, error: &io::Error) {
        warn!("{}: connection attempt failed: {}", self.name, error);
        self.drop_connection(now);
    }

    /// Records that an established connection, or one in progress, is gone.
    pub fn disconnected(&mut self, now: Instant, error: Option<&RpcError>) {
        match error {
            Some(error) => info!("{}: connection dropped: {}", self.name, error),
            None => info!("{}: connection dropped", self.name),
        }
        self.drop_connection(now);
    }

    fn drop_connection(&mut self, now: Instant) {
        self.reconnect_requested = false;
        if !self.may_retry() {
            info!("{}: exhausted connection attempts, giving up", self.name);
            self.transition(now, State::Void);
            return;
        }
        self.backoff = if self.backoff.is_zero() {
            self.min_backoff
        } else {
            (self.backoff * 2).min(self.max_backoff)
        };
        info!(
            "{}: waiting {:?} before reconnect",
            self.name, self.backoff
        );
        self.transition(now, State::Backoff);
    }

    /// Records received traffic, resetting the probe schedule.
    pub fn received(&mut self, now: Instant) {
        self.last_received = now;
        if self.state == State::ProbeSent {
            self.transition(now, State::Active);
        }
    }

    /// Requests that the current connection be dropped and retried.
    pub fn force_reconnect(&mut self, _now: Instant) {
        if matches!(
            self.state,
            State::ConnectInProgress | State::Active | State::ProbeSent
        ) {
            self.reconnect_requested = true;
        }
    }

    /// The deadline of the next scheduled decision, if any.
    fn deadline(&self) -> Option<Instant> {
        match self.state {
            State::Void => None,
            State::Backoff => Some(self.entered + self.backoff),
            // A connection attempt gets at least the minimum backoff to
            // settle before it is abandoned.
            State::ConnectInProgress => Some(self.entered + self.backoff.max(self.min_backoff)),
            State::Active => Some(self.last_received + self.probe_interval),
            State::ProbeSent => Some(self.entered + self.probe_interval),
        }
    }

    /// Asks for this tick's decision; `None` means nothing to do yet.
    pub fn run(&mut self, now: Instant) -> Option<Action> {
        if self.reconnect_requested {
            self.reconnect_requested = false;
            return Some(Action::Disconnect);
        }
        match self.deadline() {
            Some(deadline) if now >= deadline => {}
            _ => return None,
        }
        match self.state {
            State::Void => None,
            State::Backoff => Some(Action::Connect),
            State::ConnectInProgress => {
                warn!("{}: connection attempt timed out", self.name);
                Some(Action::Disconnect)
            }
            State::Active => {
                debug!(
                    "{}: idle {:?}, sending keepalive probe",
                    self.name,
                    now.duration_since(self.last_received)
                );
                self.transition(now, State::ProbeSent);
                Some(Action::Probe)
            }
            State::ProbeSent => {
                warn!("{}: no response to keepalive probe", self.name);
                Some(Action::Disconnect)
            }
        }
    }

    /// Registers the next decision deadline with the poll loop.
    pub fn wait(&self, poll: &mut dyn PollLoop, _now: Instant) {
        if let Some(deadline) = self.deadline() {
            poll.timer_wake(deadline);
        }
    }
}
