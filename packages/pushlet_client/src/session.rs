//! Session state machine.
//!
//! Ranks follow the protocol: `ERROR(-2) ABORTED(-1) UNINITIALIZED(1)
//! READY(2) JOINED(3) LISTENING(3)`. JOINED and LISTENING share a rank and
//! are told apart by their variant. Terminal states absorb every trigger.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::command::{Command, Precondition};
use crate::event::Event;
use crate::protocol::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Error,
    Aborted,
    Uninitialized,
    Ready,
    Joined,
    Listening,
}

impl SessionState {
    pub fn rank(&self) -> i8 {
        match self {
            Self::Error => -2,
            Self::Aborted => -1,
            Self::Uninitialized => 1,
            Self::Ready => 2,
            Self::Joined | Self::Listening => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() < 0
    }

    pub fn satisfies(&self, precondition: Precondition) -> bool {
        match precondition {
            Precondition::Alive => !self.is_terminal(),
            Precondition::Ready => self.rank() >= Self::Ready.rank(),
            Precondition::Joined => self.rank() >= Self::Joined.rank(),
            Precondition::Listening => *self == Self::Listening,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Aborted => "aborted",
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Joined => "joined",
            Self::Listening => "listening",
        };
        write!(f, "{name}({})", self.rank())
    }
}

/// What to do with a command right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Issue,
    Defer,
    Drop,
}

/// A state change applied by [`Session::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Session id, state and the long-poll bookkeeping of one client.
///
/// Every join starts a new epoch. Long polls and renewals are counted per
/// epoch, so a poll still held open for a previous session never blocks the
/// current one.
#[derive(Debug)]
pub struct Session {
    id: Option<String>,
    state: SessionState,
    epoch: u64,
    polls_in_flight: usize,
    renewal_pending: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: None,
            state: SessionState::Uninitialized,
            epoch: 0,
            polls_in_flight: 0,
            renewal_pending: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn polls_in_flight(&self) -> usize {
        self.polls_in_flight
    }

    /// UNINITIALIZED -> READY. Returns whether the state changed.
    pub fn initialize(&mut self) -> bool {
        if self.state == SessionState::Uninitialized {
            self.state = SessionState::Ready;
            true
        } else {
            false
        }
    }

    /// Decide whether `command` may be sent now. Issuing a long poll or a
    /// leave updates the session as part of the decision.
    pub fn admit(&mut self, command: Command) -> Admission {
        let admission = self.decide(command);
        if command == Command::Refresh && admission != Admission::Defer {
            self.renewal_pending = false;
        }
        admission
    }

    /// Admission for a renewal scheduled in `epoch`. Renewals from a replaced
    /// session are dropped.
    pub fn admit_renewal(&mut self, epoch: u64) -> Admission {
        if epoch != self.epoch {
            return Admission::Drop;
        }
        self.admit(Command::Refresh)
    }

    fn decide(&mut self, command: Command) -> Admission {
        if self.state.is_terminal() {
            return Admission::Drop;
        }
        if !self.state.satisfies(command.precondition()) {
            return if command.defers() {
                Admission::Defer
            } else {
                Admission::Drop
            };
        }
        // renewal waits for the held poll instead of overlapping it
        if command == Command::Refresh && self.polls_in_flight > 0 {
            return Admission::Defer;
        }
        if command == Command::Leave {
            self.state = SessionState::Ready;
        }
        if command.is_long_poll() {
            self.polls_in_flight += 1;
        }
        Admission::Issue
    }

    /// A long-poll response (or failure) from `epoch` arrived.
    pub fn poll_finished(&mut self, epoch: u64) {
        if epoch == self.epoch {
            self.polls_in_flight = self.polls_in_flight.saturating_sub(1);
        }
    }

    /// Claim the single renewal slot for a refresh received in `epoch`.
    /// Returns false when a renewal is already pending or the session moved on.
    pub fn schedule_renewal(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.renewal_pending || self.state.is_terminal() {
            return false;
        }
        self.renewal_pending = true;
        true
    }

    /// Start a fresh join: adopt `session_id` or forget the held one. A
    /// session at JOINED or above falls back to READY so the held id and the
    /// state never disagree.
    pub fn begin_join(&mut self, session_id: Option<&str>) {
        if self.state.is_terminal() {
            return;
        }
        self.id = session_id.map(str::to_owned);
        self.epoch += 1;
        self.polls_in_flight = 0;
        self.renewal_pending = false;
        if self.state.rank() > SessionState::Ready.rank() {
            self.state = SessionState::Ready;
        }
    }

    /// Apply the state effect of an inbound event.
    pub fn apply(&mut self, event: &Event) -> Option<Transition> {
        if self.state.is_terminal() {
            return None;
        }
        let from = self.state;
        match event.kind() {
            EventKind::Error => self.state = SessionState::Error,
            EventKind::Abort => self.state = SessionState::Aborted,
            EventKind::JoinAck => {
                self.state = if self.adopt_id(event) {
                    SessionState::Joined
                } else {
                    SessionState::Error
                };
            }
            EventKind::JoinListenAck => {
                self.state = if self.adopt_id(event) {
                    SessionState::Listening
                } else {
                    SessionState::Error
                };
            }
            EventKind::ListenAck => self.state = SessionState::Listening,
            EventKind::LeaveAck => {
                if self.state.rank() <= SessionState::Ready.rank() {
                    self.id = None;
                }
            }
            _ => {}
        }
        (from != self.state).then_some(Transition {
            from,
            to: self.state,
        })
    }

    /// Take the acknowledged id. False when neither the event nor the
    /// session has one.
    fn adopt_id(&mut self, event: &Event) -> bool {
        if let Some(id) = event.session_id() {
            self.id = Some(id.to_owned());
        }
        if self.id.is_none() {
            warn!(event = %event.event_type(), "acknowledgement without session id");
            return false;
        }
        true
    }
}
