//! Socket lifecycle state machine.
//!
//! # Responsibilities
//! - Enumerate handle states and the directions that can be shut down
//! - Reject non-monotonic transitions
//! - Compute the state reached by a partial or full shutdown
//!
//! ```text
//! Unconnected → Connecting → Connected → Handshaking → Established
//!                                                          │
//!                          HalfShutdown(Read|Write) ←──────┤
//!                                   │                      │
//!                                   └──→ ShutDown ←────────┘
//!                                            │
//!              (any state, on close or failed connect/handshake)
//!                                            ↓
//!                                         Closed
//! ```

use std::fmt;

use crate::error::{EtlsError, EtlsResult};

/// One direction of a duplex TLS stream, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
    Both,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Read => "read",
            Direction::Write => "write",
            Direction::Both => "read/write",
        })
    }
}

/// Lifecycle state of a socket handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Unconnected,
    Connecting,
    /// Plaintext transport attached, no TLS session yet.
    Connected,
    Handshaking,
    Established,
    /// The named direction is shut, the other one still open.
    HalfShutdown(Direction),
    /// Both directions shut; the transport is held until close.
    ShutDown,
    Closed,
}

impl SocketState {
    fn rank(&self) -> u8 {
        match self {
            SocketState::Unconnected => 0,
            SocketState::Connecting => 1,
            SocketState::Connected => 2,
            SocketState::Handshaking => 3,
            SocketState::Established => 4,
            SocketState::HalfShutdown(_) => 5,
            SocketState::ShutDown => 6,
            SocketState::Closed => 7,
        }
    }

    /// Whether moving to `next` keeps the lifecycle monotonic.
    pub fn can_advance_to(&self, next: SocketState) -> bool {
        next.rank() > self.rank()
    }

    pub fn is_readable(&self) -> bool {
        matches!(
            self,
            SocketState::Established | SocketState::HalfShutdown(Direction::Write)
        )
    }

    pub fn is_writable(&self) -> bool {
        matches!(
            self,
            SocketState::Established | SocketState::HalfShutdown(Direction::Read)
        )
    }

    /// Whether a transport is attached and addresses are meaningful.
    pub fn has_transport(&self) -> bool {
        (SocketState::Connected.rank()..SocketState::Closed.rank()).contains(&self.rank())
    }

    /// State reached after shutting `direction`.
    ///
    /// A named direction that is already shut is an error; `Both` only needs
    /// one of the two directions to still be open.
    pub fn after_shutdown(&self, direction: Direction) -> EtlsResult<SocketState> {
        match self {
            SocketState::Established | SocketState::HalfShutdown(_) | SocketState::ShutDown => {}
            SocketState::Closed => return Err(EtlsError::Closed),
            other => {
                return Err(EtlsError::InvalidState {
                    operation: Operation::Shutdown,
                    state: *other,
                })
            }
        }

        let (readable, writable) = (self.is_readable(), self.is_writable());
        let (readable, writable) = match direction {
            Direction::Read if !readable => return Err(EtlsError::DirectionShutDown(direction)),
            Direction::Write if !writable => return Err(EtlsError::DirectionShutDown(direction)),
            Direction::Both if !readable && !writable => {
                return Err(EtlsError::DirectionShutDown(direction))
            }
            Direction::Read => (false, writable),
            Direction::Write => (readable, false),
            Direction::Both => (false, false),
        };

        Ok(match (readable, writable) {
            (false, true) => SocketState::HalfShutdown(Direction::Read),
            (true, false) => SocketState::HalfShutdown(Direction::Write),
            _ => SocketState::ShutDown,
        })
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketState::Unconnected => f.write_str("unconnected"),
            SocketState::Connecting => f.write_str("connecting"),
            SocketState::Connected => f.write_str("connected"),
            SocketState::Handshaking => f.write_str("handshaking"),
            SocketState::Established => f.write_str("established"),
            SocketState::HalfShutdown(direction) => write!(f, "{direction} shut down"),
            SocketState::ShutDown => f.write_str("shut down"),
            SocketState::Closed => f.write_str("closed"),
        }
    }
}

/// Engine operation, used as a label in errors, logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Listen,
    Accept,
    Handshake,
    Send,
    Receive,
    Shutdown,
    Close,
    Query,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::Listen => "listen",
            Operation::Accept => "accept",
            Operation::Handshake => "handshake",
            Operation::Send => "send",
            Operation::Receive => "receive",
            Operation::Shutdown => "shutdown",
            Operation::Close => "close",
            Operation::Query => "query",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
