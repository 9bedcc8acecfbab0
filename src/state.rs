// MIT License - Copyright (c) 2015-2017 Nikishin Alexander
// Rust translation of OBDConnectionProtocol.swift

use std::fmt;

use crate::error::ObdError;

/// Lifecycle state of the connection.
///
/// Exactly one value holds at any instant. `send` is only accepted while
/// the connection is `Open`; a request in flight is represented by
/// `Transmitting`.
#[derive(Debug, Clone)]
pub enum ConnectionState {
    /// No transport resources are held.
    Closed,
    /// A stream pair to the adapter is being established.
    Connecting,
    /// Connection ready to send data.
    Open,
    /// A request is in flight, waiting for the terminator or the timeout.
    Transmitting,
    /// The transport failed or ended. Re-opening is allowed from here.
    Error(ObdError),
}

impl PartialEq for ConnectionState {
    /// State comparison treats every `Error(_)` as equal regardless of the
    /// carried kind. Only the state machine compares states; the specific
    /// kind stays observable through the value itself and through the
    /// state-change notification.
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Closed, Self::Closed)
                | (Self::Connecting, Self::Connecting)
                | (Self::Open, Self::Open)
                | (Self::Transmitting, Self::Transmitting)
                | (Self::Error(_), Self::Error(_))
        )
    }
}

impl Eq for ConnectionState {}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::Connecting => write!(f, "trying to connect to OBD adapter"),
            Self::Open => write!(f, "connection ready to send data"),
            Self::Transmitting => write!(f, "transmitting data between host and adapter"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

impl ConnectionState {
    /// Whether `open()` is accepted in this state.
    ///
    /// Accepted from `Closed` and from any `Error(_)` state; re-opening an
    /// already-active connection is a caller bug.
    pub(crate) fn can_open(&self) -> bool {
        matches!(self, Self::Closed | Self::Error(_))
    }
}
