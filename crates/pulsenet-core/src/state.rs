//! Connection state machine: the six-state FSM that gates every
//! connect/disconnect/send operation on a [`crate::session::Session`].

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
    Reconnecting = 4,
    Error = 5,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnecting,
            4 => ConnectionState::Reconnecting,
            5 => ConnectionState::Error,
            _ => unreachable!("invalid ConnectionState discriminant"),
        }
    }
}

/// Reason carried alongside a transition into [`ConnectionState::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionError {
    #[default]
    None = 0,
    Timeout = 1,
    Refused = 2,
    NetworkUnavailable = 3,
    ProtocolError = 4,
    AuthenticationFailed = 5,
    ServerFull = 6,
    VersionMismatch = 7,
    Unknown = 8,
}

impl ConnectionError {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionError::None,
            1 => ConnectionError::Timeout,
            2 => ConnectionError::Refused,
            3 => ConnectionError::NetworkUnavailable,
            4 => ConnectionError::ProtocolError,
            5 => ConnectionError::AuthenticationFailed,
            6 => ConnectionError::ServerFull,
            7 => ConnectionError::VersionMismatch,
            _ => ConnectionError::Unknown,
        }
    }
}

/// Allowed transition table of §4.3: returns whether `to` is reachable from `from`.
fn can_transition(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::*;
    matches!(
        (from, to),
        (Disconnected, Connecting)
            | (Disconnected, Error)
            | (Connecting, Connected)
            | (Connecting, Disconnecting)
            | (Connecting, Error)
            | (Connected, Disconnecting)
            | (Connected, Reconnecting)
            | (Connected, Error)
            | (Disconnecting, Disconnected)
            | (Disconnecting, Error)
            | (Reconnecting, Connected)
            | (Reconnecting, Disconnecting)
            | (Reconnecting, Error)
            | (Error, Disconnected)
            | (Error, Reconnecting)
    )
}

/// Atomically-held connection state plus the error recorded on the last
/// transition into `Error`. Every mutation passes through [`StateMachine::transition`],
/// which validates against the §4.3 table and is a silent no-op on an illegal request.
pub struct StateMachine {
    state: AtomicU8,
    last_error: AtomicU8,
    reconnect_attempts: AtomicU8,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            last_error: AtomicU8::new(ConnectionError::None as u8),
            reconnect_attempts: AtomicU8::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn last_error(&self) -> ConnectionError {
        ConnectionError::from_u8(self.last_error.load(Ordering::Acquire))
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Acquire) as u32
    }

    pub fn can_transition_to(&self, to: ConnectionState) -> bool {
        can_transition(self.state(), to)
    }

    /// Attempts the transition. Returns `true` if it was applied.
    ///
    /// Entering `Connected` resets the reconnect attempt counter; entering
    /// `Reconnecting` increments it. Only this function mutates the counter
    /// (see §9: the source's double-mutation of the attempt counter is not
    /// preserved).
    pub fn transition(&self, to: ConnectionState, error: ConnectionError) -> bool {
        let from = self.state();
        if !can_transition(from, to) {
            return false;
        }
        match to {
            ConnectionState::Connected => {
                self.reconnect_attempts.store(0, Ordering::Release);
            }
            ConnectionState::Reconnecting => {
                self.reconnect_attempts.fetch_add(1, Ordering::AcqRel);
            }
            _ => {}
        }
        if to == ConnectionState::Error {
            self.last_error.store(error as u8, Ordering::Release);
        } else {
            self.last_error.store(ConnectionError::None as u8, Ordering::Release);
        }
        self.state.store(to as u8, Ordering::Release);
        true
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transition_table_matches_spec() {
        use ConnectionState::*;
        let legal = [
            (Disconnected, Connecting),
            (Disconnected, Error),
            (Connecting, Connected),
            (Connecting, Disconnecting),
            (Connecting, Error),
            (Connected, Disconnecting),
            (Connected, Reconnecting),
            (Connected, Error),
            (Disconnecting, Disconnected),
            (Disconnecting, Error),
            (Reconnecting, Connected),
            (Reconnecting, Disconnecting),
            (Reconnecting, Error),
            (Error, Disconnected),
            (Error, Reconnecting),
        ];
        let all = [
            Disconnected,
            Connecting,
            Connected,
            Disconnecting,
            Reconnecting,
            Error,
        ];
        for &from in &all {
            for &to in &all {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    can_transition(from, to),
                    expected,
                    "transition {from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn illegal_transition_is_silent_noop() {
        let sm = StateMachine::new();
        assert!(!sm.transition(ConnectionState::Connected, ConnectionError::None));
        assert_eq!(sm.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn entering_connected_resets_attempts_entering_reconnecting_increments() {
        let sm = StateMachine::new();
        sm.transition(ConnectionState::Connecting, ConnectionError::None);
        sm.transition(ConnectionState::Connected, ConnectionError::None);
        sm.transition(ConnectionState::Reconnecting, ConnectionError::None);
        assert_eq!(sm.reconnect_attempts(), 1);
        sm.transition(ConnectionState::Disconnecting, ConnectionError::None);
        sm.transition(ConnectionState::Error, ConnectionError::Refused);
        assert_eq!(sm.last_error(), ConnectionError::Refused);
        sm.transition(ConnectionState::Reconnecting, ConnectionError::None);
        assert_eq!(sm.reconnect_attempts(), 2);
        sm.transition(ConnectionState::Connected, ConnectionError::None);
        assert_eq!(sm.reconnect_attempts(), 0);
    }
}
