//! Connection State Machine
//!
//! Defines the valid state transitions for the server connection:
//!
//! ```text
//! ┌──────────────┐     connect()     ┌──────────────┐
//! │ Disconnected │ ─────────────────► │  Connecting  │
//! └──────────────┘                    └──────┬───────┘
//!        ▲  ▲                                │
//!        │  │ handshake failed       handshake ok
//!        │  └────────────────────────────────┤
//!        │                                   ▼
//!        │  remote close / error     ┌──────────────┐
//!        ├───────────────────────────│     Open     │
//!        │                           └──────┬───────┘
//!        │                                  │ disconnect()
//!        │                                  ▼
//!        │                           ┌──────────────┐
//!        └───────────────────────────│   Closing    │
//!                                    └──────────────┘
//! ```
//!
//! Whether a close leads to a reconnect is the supervisor's decision; the
//! machine only records the last error.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

use super::supervisor::ConnectionError;

/// Connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// WebSocket handshake in progress
    Connecting,
    /// Handshake done, frames flowing
    Open,
    /// Close frame sent, waiting for the socket to wind down
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// Lifecycle of the single server connection
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    last_error: Option<ConnectionError>,
    state_changed_at: Instant,
    transition_count: u32,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_error: None,
            state_changed_at: Instant::now(),
            transition_count: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Error that ended the most recent connection, cleared on the next attempt
    pub fn last_error(&self) -> Option<&ConnectionError> {
        self.last_error.as_ref()
    }

    pub fn transition_count(&self) -> u32 {
        self.transition_count
    }

    pub fn start_connecting(&mut self) -> Result<(), StateTransitionError> {
        match self.state {
            ConnectionState::Disconnected => {
                self.transition_to(ConnectionState::Connecting);
                self.last_error = None;
                Ok(())
            }
            _ => Err(StateTransitionError::InvalidTransition {
                from: self.state,
                to: ConnectionState::Connecting,
            }),
        }
    }

    pub fn open(&mut self) -> Result<(), StateTransitionError> {
        match self.state {
            ConnectionState::Connecting => {
                self.transition_to(ConnectionState::Open);
                Ok(())
            }
            _ => Err(StateTransitionError::InvalidTransition {
                from: self.state,
                to: ConnectionState::Open,
            }),
        }
    }

    /// Caller asked to close
    pub fn start_closing(&mut self) -> Result<(), StateTransitionError> {
        match self.state {
            ConnectionState::Open | ConnectionState::Connecting => {
                self.transition_to(ConnectionState::Closing);
                Ok(())
            }
            _ => Err(StateTransitionError::InvalidTransition {
                from: self.state,
                to: ConnectionState::Closing,
            }),
        }
    }

    /// The socket is gone (or never came up). `error` is `None` for a clean close.
    pub fn closed(&mut self, error: Option<ConnectionError>) -> Result<(), StateTransitionError> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Closing => {
                self.transition_to(ConnectionState::Disconnected);
                self.last_error = error;
                Ok(())
            }
            ConnectionState::Disconnected => Err(StateTransitionError::InvalidTransition {
                from: self.state,
                to: ConnectionState::Disconnected,
            }),
        }
    }

    /// Connecting or open
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        )
    }

    fn transition_to(&mut self, new_state: ConnectionState) {
        tracing::debug!(
            "[supervisor] State transition: {} -> {} after {:?} (count: {})",
            self.state,
            new_state,
            self.state_changed_at.elapsed(),
            self.transition_count + 1
        );
        self.state = new_state;
        self.state_changed_at = Instant::now();
        self.transition_count += 1;
    }
}

/// Error type for invalid state transitions
#[derive(Debug, Clone, thiserror::Error)]
pub enum StateTransitionError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut sm = ConnectionStateMachine::new();
        assert_eq!(sm.state(), ConnectionState::Disconnected);

        sm.start_connecting().unwrap();
        sm.open().unwrap();
        assert!(sm.is_active());

        sm.start_closing().unwrap();
        assert_eq!(sm.state(), ConnectionState::Closing);

        sm.closed(None).unwrap();
        assert_eq!(sm.state(), ConnectionState::Disconnected);
        assert!(sm.last_error().is_none());
        assert_eq!(sm.transition_count(), 4);
    }

    #[test]
    fn test_remote_close_records_error() {
        let mut sm = ConnectionStateMachine::new();
        sm.start_connecting().unwrap();
        sm.open().unwrap();
        sm.closed(Some(ConnectionError::CredentialRejected)).unwrap();

        assert_eq!(sm.state(), ConnectionState::Disconnected);
        assert!(matches!(
            sm.last_error(),
            Some(ConnectionError::CredentialRejected)
        ));

        // The next attempt starts clean
        sm.start_connecting().unwrap();
        assert!(sm.last_error().is_none());
    }

    #[test]
    fn test_failed_handshake() {
        let mut sm = ConnectionStateMachine::new();
        sm.start_connecting().unwrap();
        sm.closed(Some(ConnectionError::Transport("refused".to_string())))
            .unwrap();
        assert_eq!(sm.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = ConnectionStateMachine::new();
        assert!(sm.open().is_err());
        assert!(sm.start_closing().is_err());
        assert!(sm.closed(None).is_err());

        sm.start_connecting().unwrap();
        assert!(sm.start_connecting().is_err());
    }
}
