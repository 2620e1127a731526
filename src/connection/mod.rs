//! Server connection: state machine and supervisor.

mod state;
mod supervisor;

pub use state::{ConnectionState, ConnectionStateMachine, StateTransitionError};
pub use supervisor::{
    ConnectionError, ConnectionSettings, ConnectionSupervisor, Outbound, CLOSE_POLICY_VIOLATION,
};
