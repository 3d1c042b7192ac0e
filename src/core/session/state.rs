use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the single logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Constructed, not yet activated
    Disconnected,
    /// Transport opening or STOMP handshake in progress
    Connecting,
    /// CONNECTED received, subscriptions applied
    Connected,
    /// Waiting out the reconnect delay
    Reconnecting,
    /// Deactivated; terminal
    Closed,
}

impl ConnectionState {
    /// Whether the state machine allows `self -> next`
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Connected) => true,
            (Connecting, Reconnecting) => true,
            (Connected, Reconnecting) => true,
            (Reconnecting, Connecting) => true,
            _ => false,
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    /// What an operator-facing indicator should show
    pub fn indicator(self) -> &'static str {
        match self {
            ConnectionState::Connected => "live",
            ConnectionState::Connecting | ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnected | ConnectionState::Closed => "offline",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Counters maintained by the connection task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// MESSAGE frames received while connected
    pub frames_received: u64,
    /// Frames delivered to at least one handler
    pub frames_dispatched: u64,
    /// Frames dropped because the body did not decode
    pub decode_failures: u64,
    /// Handler invocations that returned an error or panicked
    pub handler_failures: u64,
    /// Frames for topics with no handler
    pub dropped_no_listener: u64,
    /// Frames that arrived after teardown was requested
    pub dropped_after_teardown: u64,
    /// Malformed frames and server ERROR frames
    pub protocol_errors: u64,
    /// Times the Reconnecting state was entered
    pub reconnect_attempts: u64,
    /// Times the Connected state was reached
    pub connections_established: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_received: u64,
}
