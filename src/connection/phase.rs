//! Connection phase state machine (ยง3/ยง4.1).

use std::fmt;

/// The connection's current phase. Transitions are serialized through the
/// single logical driver task (ยง5); nothing outside `connection::driver`
/// mutates this directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Init,
    EndpointDiscovery,
    ConnectionEstablishing,
    Authentication,
    Connected,
    Reconnecting,
    /// Terminal. Reserved for a fatal local error observed mid-transition
    /// (e.g. a phase invariant violation); the driver always proceeds
    /// straight to `Closed` on any error it can name, so this is never
    /// produced by normal operation.
    Invalid,
    Closed,
}

impl ConnectionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionPhase::Closed)
    }

    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionPhase::Connected)
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
