//! Connection and connectivity state enumerations
//!
//! `ConnectionState` is the client's own lifecycle state. `ConnectivityState`
//! is the transport-layer liveness of an already established session; the
//! client forwards those values verbatim and never interprets them.

/// Lifecycle state of a [`RoomClient`](crate::RoomClient).
///
/// Transitions are strictly ordered: `Disconnected` -> `Connecting` ->
/// `Connected`, or any state back to `Disconnected`. Every transition is
/// announced to the listener before it becomes visible through
/// [`RoomClient::current_state`](crate::RoomClient::current_state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session. The initial state, and where every session ends up.
    Disconnected,
    /// Rendezvous and negotiation are in flight.
    Connecting,
    /// Negotiation succeeded; the session is live.
    Connected,
}

impl ConnectionState {
    /// Encoding used for the shared atomic behind `current_state()`.
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> ConnectionState {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Transport-level connectivity of an established session.
///
/// Values are reported by the session engine and relayed to the listener
/// one-for-one, without coalescing. They are distinct from
/// [`ConnectionState`]: a session can stay `Connected` while its transport
/// wanders through degraded connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}
