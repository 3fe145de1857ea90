//! Error types for the room client
//!
//! No error crosses the public boundary as a panic or a return value from
//! `connect`; every failure is delivered through
//! [`RoomListener::on_error`](crate::RoomListener::on_error) and resolves
//! to a clean `Disconnected` state, leaving the client reusable.

use thiserror::Error;

use crate::engine::EngineError;
use crate::model::state::ConnectionState;

/// Failures reported to the listener.
#[derive(Debug, Error)]
pub enum RoomError {
    /// `connect` was called with an empty room id.
    #[error("room id must not be empty")]
    EmptyRoomId,

    /// `connect` was called while a session was already in progress.
    /// The existing session is left untouched.
    #[error("connect rejected: client is already {0:?}")]
    AlreadyActive(ConnectionState),

    /// Rendezvous or negotiation failed before the session was established.
    #[error("negotiation failed: {0}")]
    Negotiation(#[source] EngineError),

    /// An established session failed fatally.
    #[error("session failed: {0}")]
    Session(#[source] EngineError),
}
