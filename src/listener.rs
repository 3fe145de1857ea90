//! Listener contract
//!
//! A passive observer the client drives as the session progresses. All
//! notifications are fired from the client's single internal task, so a
//! listener is never invoked concurrently with itself. Implementations
//! must return quickly; a slow listener stalls every subsequent session
//! event.

use std::sync::Arc;

use crate::error::RoomError;
use crate::model::state::{ConnectionState, ConnectivityState};
use crate::model::tracks::VideoTrack;

/// Receives session notifications from a [`RoomClient`](crate::RoomClient).
///
/// The client holds the listener as a `Weak` reference. If the owning `Arc`
/// is dropped, notifications are silently skipped; the session itself keeps
/// running. All methods have empty default bodies so implementors only
/// override what they care about.
pub trait RoomListener: Send + Sync {
    /// Fired exactly once per lifecycle transition, in transition order.
    fn on_state_changed(&self, state: ConnectionState) {
        let _ = state;
    }

    /// Fired for every transport connectivity report while the session is
    /// in the `Connected` phase. No coalescing.
    fn on_connectivity_changed(&self, state: ConnectivityState) {
        let _ = state;
    }

    /// Fired at most once per session when the outbound video track is
    /// negotiated. The handle stays valid until the session ends.
    fn on_local_track(&self, track: Arc<VideoTrack>) {
        let _ = track;
    }

    /// Fired at most once per session when the remote video track arrives.
    fn on_remote_track(&self, track: Arc<VideoTrack>) {
        let _ = track;
    }

    /// Fired on unrecoverable session errors. Always followed by a
    /// transition to `Disconnected` when a session was in progress.
    fn on_error(&self, error: RoomError) {
        let _ = error;
    }
}
