//! Media track handles
//!
//! Track handles are produced by the session engine and consumed by the
//! listener. Ownership is shared via `Arc`: the client only relays the
//! reference, it never controls track lifetime.

use std::sync::Arc;

/// Handle to a negotiated video track.
///
/// The `id` is assigned by the engine (for the WebRTC engine it is the SDP
/// media line identifier) and is stable for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTrack {
    id: String,
    origin: TrackOrigin,
}

/// Which side of the session a track belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOrigin {
    /// Sent by this client.
    Local,
    /// Received from the remote peer.
    Remote,
}

impl VideoTrack {
    pub fn new(id: impl Into<String>, origin: TrackOrigin) -> VideoTrack {
        VideoTrack {
            id: id.into(),
            origin,
        }
    }

    /// Engine-assigned track identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin(&self) -> TrackOrigin {
        self.origin
    }

    pub(crate) fn shared(id: impl Into<String>, origin: TrackOrigin) -> Arc<VideoTrack> {
        Arc::new(VideoTrack::new(id, origin))
    }
}
