//! Session engine contract
//!
//! The engine is the rendezvous/negotiation collaborator: it accepts a room
//! id plus opaque options, performs session setup, and then streams events
//! until the session ends. The client treats it as an opaque asynchronous
//! operation with a cancel handle (the spawned task is aborted and the
//! event receiver dropped on disconnect).

pub mod webrtc;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::model::options::SessionOptions;
use crate::model::state::ConnectivityState;
use crate::model::tracks::VideoTrack;

/// Events an engine reports back to the client while a session is running.
#[derive(Debug)]
pub enum EngineEvent {
    /// Rendezvous and negotiation succeeded; the session is established.
    Negotiated,
    /// Transport connectivity changed. May be reported at any time; the
    /// client only relays values observed after `Negotiated`.
    Connectivity(ConnectivityState),
    /// The outbound video track is ready.
    LocalTrack(Arc<VideoTrack>),
    /// A remote video track arrived.
    RemoteTrack(Arc<VideoTrack>),
    /// The session failed fatally. Terminal for the attempt.
    Failed(EngineError),
}

/// Failures produced by a session engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The rendezvous server rejected or failed the join request.
    #[error("rendezvous server error: {0}")]
    Rendezvous(String),

    /// SDP offer/answer negotiation failed.
    #[error("sdp negotiation error: {0}")]
    Sdp(String),

    /// Socket-level failure.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// No usable local ICE candidate could be gathered.
    #[error("no usable ice candidates")]
    NoCandidates,

    /// The underlying RTC state machine reported an error.
    #[error("rtc error: {0}")]
    Rtc(String),

    /// The engine ended before negotiation completed.
    #[error("session closed before negotiation completed")]
    Closed,
}

/// Rendezvous/negotiation collaborator driven by the client.
///
/// `run` covers the whole session: it returns once the session is over.
/// `Ok(())` means a clean end (remote side or transport closed); an `Err`
/// is reported to the listener as a failure. Implementations must tolerate
/// cancellation at any await point and a closed event channel (both mean
/// the client disconnected; stop quietly).
#[async_trait]
pub trait SessionEngine: Send + Sync + 'static {
    async fn run(
        &self,
        room_id: String,
        options: SessionOptions,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), EngineError>;
}
