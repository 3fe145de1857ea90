//! roomlink – room-based peer connection client
//!
//! A [`RoomClient`] establishes a session with a rendezvous server for a
//! given room id, negotiates a peer connection through a pluggable
//! [`SessionEngine`], and reports state transitions, connectivity changes
//! and media tracks to a [`RoomListener`].
//!
//! ```rust,ignore
//! let engine = Arc::new(WebRtcEngine::new("http://localhost:3000"));
//! let listener: Arc<dyn RoomListener> = Arc::new(MyListener);
//! let client = RoomClient::new(engine, Arc::downgrade(&listener));
//!
//! client.connect("room42", SessionOptions::new().with("codec", "vp8"));
//! // ... notifications arrive on the listener ...
//! client.disconnect();
//! ```

pub mod client;
pub mod engine;
pub mod error;
pub mod listener;
pub mod model;

mod util;

pub use client::RoomClient;
pub use engine::webrtc::WebRtcEngine;
pub use engine::{EngineError, EngineEvent, SessionEngine};
pub use error::RoomError;
pub use listener::RoomListener;
pub use model::options::SessionOptions;
pub use model::state::{ConnectionState, ConnectivityState};
pub use model::tracks::{TrackOrigin, VideoTrack};
