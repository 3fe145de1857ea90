//! WebRTC session engine
//!
//! Default [`SessionEngine`] built on str0m. Rendezvous is a plain HTTP
//! exchange: the SDP offer and the opaque session options are POSTed to
//! `{server}/rooms/{room_id}` and the response carries the answer. After
//! that the engine drives the str0m state machine over a UDP socket until
//! the session ends, translating RTC events into [`EngineEvent`]s.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use str0m::{
    change::{SdpAnswer, SdpOffer},
    media::{Direction, MediaKind, Mid},
    net::{Protocol, Receive},
    Event, IceConnectionState, Input, Output, Rtc,
};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::{EngineError, EngineEvent, SessionEngine};
use crate::model::options::SessionOptions;
use crate::model::state::ConnectivityState;
use crate::model::tracks::{TrackOrigin, VideoTrack};
use crate::util::gather_host_candidates;

/// str0m-backed engine negotiating one send/recv video session per room.
pub struct WebRtcEngine {
    http: reqwest::Client,
    server_url: String,
}

#[derive(Serialize)]
struct JoinRequest<'a> {
    offer: SdpOffer,
    options: &'a SessionOptions,
}

#[derive(Deserialize)]
struct JoinResponse {
    answer: SdpAnswer,
}

impl WebRtcEngine {
    /// `server_url` is the base URL of the rendezvous server, e.g.
    /// `http://127.0.0.1:3000`.
    pub fn new(server_url: impl Into<String>) -> WebRtcEngine {
        WebRtcEngine {
            http: reqwest::Client::new(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn room_url(&self, room_id: &str) -> String {
        format!("{}/rooms/{}", self.server_url, room_id)
    }
}

#[async_trait]
impl SessionEngine for WebRtcEngine {
    async fn run(
        &self,
        room_id: String,
        options: SessionOptions,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), EngineError> {
        let mut rtc = Rtc::builder().build();

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let local_addr = socket.local_addr()?;
        info!("bound udp port {}", local_addr);

        for candidate in gather_host_candidates(local_addr.port())? {
            rtc.add_local_candidate(candidate);
        }

        let mut change = rtc.sdp_api();
        let local_mid = change.add_media(MediaKind::Video, Direction::SendRecv, None, None, None);
        let (offer, pending) = change
            .apply()
            .ok_or_else(|| EngineError::Sdp("no pending changes to offer".into()))?;

        let response = self
            .http
            .post(self.room_url(&room_id))
            .json(&JoinRequest {
                offer,
                options: &options,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| EngineError::Rendezvous(e.to_string()))?;

        let join: JoinResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Rendezvous(e.to_string()))?;

        rtc.sdp_api()
            .accept_answer(pending, join.answer)
            .map_err(|e| EngineError::Sdp(e.to_string()))?;

        info!("answer accepted for room {}, starting rtc loop", room_id);

        drive(rtc, socket, local_mid, events).await
    }
}

/// Drive the str0m state machine until the session ends.
///
/// Alternates between flushing all pending output (packets and events) and
/// waiting on either incoming UDP traffic or the poll timeout. A closed
/// event channel means the client cancelled; the loop stops quietly.
async fn drive(
    mut rtc: Rtc,
    socket: UdpSocket,
    local_mid: Mid,
    events: mpsc::Sender<EngineEvent>,
) -> Result<(), EngineError> {
    let local_addr = socket.local_addr()?;
    let mut buf = vec![0u8; 2000];
    let mut negotiated = false;

    while rtc.is_alive() {
        let deadline = loop {
            match rtc
                .poll_output()
                .map_err(|e| EngineError::Rtc(e.to_string()))?
            {
                Output::Timeout(v) => break v,
                Output::Transmit(v) => {
                    if let Err(e) = socket.try_send_to(&v.contents, v.destination) {
                        debug!("udp send failed: {}", e);
                    }
                }
                Output::Event(v) => {
                    if handle_event(v, &mut rtc, local_mid, &mut negotiated, &events)
                        .await
                        .is_err()
                    {
                        // Receiver dropped: the client cancelled the session.
                        return Ok(());
                    }
                }
            }
        };

        let wait = deadline.saturating_duration_since(Instant::now());

        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (n, source) = received?;
                let Ok(contents) = (&buf[..n]).try_into() else {
                    debug!("discarding malformed datagram from {}", source);
                    continue;
                };
                rtc.handle_input(Input::Receive(
                    Instant::now(),
                    Receive {
                        proto: Protocol::Udp,
                        source,
                        destination: local_addr,
                        contents,
                    },
                ))
                .map_err(|e| EngineError::Rtc(e.to_string()))?;
            }
            _ = tokio::time::sleep(wait) => {
                rtc.handle_input(Input::Timeout(Instant::now()))
                    .map_err(|e| EngineError::Rtc(e.to_string()))?;
            }
        }
    }

    if negotiated {
        Ok(())
    } else {
        Err(EngineError::Closed)
    }
}

async fn handle_event(
    event: Event,
    rtc: &mut Rtc,
    local_mid: Mid,
    negotiated: &mut bool,
    events: &mpsc::Sender<EngineEvent>,
) -> Result<(), mpsc::error::SendError<EngineEvent>> {
    match event {
        Event::IceConnectionStateChange(state) => {
            info!("ice connection state: {:?}", state);

            if !*negotiated
                && matches!(
                    state,
                    IceConnectionState::Connected | IceConnectionState::Completed
                )
            {
                *negotiated = true;
                events.send(EngineEvent::Negotiated).await?;
                events
                    .send(EngineEvent::LocalTrack(VideoTrack::shared(
                        local_mid.to_string(),
                        TrackOrigin::Local,
                    )))
                    .await?;
            }

            events.send(EngineEvent::Connectivity(state.into())).await?;

            if state == IceConnectionState::Disconnected {
                // Ice disconnect could mean trying to re-establish, but this
                // engine ends the session directly.
                rtc.disconnect();
            }
            Ok(())
        }
        Event::MediaAdded(media) => {
            info!("remote media added: {:?}", media.mid);
            events
                .send(EngineEvent::RemoteTrack(VideoTrack::shared(
                    media.mid.to_string(),
                    TrackOrigin::Remote,
                )))
                .await
        }
        _ => Ok(()),
    }
}

impl From<IceConnectionState> for ConnectivityState {
    fn from(state: IceConnectionState) -> ConnectivityState {
        match state {
            IceConnectionState::New => ConnectivityState::New,
            IceConnectionState::Checking => ConnectivityState::Checking,
            IceConnectionState::Connected => ConnectivityState::Connected,
            IceConnectionState::Completed => ConnectivityState::Completed,
            IceConnectionState::Disconnected => ConnectivityState::Disconnected,
        }
    }
}
