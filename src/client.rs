//! Room client
//!
//! [`RoomClient`] manages one room connection's lifecycle and reports every
//! state change and media event to its listener. All work happens on a
//! single internal tokio task: public operations enqueue commands, the task
//! processes them in order and fires listener notifications, so the
//! listener is never invoked concurrently with itself.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::{EngineError, EngineEvent, SessionEngine};
use crate::error::RoomError;
use crate::listener::RoomListener;
use crate::model::options::SessionOptions;
use crate::model::state::ConnectionState;

/// Capacity of the per-session engine event channel.
const ENGINE_EVENT_CAPACITY: usize = 32;

/// Handle to a room connection.
///
/// Created with [`RoomClient::new`] inside a tokio runtime. `connect` and
/// `disconnect` are non-blocking; completion is observed only through the
/// listener. Dropping the handle tears the session down asynchronously;
/// [`RoomClient::close`] does the same but waits for it.
pub struct RoomClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<SharedState>,
    actor: JoinHandle<()>,
}

struct SharedState {
    state: AtomicU8,
}

enum Command {
    Connect {
        room_id: String,
        options: SessionOptions,
    },
    Disconnect,
    SetListener(Option<Weak<dyn RoomListener>>),
}

impl RoomClient {
    /// Construct a client bound to the given listener and spawn its task on
    /// the ambient tokio runtime.
    ///
    /// The listener is held weakly: the caller keeps the owning `Arc`, and
    /// once it is dropped the client silently skips notifications.
    pub fn new(engine: Arc<dyn SessionEngine>, listener: Weak<dyn RoomListener>) -> RoomClient {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SharedState {
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
        });

        let actor = Actor {
            engine,
            listener: Some(listener),
            cmd_rx,
            shared: Arc::clone(&shared),
            state: ConnectionState::Disconnected,
            session: None,
            generation: 0,
        };

        RoomClient {
            cmd_tx,
            shared,
            actor: tokio::spawn(actor.run()),
        }
    }

    /// Start connecting to the given room.
    ///
    /// Requires the client to be `Disconnected`; an empty room id or a
    /// connect while a session is active is rejected via
    /// [`RoomListener::on_error`], never as a return value.
    pub fn connect(&self, room_id: impl Into<String>, options: SessionOptions) {
        self.send(Command::Connect {
            room_id: room_id.into(),
            options,
        });
    }

    /// Tear down the current session, if any.
    ///
    /// Safe in any state. When already `Disconnected` this is a no-op and
    /// emits nothing. A connect attempt still in flight is cancelled; no
    /// notifications for it are delivered afterwards.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Replace (or remove) the listener.
    pub fn set_listener(&self, listener: Option<Weak<dyn RoomListener>>) {
        self.send(Command::SetListener(listener));
    }

    /// Current lifecycle state, consistent with the most recently fired
    /// `on_state_changed` notification.
    pub fn current_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Shut the client down and wait for its task to finish.
    ///
    /// A live session is disconnected first (with the usual notifications),
    /// so no transport resources are left dangling.
    pub async fn close(self) {
        let RoomClient { cmd_tx, actor, .. } = self;
        drop(cmd_tx);
        let _ = actor.await;
    }

    fn send(&self, command: Command) {
        if self.cmd_tx.send(command).is_err() {
            debug!("room client task is gone; command dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct Actor {
    engine: Arc<dyn SessionEngine>,
    listener: Option<Weak<dyn RoomListener>>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    shared: Arc<SharedState>,
    state: ConnectionState,
    session: Option<Session>,
    generation: u64,
}

/// One connection attempt. Dropped (and its task aborted) on disconnect,
/// which structurally prevents stale completions from ever reaching the
/// listener: the actor only listens on the current session's channel.
struct Session {
    generation: u64,
    events: mpsc::Receiver<EngineEvent>,
    task: JoinHandle<()>,
    negotiated: bool,
    local_track_seen: bool,
    remote_track_seen: bool,
}

enum Step {
    Command(Option<Command>),
    Engine(Option<EngineEvent>),
}

impl Actor {
    async fn run(mut self) {
        loop {
            let step = match self.session.as_mut() {
                Some(session) => tokio::select! {
                    command = self.cmd_rx.recv() => Step::Command(command),
                    event = session.events.recv() => Step::Engine(event),
                },
                None => Step::Command(self.cmd_rx.recv().await),
            };

            match step {
                Step::Command(Some(command)) => self.handle_command(command),
                Step::Command(None) => {
                    // Every handle is gone. Force a disconnect sequence so
                    // the engine task cannot outlive the client.
                    self.teardown();
                    break;
                }
                Step::Engine(Some(event)) => self.handle_engine_event(event),
                Step::Engine(None) => self.session_ended(),
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { room_id, options } => self.handle_connect(room_id, options),
            Command::Disconnect => self.handle_disconnect(),
            Command::SetListener(listener) => self.listener = listener,
        }
    }

    fn handle_connect(&mut self, room_id: String, options: SessionOptions) {
        if room_id.is_empty() {
            self.notify_error(RoomError::EmptyRoomId);
            return;
        }
        if self.state != ConnectionState::Disconnected {
            self.notify_error(RoomError::AlreadyActive(self.state));
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        debug!(room = %room_id, generation, "starting connection attempt");

        self.set_state(ConnectionState::Connecting);

        let (event_tx, event_rx) = mpsc::channel(ENGINE_EVENT_CAPACITY);
        let engine = Arc::clone(&self.engine);
        let task = tokio::spawn(async move {
            if let Err(e) = engine.run(room_id, options, event_tx.clone()).await {
                // A closed channel means the attempt was already cancelled
                // and the failure has nowhere to go.
                let _ = event_tx.send(EngineEvent::Failed(e)).await;
            }
        });

        self.session = Some(Session {
            generation,
            events: event_rx,
            task,
            negotiated: false,
            local_track_seen: false,
            remote_track_seen: false,
        });
    }

    fn handle_disconnect(&mut self) {
        if self.session.is_none() && self.state == ConnectionState::Disconnected {
            // Idempotent: nothing to tear down, nothing re-announced.
            return;
        }
        self.teardown();
    }

    /// Abort any in-flight session and settle in `Disconnected`.
    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(generation = session.generation, "aborting session");
            session.task.abort();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Negotiated => {
                {
                    let Some(session) = self.session.as_mut() else {
                        return;
                    };
                    if session.negotiated {
                        warn!("duplicate negotiated report ignored");
                        return;
                    }
                    session.negotiated = true;
                }
                self.set_state(ConnectionState::Connected);
            }
            EngineEvent::Connectivity(state) => {
                // Connectivity is a Connected-phase signal only; reports
                // from the negotiation phase are not the listener's business.
                if self.state != ConnectionState::Connected {
                    debug!("dropping connectivity report {:?} while {:?}", state, self.state);
                    return;
                }
                self.with_listener(|l| l.on_connectivity_changed(state));
            }
            EngineEvent::LocalTrack(track) => {
                {
                    let Some(session) = self.session.as_mut() else {
                        return;
                    };
                    if !session.negotiated || session.local_track_seen {
                        warn!("dropping early or duplicate local track '{}'", track.id());
                        return;
                    }
                    session.local_track_seen = true;
                }
                self.with_listener(|l| l.on_local_track(track));
            }
            EngineEvent::RemoteTrack(track) => {
                {
                    let Some(session) = self.session.as_mut() else {
                        return;
                    };
                    if !session.negotiated || session.remote_track_seen {
                        warn!("dropping early or duplicate remote track '{}'", track.id());
                        return;
                    }
                    session.remote_track_seen = true;
                }
                self.with_listener(|l| l.on_remote_track(track));
            }
            EngineEvent::Failed(error) => {
                let negotiated = self.session.as_ref().map_or(false, |s| s.negotiated);
                let error = if negotiated {
                    RoomError::Session(error)
                } else {
                    RoomError::Negotiation(error)
                };
                self.notify_error(error);
                self.teardown();
            }
        }
    }

    /// The engine's event stream ended without an explicit failure.
    ///
    /// After `Connected` this is a clean remote close. Before it, the
    /// attempt never produced a session and is reported as a failure.
    fn session_ended(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        debug!(generation = session.generation, "engine event stream ended");

        if !session.negotiated {
            self.notify_error(RoomError::Negotiation(EngineError::Closed));
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Record a transition and announce it. The shared value is written
    /// first so `current_state()` never lags behind the notification the
    /// listener is currently observing.
    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        debug!("state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.shared.state.store(state.as_u8(), Ordering::Release);
        self.with_listener(|l| l.on_state_changed(state));
    }

    fn notify_error(&self, error: RoomError) {
        warn!("session error: {}", error);
        self.with_listener(|l| l.on_error(error));
    }

    fn with_listener(&self, notify: impl FnOnce(&dyn RoomListener)) {
        let Some(weak) = &self.listener else {
            return;
        };
        match weak.upgrade() {
            Some(listener) => notify(listener.as_ref()),
            None => debug!("listener dropped; notification skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::model::state::ConnectivityState;
    use crate::model::tracks::{TrackOrigin, VideoTrack};

    #[derive(Debug, Clone, PartialEq)]
    enum Note {
        State(ConnectionState),
        Connectivity(ConnectivityState),
        LocalTrack(String),
        RemoteTrack(String),
        Error(String),
    }

    #[derive(Default)]
    struct Recorder {
        notes: Mutex<Vec<Note>>,
    }

    impl Recorder {
        fn new() -> Arc<Recorder> {
            Arc::new(Recorder::default())
        }

        fn notes(&self) -> Vec<Note> {
            self.notes.lock().unwrap().clone()
        }

        fn push(&self, note: Note) {
            self.notes.lock().unwrap().push(note);
        }
    }

    impl RoomListener for Recorder {
        fn on_state_changed(&self, state: ConnectionState) {
            self.push(Note::State(state));
        }

        fn on_connectivity_changed(&self, state: ConnectivityState) {
            self.push(Note::Connectivity(state));
        }

        fn on_local_track(&self, track: Arc<VideoTrack>) {
            self.push(Note::LocalTrack(track.id().to_string()));
        }

        fn on_remote_track(&self, track: Arc<VideoTrack>) {
            self.push(Note::RemoteTrack(track.id().to_string()));
        }

        fn on_error(&self, error: RoomError) {
            self.push(Note::Error(error.to_string()));
        }
    }

    fn as_listener(recorder: &Arc<Recorder>) -> Weak<dyn RoomListener> {
        let weak: Weak<Recorder> = Arc::downgrade(recorder);
        weak
    }

    // -- Scripted engine ----------------------------------------------------

    enum Outcome {
        /// Keep the session open until cancelled.
        Hang,
        Finish(Result<(), EngineError>),
    }

    struct Run {
        delay: Duration,
        events: Vec<EngineEvent>,
        outcome: Outcome,
    }

    struct ScriptedEngine {
        runs: Mutex<VecDeque<Run>>,
    }

    impl ScriptedEngine {
        fn new(runs: Vec<Run>) -> Arc<ScriptedEngine> {
            Arc::new(ScriptedEngine {
                runs: Mutex::new(runs.into()),
            })
        }
    }

    #[async_trait]
    impl SessionEngine for ScriptedEngine {
        async fn run(
            &self,
            _room_id: String,
            _options: SessionOptions,
            events: mpsc::Sender<EngineEvent>,
        ) -> Result<(), EngineError> {
            let run = self
                .runs
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted connect attempt");

            if !run.delay.is_zero() {
                tokio::time::sleep(run.delay).await;
            }
            for event in run.events {
                if events.send(event).await.is_err() {
                    return Ok(());
                }
            }
            match run.outcome {
                Outcome::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Outcome::Finish(result) => result,
            }
        }
    }

    fn success_run(delay: Duration) -> Run {
        Run {
            delay,
            events: vec![
                EngineEvent::Negotiated,
                EngineEvent::LocalTrack(Arc::new(VideoTrack::new("m0", TrackOrigin::Local))),
                EngineEvent::RemoteTrack(Arc::new(VideoTrack::new("m1", TrackOrigin::Remote))),
                EngineEvent::Connectivity(ConnectivityState::Connected),
            ],
            outcome: Outcome::Hang,
        }
    }

    // -- Helpers ------------------------------------------------------------

    async fn wait_for_notes(recorder: &Recorder, count: usize) {
        for _ in 0..400 {
            if recorder.notes().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "timed out waiting for {} notifications, got {:?}",
            count,
            recorder.notes()
        );
    }

    async fn wait_for_state(client: &RoomClient, state: ConnectionState) {
        for _ in 0..400 {
            if client.current_state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {:?}", state);
    }

    /// Long enough for anything still queued to drain.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    // -- Tests --------------------------------------------------------------

    #[tokio::test]
    async fn success_path_notifies_in_order() {
        let recorder = Recorder::new();
        let engine = ScriptedEngine::new(vec![success_run(Duration::ZERO)]);
        let client = RoomClient::new(engine, as_listener(&recorder));

        client.connect("room42", SessionOptions::new().with("codec", "vp8"));
        wait_for_notes(&recorder, 5).await;

        assert_eq!(
            recorder.notes(),
            vec![
                Note::State(ConnectionState::Connecting),
                Note::State(ConnectionState::Connected),
                Note::LocalTrack("m0".into()),
                Note::RemoteTrack("m1".into()),
                Note::Connectivity(ConnectivityState::Connected),
            ]
        );
        assert_eq!(client.current_state(), ConnectionState::Connected);

        client.close().await;
    }

    #[tokio::test]
    async fn negotiation_failure_returns_to_disconnected() {
        let recorder = Recorder::new();
        let engine = ScriptedEngine::new(vec![Run {
            delay: Duration::ZERO,
            events: vec![],
            outcome: Outcome::Finish(Err(EngineError::Rendezvous("room full".into()))),
        }]);
        let client = RoomClient::new(engine, as_listener(&recorder));

        client.connect("bad-room", SessionOptions::new());
        wait_for_notes(&recorder, 3).await;

        assert_eq!(
            recorder.notes(),
            vec![
                Note::State(ConnectionState::Connecting),
                Note::Error("negotiation failed: rendezvous server error: room full".into()),
                Note::State(ConnectionState::Disconnected),
            ]
        );
        assert_eq!(client.current_state(), ConnectionState::Disconnected);

        client.close().await;
    }

    #[tokio::test]
    async fn disconnect_when_disconnected_is_silent() {
        let recorder = Recorder::new();
        let engine = ScriptedEngine::new(vec![]);
        let client = RoomClient::new(engine, as_listener(&recorder));

        client.disconnect();
        client.disconnect();
        // Commands are processed in order, so this marker proves both
        // disconnects went through without emitting anything.
        client.connect("", SessionOptions::new());
        wait_for_notes(&recorder, 1).await;

        assert_eq!(
            recorder.notes(),
            vec![Note::Error("room id must not be empty".into())]
        );

        client.close().await;
    }

    #[tokio::test]
    async fn empty_room_id_is_rejected_without_transitions() {
        let recorder = Recorder::new();
        let engine = ScriptedEngine::new(vec![]);
        let client = RoomClient::new(engine, as_listener(&recorder));

        client.connect("", SessionOptions::new());
        wait_for_notes(&recorder, 1).await;
        settle().await;

        assert_eq!(
            recorder.notes(),
            vec![Note::Error("room id must not be empty".into())]
        );
        assert_eq!(client.current_state(), ConnectionState::Disconnected);

        client.close().await;
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_negotiation() {
        let recorder = Recorder::new();
        let engine = ScriptedEngine::new(vec![success_run(Duration::from_millis(20))]);
        let client = RoomClient::new(engine, as_listener(&recorder));

        client.connect("room1", SessionOptions::new());
        client.disconnect();
        wait_for_notes(&recorder, 2).await;
        settle().await;

        // Cancellation wins: the delayed negotiation success must never
        // surface for the abandoned attempt.
        assert_eq!(
            recorder.notes(),
            vec![
                Note::State(ConnectionState::Connecting),
                Note::State(ConnectionState::Disconnected),
            ]
        );
        assert_eq!(client.current_state(), ConnectionState::Disconnected);

        client.close().await;
    }

    #[tokio::test]
    async fn connect_while_active_is_rejected() {
        let recorder = Recorder::new();
        let engine = ScriptedEngine::new(vec![Run {
            delay: Duration::ZERO,
            events: vec![],
            outcome: Outcome::Hang,
        }]);
        let client = RoomClient::new(engine, as_listener(&recorder));

        client.connect("room1", SessionOptions::new());
        wait_for_notes(&recorder, 1).await;
        client.connect("room2", SessionOptions::new());
        wait_for_notes(&recorder, 2).await;

        assert_eq!(
            recorder.notes(),
            vec![
                Note::State(ConnectionState::Connecting),
                Note::Error("connect rejected: client is already Connecting".into()),
            ]
        );
        // The original attempt is untouched.
        assert_eq!(client.current_state(), ConnectionState::Connecting);

        client.close().await;
    }

    #[tokio::test]
    async fn dropped_listener_is_tolerated() {
        let recorder = Recorder::new();
        let engine = ScriptedEngine::new(vec![success_run(Duration::from_millis(20))]);
        let client = RoomClient::new(engine, as_listener(&recorder));

        client.connect("room1", SessionOptions::new());
        wait_for_notes(&recorder, 1).await;
        drop(recorder);

        // The session keeps progressing with nobody listening.
        wait_for_state(&client, ConnectionState::Connected).await;

        client.close().await;
    }

    #[tokio::test]
    async fn duplicate_and_early_events_are_filtered() {
        let recorder = Recorder::new();
        let engine = ScriptedEngine::new(vec![Run {
            delay: Duration::ZERO,
            events: vec![
                // Connectivity before the session is established is not
                // forwarded; neither is a repeated track handle.
                EngineEvent::Connectivity(ConnectivityState::Checking),
                EngineEvent::Negotiated,
                EngineEvent::LocalTrack(Arc::new(VideoTrack::new("m0", TrackOrigin::Local))),
                EngineEvent::LocalTrack(Arc::new(VideoTrack::new("m0", TrackOrigin::Local))),
                EngineEvent::RemoteTrack(Arc::new(VideoTrack::new("m1", TrackOrigin::Remote))),
            ],
            outcome: Outcome::Hang,
        }]);
        let client = RoomClient::new(engine, as_listener(&recorder));

        client.connect("room1", SessionOptions::new());
        wait_for_notes(&recorder, 4).await;
        settle().await;

        assert_eq!(
            recorder.notes(),
            vec![
                Note::State(ConnectionState::Connecting),
                Note::State(ConnectionState::Connected),
                Note::LocalTrack("m0".into()),
                Note::RemoteTrack("m1".into()),
            ]
        );

        client.close().await;
    }

    #[tokio::test]
    async fn client_is_reusable_after_failure() {
        let recorder = Recorder::new();
        let engine = ScriptedEngine::new(vec![
            Run {
                delay: Duration::ZERO,
                events: vec![],
                outcome: Outcome::Finish(Err(EngineError::NoCandidates)),
            },
            success_run(Duration::ZERO),
        ]);
        let client = RoomClient::new(engine, as_listener(&recorder));

        client.connect("room1", SessionOptions::new());
        wait_for_notes(&recorder, 3).await;
        assert_eq!(client.current_state(), ConnectionState::Disconnected);

        client.connect("room1", SessionOptions::new());
        wait_for_state(&client, ConnectionState::Connected).await;

        let notes = recorder.notes();
        assert_eq!(notes[3], Note::State(ConnectionState::Connecting));
        assert_eq!(notes[4], Note::State(ConnectionState::Connected));

        client.close().await;
    }

    #[tokio::test]
    async fn clean_engine_end_after_connect_disconnects_without_error() {
        let recorder = Recorder::new();
        let engine = ScriptedEngine::new(vec![Run {
            delay: Duration::ZERO,
            events: vec![EngineEvent::Negotiated],
            outcome: Outcome::Finish(Ok(())),
        }]);
        let client = RoomClient::new(engine, as_listener(&recorder));

        client.connect("room1", SessionOptions::new());
        wait_for_notes(&recorder, 3).await;

        assert_eq!(
            recorder.notes(),
            vec![
                Note::State(ConnectionState::Connecting),
                Note::State(ConnectionState::Connected),
                Note::State(ConnectionState::Disconnected),
            ]
        );
        assert_eq!(client.current_state(), ConnectionState::Disconnected);

        client.close().await;
    }

    #[tokio::test]
    async fn listener_can_be_replaced_mid_session() {
        let first = Recorder::new();
        let second = Recorder::new();
        let engine = ScriptedEngine::new(vec![success_run(Duration::from_millis(20))]);
        let client = RoomClient::new(engine, as_listener(&first));

        client.connect("room1", SessionOptions::new());
        wait_for_notes(&first, 1).await;
        client.set_listener(Some(as_listener(&second)));

        wait_for_notes(&second, 4).await;
        assert_eq!(first.notes(), vec![Note::State(ConnectionState::Connecting)]);
        assert_eq!(second.notes()[0], Note::State(ConnectionState::Connected));

        client.close().await;
    }
}
