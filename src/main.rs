use std::env;
use std::sync::{Arc, Weak};

use anyhow::Result;
use tracing::{info, warn, Level};

use roomlink::{
    ConnectionState, ConnectivityState, RoomClient, RoomError, RoomListener, SessionOptions,
    VideoTrack, WebRtcEngine,
};

/// Logs every notification the client fires.
struct LogListener;

impl RoomListener for LogListener {
    fn on_state_changed(&self, state: ConnectionState) {
        info!("state changed: {:?}", state);
    }

    fn on_connectivity_changed(&self, state: ConnectivityState) {
        info!("connectivity: {:?}", state);
    }

    fn on_local_track(&self, track: Arc<VideoTrack>) {
        info!("local track ready: {}", track.id());
    }

    fn on_remote_track(&self, track: Arc<VideoTrack>) {
        info!("remote track received: {}", track.id());
    }

    fn on_error(&self, error: RoomError) {
        warn!("error: {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let mut args = env::args().skip(1);
    let Some(room_id) = args.next() else {
        print_usage();
        return Ok(());
    };
    let server_url = args
        .next()
        .unwrap_or_else(|| "http://127.0.0.1:3000".to_string());

    let engine = Arc::new(WebRtcEngine::new(server_url));
    let listener: Arc<dyn RoomListener> = Arc::new(LogListener);
    let weak: Weak<dyn RoomListener> = Arc::downgrade(&listener);

    let client = RoomClient::new(engine, weak);
    client.connect(room_id, SessionOptions::new());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    client.close().await;

    Ok(())
}

fn print_usage() {
    println!("roomlink");
    println!("Usage:");
    println!("  cargo run <room-id> [server-url]  - Join a room (default server http://127.0.0.1:3000)");
}
