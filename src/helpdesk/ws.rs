//! `/ws`: live ticket event stream.
//!
//! Every published `HelpdeskEvent` is forwarded as a text frame. A client
//! that falls behind the broadcast buffer gets a `Resync` notice instead of
//! the dropped events so it can reload its grid.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::debug;

use super::api::AppState;

const PING_EVERY: Duration = Duration::from_secs(30);
const PONG_DEADLINE: Duration = Duration::from_secs(60);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let events = state.events.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, events))
}

/// Tracks whether the peer still answers pings.
struct Liveness {
    last_pong: Instant,
    pinged: bool,
}

impl Liveness {
    fn new() -> Self {
        Self {
            last_pong: Instant::now(),
            pinged: false,
        }
    }

    fn expired_at(&self, now: Instant) -> bool {
        self.pinged && now.duration_since(self.last_pong) > PONG_DEADLINE
    }

    fn ping_sent(&mut self) {
        self.pinged = true;
    }

    fn pong(&mut self) {
        self.last_pong = Instant::now();
        self.pinged = false;
    }
}

fn resync_notice(skipped: u64) -> String {
    serde_json::json!({"type": "Resync", "data": {"skipped": skipped}}).to_string()
}

async fn stream_events(socket: WebSocket, mut events: broadcast::Receiver<String>) {
    let (mut tx, mut rx) = socket.split();
    let mut ticker = tokio::time::interval_at(Instant::now() + PING_EVERY, PING_EVERY);
    let mut liveness = Liveness::new();
    debug!("event subscriber connected");

    loop {
        let outgoing = tokio::select! {
            _ = ticker.tick() => {
                if liveness.expired_at(Instant::now()) {
                    debug!("event subscriber missed pong deadline");
                    break;
                }
                liveness.ping_sent();
                Message::Ping(Default::default())
            }
            event = events.recv() => match event {
                Ok(json) => Message::Text(json.into()),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event subscriber lagged");
                    Message::Text(resync_notice(skipped).into())
                }
                Err(RecvError::Closed) => break,
            },
            incoming = rx.next() => match incoming {
                Some(Ok(Message::Pong(_))) => {
                    liveness.pong();
                    continue;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };
        if tx.send(outgoing).await.is_err() {
            break;
        }
    }

    let _ = tx.send(Message::Close(None)).await;
    debug!("event subscriber disconnected");
}
