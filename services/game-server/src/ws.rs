//! HTTP surface: the `/ws` game socket plus probes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use fishhunt_execution::{InventoryRepository, Wallet};
use fishhunt_types::{ClientMessage, GameError, PlayerId, ServerMessage, WalletId};
use futures_util::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use serde::Deserialize;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::TransportConfig;
use crate::hub::{error_response, ConnectionId, Hub, HubStatsSnapshot, Identity};

/// Pongs queued by the reader ahead of the writer.
const CONTROL_BUFFER: usize = 8;

/// Bounds the number of open sockets.
#[derive(Clone)]
pub struct ConnectionLimiter {
    active: Arc<AtomicUsize>,
    max: usize,
}

pub struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            max,
        }
    }

    pub fn try_acquire(&self) -> Result<ConnectionGuard, GameError> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < self.max).then_some(active + 1)
            })
            .map(|_| ConnectionGuard {
                active: self.active.clone(),
            })
            .map_err(|_| GameError::ConnectionLimit(self.max))
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

pub struct AppState<W: Wallet, R: InventoryRepository> {
    pub hub: Hub<W, R>,
    pub transport: TransportConfig,
    pub limiter: ConnectionLimiter,
}

impl<W: Wallet, R: InventoryRepository> Clone for AppState<W, R> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            transport: self.transport.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

impl<W: Wallet, R: InventoryRepository> AppState<W, R> {
    pub fn new(hub: Hub<W, R>, transport: TransportConfig) -> Self {
        let limiter = ConnectionLimiter::new(transport.max_connections);
        Self {
            hub,
            transport,
            limiter,
        }
    }
}

pub fn router<W: Wallet, R: InventoryRepository>(state: AppState<W, R>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::<W, R>))
        .route("/healthz", get(healthz))
        .route("/stats", get(stats::<W, R>))
        .with_state(state)
}

/// Identity supplied on the upgrade request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub player_id: Option<PlayerId>,
    pub wallet_id: Option<WalletId>,
    pub name: Option<String>,
}

impl ConnectParams {
    pub fn identity(self) -> Option<Identity> {
        let player_id = self.player_id?;
        Some(Identity {
            player_id,
            wallet_id: self.wallet_id.unwrap_or(player_id),
            name: self
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| format!("player-{player_id}")),
        })
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn stats<W: Wallet, R: InventoryRepository>(
    State(state): State<AppState<W, R>>,
) -> Json<HubStatsSnapshot> {
    Json(state.hub.stats())
}

async fn ws_handler<W: Wallet, R: InventoryRepository>(
    State(state): State<AppState<W, R>>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(identity) = params.identity() else {
        return (StatusCode::BAD_REQUEST, "playerId is required").into_response();
    };
    let guard = match state.limiter.try_acquire() {
        Ok(guard) => guard,
        Err(err) => {
            warn!(player_id = identity.player_id, %err, "websocket upgrade rejected");
            return (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response();
        }
    };
    let max_message_size = state.transport.max_message_size;
    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, identity, guard))
}

/// Best-effort `requestId` of a frame that failed to parse.
fn request_id_of(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value.get("requestId")?.as_str().map(str::to_string)
}

async fn handle_socket<W: Wallet, R: InventoryRepository>(
    socket: WebSocket,
    state: AppState<W, R>,
    identity: Identity,
    _guard: ConnectionGuard,
) {
    let (mut sink, mut stream) = socket.split();
    let transport = state.transport.clone();
    let (outbound, frames) = mpsc::channel(transport.outbound_buffer);
    let player_id = identity.player_id;
    let connection_id = match state.hub.register(identity, outbound).await {
        Ok(connection_id) => connection_id,
        Err(err) => {
            if let Ok(text) = serde_json::to_string(&error_response(None, &err)) {
                let _ = timeout(transport.write_timeout, sink.send(Message::Text(text))).await;
            }
            let _ = sink.close().await;
            return;
        }
    };
    info!(connection_id, player_id, "websocket connected");

    let (control, control_frames) = mpsc::channel(CONTROL_BUFFER);
    let mut writer = tokio::spawn(write_frames(
        sink,
        frames,
        control_frames,
        transport.clone(),
        connection_id,
    ));
    let mut writer_done = false;
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => {
                        debug!(connection_id, kind = message.kind(), "message received");
                        state.hub.dispatch(connection_id, message);
                    }
                    Err(err) => {
                        let err = GameError::Malformed(err.to_string());
                        state.hub.send_to(connection_id, error_response(request_id_of(&text), &err));
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    if control.try_send(Message::Pong(data)).is_err() {
                        warn!(connection_id, "pong backlog full; closing connection");
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(connection_id, ?err, "websocket read failed");
                    break;
                }
            },
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    state.hub.unregister(connection_id).await;
    drop(control);
    if !writer_done && timeout(transport.write_timeout, writer).await.is_err() {
        debug!(connection_id, "writer did not finish in time");
    }
    info!(connection_id, player_id, "websocket closed");
}

/// Serialize hub frames onto the socket and keep it alive with pings.
///
/// Exits when the hub drops the connection's sender, on a write error, or when a write takes
/// longer than `write_timeout`.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<ServerMessage>,
    mut control: mpsc::Receiver<Message>,
    transport: TransportConfig,
    connection_id: ConnectionId,
) {
    let mut ping = tokio::time::interval(transport.ping_interval.max(Duration::from_secs(1)));
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ping.tick().await;
    loop {
        let message = tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => match serde_json::to_string(&frame) {
                    Ok(text) => Message::Text(text),
                    Err(err) => {
                        error!(connection_id, %err, "failed to encode frame");
                        continue;
                    }
                },
                None => break,
            },
            Some(frame) = control.recv() => frame,
            _ = ping.tick() => Message::Ping(Vec::new()),
        };
        match timeout(transport.write_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(connection_id, ?err, "websocket write failed");
                break;
            }
            Err(_) => {
                warn!(connection_id, "websocket write timed out; closing connection");
                break;
            }
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_caps_and_releases() {
        let limiter = ConnectionLimiter::new(2);
        let first = limiter.try_acquire().unwrap();
        let _second = limiter.try_acquire().unwrap();
        assert!(matches!(
            limiter.try_acquire(),
            Err(GameError::ConnectionLimit(2))
        ));
        drop(first);
        assert_eq!(limiter.active(), 1);
        assert!(limiter.try_acquire().is_ok());
    }

    #[test]
    fn test_connect_params_defaults() {
        let params = ConnectParams {
            player_id: Some(7),
            wallet_id: None,
            name: Some(" ".into()),
        };
        assert_eq!(
            params.identity(),
            Some(Identity {
                player_id: 7,
                wallet_id: 7,
                name: "player-7".into(),
            })
        );
        let anonymous = ConnectParams {
            player_id: None,
            wallet_id: Some(1),
            name: None,
        };
        assert_eq!(anonymous.identity(), None);
    }

    #[test]
    fn test_request_id_recovered_from_bad_frame() {
        assert_eq!(
            request_id_of(r#"{"type":"fire_bullet","requestId":"r7","power":"lots"}"#),
            Some("r7".to_string())
        );
        assert_eq!(request_id_of("not json"), None);
    }

    #[tokio::test]
    async fn test_health_and_stats_endpoints() {
        use fishhunt_execution::mocks::Harness;
        use fishhunt_execution::MemoryWallet;
        use fishhunt_types::TierCatalog;

        let hub = Hub::start(
            Harness::new(MemoryWallet::new(1_000)).engine,
            crate::hub::Config {
                message_queue_size: 8,
                broadcast_buffer: 8,
                max_rooms: 4,
                bootstrap_rooms_per_tier: 1,
                room_mailbox_size: 8,
                tick_interval: Duration::from_millis(100),
                snapshot_interval: Duration::from_secs(1),
                room_idle_timeout: Duration::from_secs(60),
                min_join_balance: 100,
                stats_interval: Duration::from_secs(30),
                catalog: TierCatalog::default(),
            },
        );
        let state = AppState::new(
            hub,
            TransportConfig {
                max_connections: 1,
                outbound_buffer: 8,
                max_message_size: 512,
                ping_interval: Duration::from_secs(54),
                write_timeout: Duration::from_secs(10),
            },
        );
        assert_eq!(healthz().await, "ok");
        let Json(snapshot) = stats(State(state)).await;
        assert_eq!(snapshot.active_connections, 0);
        assert_eq!(snapshot.active_rooms, 0);
    }
}
