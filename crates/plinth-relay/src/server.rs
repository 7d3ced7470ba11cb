//! WebSocket endpoint, connection lifecycle, and heartbeat.

use crate::error::RelayError;
use crate::protocol::{events, room_field, ClientInfo, Envelope, RoomField};
use crate::rooms::{Outbound, Registry};
use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Relay tuning knobs. The defaults suit an interactive dev session.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind. Port 0 lets the OS pick one.
    pub addr: SocketAddr,
    /// How long frames addressed to an empty room are kept for a late joiner.
    pub queue_ttl: Duration,
    /// Interval between heartbeat rounds.
    pub heartbeat: Duration,
    /// How long a connection may take to present its room before it is
    /// rejected.
    pub handshake_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 4401)),
            queue_ttl: Duration::from_secs(10),
            heartbeat: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
struct RelayState {
    registry: Arc<Registry>,
    handshake_timeout: Duration,
}

/// A configured relay, ready to start.
pub struct RelayServer {
    config: RelayConfig,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Binds the listener and spawns the accept loop and the heartbeat task.
    pub async fn start(self) -> Result<RelayHandle, RelayError> {
        let registry = Arc::new(Registry::new(self.config.queue_ttl));

        let listener = tokio::net::TcpListener::bind(self.config.addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: self.config.addr,
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| RelayError::Bind {
            addr: self.config.addr,
            source,
        })?;

        let state = RelayState {
            registry: Arc::clone(&registry),
            handshake_timeout: self.config.handshake_timeout,
        };
        let app = Router::new()
            .route("/", get(upgrade))
            .route("/ws", get(upgrade))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(error) = serve.await {
                error!(%error, "relay server failed");
            }
        });

        let sweeper = {
            let registry = Arc::clone(&registry);
            let period = self.config.heartbeat;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                // The first tick completes immediately.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let dead = registry.sweep();
                    if dead > 0 {
                        debug!(dead, "heartbeat gave up on unresponsive clients");
                    }
                }
            })
        };

        info!(%addr, "relay listening");
        Ok(RelayHandle {
            addr,
            registry,
            shutdown: Some(shutdown_tx),
            server,
            sweeper,
        })
    }
}

/// A running relay. Dropping the handle leaves the relay running; call
/// [`RelayHandle::close`] to tear it down.
pub struct RelayHandle {
    addr: SocketAddr,
    registry: Arc<Registry>,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl std::fmt::Debug for RelayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHandle")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl RelayHandle {
    /// Address the relay is actually bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// WebSocket URL clients should connect to.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Live view of connections and rooms, mainly for status output.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Disconnects every client and shuts the listener down.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.sweeper.abort();
        self.registry.close_all();
        if let Err(error) = self.server.await {
            if !error.is_cancelled() {
                debug!(%error, "relay server task ended abnormally");
            }
        }
        info!("relay stopped");
    }
}

#[derive(Debug, Deserialize)]
struct HandshakeQuery {
    room: Option<String>,
    source: Option<String>,
}

async fn upgrade(
    State(state): State<RelayState>,
    Query(query): Query<HandshakeQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(mut socket: WebSocket, state: RelayState, query: HandshakeQuery) {
    let source = query
        .source
        .filter(|source| !source.is_empty())
        .unwrap_or_else(|| String::from("unknown"));

    // A connection must present its room up front, either as a query
    // parameter or as a first join frame.
    let room = match query.room.filter(|room| !room.is_empty()) {
        Some(room) => room,
        None => match await_join(&mut socket, state.handshake_timeout).await {
            Some(room) => room,
            None => {
                reject(socket, "a room is required to connect").await;
                return;
            }
        },
    };

    let (info, mut outbound) = state.registry.connect(&source);
    info!(client = %info.id, source = %info.source, room = %room, "relay client connected");
    state.registry.join(&info.id, &room);
    state.registry.announce_connected(&info.id);
    state.registry.announce_stats();

    loop {
        tokio::select! {
            pushed = outbound.recv() => match pushed {
                Some(Outbound::Frame(frame)) => {
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Ping) => {
                    if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Terminate) | None => {
                    debug!(client = %info.id, "closing connection on request");
                    break;
                }
            },
            received = socket.recv() => match received {
                Some(Ok(Message::Text(text))) => handle_frame(&state, &info, text.as_str()),
                Some(Ok(Message::Pong(_))) => state.registry.mark_alive(&info.id),
                // Pings are answered by the socket layer itself.
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Binary(_))) => {
                    debug!(client = %info.id, "ignoring binary frame");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(error)) => {
                    debug!(client = %info.id, %error, "socket error");
                    break;
                }
            },
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    if let Some(info) = state.registry.disconnect(&info.id) {
        state.registry.announce_disconnected(&info);
        state.registry.announce_stats();
        info!(client = %info.id, "relay client disconnected");
    }
}

/// Waits for the opening `join` frame on a connection that did not pass a
/// room in the query string.
async fn await_join(socket: &mut WebSocket, window: Duration) -> Option<String> {
    let first = tokio::time::timeout(window, async {
        loop {
            match socket.recv().await {
                Some(Ok(Message::Text(text))) => {
                    let envelope: Envelope = serde_json::from_str(text.as_str()).ok()?;
                    if envelope.event != events::JOIN {
                        return None;
                    }
                    return envelope.join_room().map(str::to_owned);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(_)) | Some(Err(_)) | None => return None,
            }
        }
    });
    first.await.ok().flatten()
}

/// Sends an error report and a policy close, then drops the socket.
async fn reject(mut socket: WebSocket, reason: &str) {
    warn!(reason, "rejecting relay connection");
    let _ = socket
        .send(Message::Text(Envelope::error(reason).to_frame().into()))
        .await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: Utf8Bytes::from(reason.to_owned()),
        })))
        .await;
}

/// Routes one inbound text frame.
///
/// `join` frames extend the sender's membership. Everything else is relayed:
/// room-addressed payloads go through the registry and get stamped with
/// their target room and sender, roomless payloads broadcast unchanged.
fn handle_frame(state: &RelayState, info: &ClientInfo, raw: &str) {
    let envelope: Envelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(client = %info.id, %error, "dropping malformed frame");
            return;
        }
    };

    if envelope.event == events::JOIN {
        match envelope.join_room() {
            Some(room) => {
                state.registry.join(&info.id, room);
                state.registry.announce_stats();
                info!(client = %info.id, room, "joined room");
            }
            None => warn!(client = %info.id, "dropping join frame without a room"),
        }
        return;
    }

    let data = match envelope.data.as_ref().filter(|data| !data.is_null()) {
        Some(data) => data,
        None => {
            debug!(client = %info.id, event = %envelope.event, "frame carries no payload, nothing to relay");
            return;
        }
    };

    match room_field(data) {
        Some(RoomField::Rooms(rooms)) => {
            state.registry.emit(&info.id, &envelope.event, data, &rooms)
        }
        Some(RoomField::Absent) => state.registry.broadcast(raw),
        None => {
            warn!(client = %info.id, event = %envelope.event, "invalid room field, dropping frame")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_binds_an_ephemeral_port() {
        let config = RelayConfig {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..RelayConfig::default()
        };
        let handle = RelayServer::new(config).start().await.unwrap();
        assert_ne!(handle.addr().port(), 0);
        assert!(handle.url().starts_with("ws://127.0.0.1:"));
        assert_eq!(handle.registry().client_count(), 0);
        handle.close().await;
    }

    #[tokio::test]
    async fn bind_failure_reports_the_address() {
        let first = RelayServer::new(RelayConfig {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..RelayConfig::default()
        })
        .start()
        .await
        .unwrap();

        let taken = first.addr();
        let error = RelayServer::new(RelayConfig {
            addr: taken,
            ..RelayConfig::default()
        })
        .start()
        .await
        .unwrap_err();
        assert!(error.to_string().contains(&taken.to_string()));

        first.close().await;
    }
}
