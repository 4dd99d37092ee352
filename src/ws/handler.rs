//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{close_code, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{ConnectionId, Outbound, RoomError, RoomHandle};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Room joined when the client does not name one
pub const DEFAULT_ROOM: &str = "arena";

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Room to join
    #[serde(default)]
    pub room: Option<String>,
    /// Player to resume, when reconnecting
    #[serde(default, rename = "playerId")]
    pub player_id: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, query: WsQuery, state: AppState) {
    let connection_id = Uuid::new_v4();
    let room_id = query.room.unwrap_or_else(|| DEFAULT_ROOM.to_string());
    info!(connection_id = %connection_id, room_id = %room_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let joined = join_room(&state, &room_id, connection_id, query.player_id).await;
    let (room, outbound_rx) = match joined {
        Ok(joined) => joined,
        Err(e) => {
            warn!(
                connection_id = %connection_id,
                room_id = %room_id,
                error = %e,
                "Failed to join room"
            );
            let _ = send_msg(
                &mut ws_sink,
                &ServerMsg::Error {
                    code: "join_failed".to_string(),
                    message: e.to_string(),
                },
            )
            .await;
            let _ = ws_sink.close().await;
            return;
        }
    };

    info!(connection_id = %connection_id, room_id = %room.id, "Joined room");

    let consented = run_session(connection_id, &room, ws_sink, ws_stream, outbound_rx).await;

    room.disconnect(connection_id, consented).await;

    info!(connection_id = %connection_id, consented, "WebSocket connection closed");
}

/// Join, retrying once if the room closed between lookup and join
async fn join_room(
    state: &AppState,
    room_id: &str,
    connection_id: ConnectionId,
    player_id: Option<String>,
) -> Result<(RoomHandle, broadcast::Receiver<Outbound>), RoomError> {
    let room = state.rooms.get_or_create(room_id);
    match room.connect(connection_id, player_id.clone()).await {
        Err(RoomError::Closed) => {
            let room = state.rooms.get_or_create(room_id);
            let rx = room.connect(connection_id, player_id).await?;
            Ok((room, rx))
        }
        result => result.map(|rx| (room, rx)),
    }
}

/// Run the WebSocket session with read/write split.
///
/// Returns whether the client left on purpose (normal close frame).
async fn run_session(
    connection_id: ConnectionId,
    room: &RoomHandle,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: broadcast::Receiver<Outbound>,
) -> bool {
    let rate_limiter = ConnectionRateLimiter::new();

    // Spawn writer task: room broadcasts -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            match outbound_rx.recv().await {
                Ok(outbound) => {
                    if !outbound.is_for(connection_id) {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut ws_sink, &outbound.msg).await {
                        debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        connection_id = %connection_id,
                        lagged_count = n,
                        "Client lagged, skipping {} messages", n
                    );
                    // Continue - don't disconnect for lag
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(connection_id = %connection_id, "Room channel closed");
                    break;
                }
            }
        }
    });

    let mut consented = false;

    // Reader loop: WebSocket -> room
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(connection_id = %connection_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if room.send_input(connection_id, msg).await.is_err() {
                            debug!(connection_id = %connection_id, "Room closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            connection_id = %connection_id,
                            error = %e,
                            "Failed to parse client message"
                        );
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(frame)) => {
                consented = frame.is_some_and(|f| f.code == close_code::NORMAL);
                info!(connection_id = %connection_id, consented, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();

    consented
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
