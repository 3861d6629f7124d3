use crate::ServerState;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::extract::ws::{Message, WebSocket};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use meshcall_core::{ClientMessage, Participant, ParticipantId, ServerMessage};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let handle = ParticipantId::new();
    info!("New WebSocket connection: {}", handle);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.signaling.add_peer(handle, tx);
    state
        .signaling
        .send_signal(handle, &ServerMessage::Welcome { handle });
    state.signaling.send_signal(
        handle,
        &ServerMessage::IceConfig {
            ice_servers: state.signaling.get_ice_servers(),
        },
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let state = state.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(signal) => dispatch(&state, handle, signal).await,
                        Err(e) => warn!("Invalid ClientMessage from {}: {}", handle, e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    state.registry.leave(handle).await;
    state.signaling.remove_peer(&handle);
    info!("WebSocket disconnected: {}", handle);
}

/// Applies one client frame on behalf of `handle`. Frames from a single
/// connection are dispatched in arrival order.
pub async fn dispatch(state: &ServerState, handle: ParticipantId, msg: ClientMessage) {
    match msg {
        ClientMessage::JoinRoom { room, name } => {
            info!("Peer {} wants to join room '{}'", handle, room);
            let participant = Participant::new(handle, name);
            if let Err(e) = state.registry.join(&room, participant).await {
                warn!("Join of {} to '{}' rejected: {}", handle, room, e);
                state.signaling.send_signal(
                    handle,
                    &ServerMessage::Error {
                        reason: e.to_string(),
                    },
                );
            }
        }

        ClientMessage::Offer { target, sdp } => {
            let out = ServerMessage::Offer {
                sdp,
                sender: handle,
            };
            state.registry.relay(handle, target, out).await;
        }

        ClientMessage::Answer { target, sdp } => {
            let out = ServerMessage::Answer {
                sdp,
                sender: handle,
            };
            state.registry.relay(handle, target, out).await;
        }

        ClientMessage::IceCandidate { target, candidate } => {
            let out = ServerMessage::IceCandidate {
                candidate,
                sender: handle,
            };
            state.registry.relay(handle, target, out).await;
        }

        ClientMessage::ChatMessage { room, text } => {
            if let Err(e) = state.registry.chat(handle, &room, text).await {
                warn!("Chat from {} ignored: {}", handle, e);
            }
        }

        ClientMessage::UpdateName { name } => {
            if let Err(e) = state.registry.rename(handle, name).await {
                warn!("Rename from {} ignored: {}", handle, e);
            }
        }

        ClientMessage::Leave => state.registry.leave(handle).await,
    }
}
