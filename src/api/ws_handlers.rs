//! WebSocket handler for project collaboration documents
//!
//! `GET /ws/projects/{id}` upgrades to a socket that receives the project's
//! shared document as a snapshot, then incremental updates. Access requires
//! either the owner's session cookie or a collaboration grant passed as
//! `?token=`. Both are checked before the upgrade.

use super::handlers::{AppError, AppState};
use crate::auth::collab_token::decode_collab_token;
use crate::auth::middleware::session_user;
use crate::collab::{ClientMessage, ServerMessage};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    /// Collaboration grant from `POST /api/projects/{id}/collab-token`
    pub token: Option<String>,
}

/// User allowed to join `project_id`'s document
async fn authorize_socket(
    state: &AppState,
    project_id: i64,
    headers: &HeaderMap,
    token: Option<&str>,
) -> Result<i64, AppError> {
    let project = state
        .store
        .get_project(project_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))?;

    if let Some(user) = session_user(state.store.as_ref(), headers).await? {
        if user.id == project.owner_id {
            return Ok(user.id);
        }
        return Err(AppError::Forbidden("Not the owner of this project".to_string()));
    }

    let Some(token) = token else {
        return Err(AppError::Unauthorized(
            "Missing session or collaboration grant".to_string(),
        ));
    };
    let claims = decode_collab_token(token, &state.auth.collab_secret)
        .map_err(|_| AppError::Unauthorized("Invalid collaboration grant".to_string()))?;
    // Grants are re-checked against current ownership
    if claims.project_id != project_id || claims.sub != project.owner_id {
        return Err(AppError::Forbidden(
            "Grant does not cover this project".to_string(),
        ));
    }
    Ok(claims.sub)
}

/// WebSocket upgrade handler for `/ws/projects/{id}`
pub async fn ws_project(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let user_id = match authorize_socket(&state, project_id, &headers, query.token.as_deref()).await
    {
        Ok(user_id) => user_id,
        Err(e) => {
            debug!(project_id, "Collaboration socket rejected");
            return e.into_response();
        }
    };
    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, project_id, user_id))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to serialize collaboration message: {}", e);
            None
        }
    }
}

async fn snapshot_message(state: &AppState, project_id: i64) -> Option<Message> {
    match state.hub.snapshot(project_id).await {
        Ok(snapshot) => encode(&ServerMessage::Snapshot(snapshot)),
        Err(e) => {
            warn!(project_id, error = %e, "Failed to load shared document");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, project_id: i64, user_id: i64) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let registry = state.hub.registry().clone();
    let (connection_id, mut outbox) = registry.register(project_id, user_id);

    let Some(initial) = snapshot_message(&state, project_id).await else {
        registry.unregister(&connection_id);
        state.hub.release(project_id);
        return;
    };

    let mut ping_interval = interval(Duration::from_secs(30));
    ping_interval.tick().await;

    if ws_sender.send(initial).await.is_ok() {
        loop {
            tokio::select! {
                outgoing = outbox.recv() => {
                    let Some(message) = outgoing else {
                        // Registry dropped us: project deleted or access revoked
                        let _ = ws_sender
                            .send(Message::Close(Some(CloseFrame {
                                code: axum::extract::ws::close_code::NORMAL,
                                reason: "closed by server".into(),
                            })))
                            .await;
                        break;
                    };
                    let Some(frame) = encode(&message) else { continue };
                    if ws_sender.send(frame).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }

                _ = ping_interval.tick() => {
                    if ws_sender.send(Message::Ping(vec![].into())).await.is_err() {
                        debug!("Ping failed, client disconnected");
                        break;
                    }
                }

                incoming = ws_receiver.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ClientMessage>(&text) {
                                Ok(ClientMessage::Sync) => {
                                    let Some(frame) = snapshot_message(&state, project_id).await else {
                                        continue;
                                    };
                                    if ws_sender.send(frame).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(ClientMessage::Ping) => {}
                                Err(e) => debug!("Ignoring malformed client message: {}", e),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("WebSocket client disconnected");
                            break;
                        }
                        Some(Err(e)) => {
                            debug!("WebSocket error: {}", e);
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    registry.unregister(&connection_id);
    state.hub.release(project_id);
    debug!(project_id, user_id, "Collaboration socket closed");
}
