//! Realtime websocket handshake
//!
//! `GET /ws?token=<bearer>` upgrades to a websocket. On a valid token the
//! socket joins `org:<tenant>` and `user:<id>`; it may then subscribe to
//! conversation rooms inside its tenant. Events flow out as JSON text
//! frames; the client sends subscribe/unsubscribe/typing/ping frames in.

use crate::middleware::validate_bearer;
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;
use zapline_core::realtime::{RealtimeEvent, RealtimePublisher, Room};
use zapline_core::store::InboxStore;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
}

/// Client → server frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Subscribe { conversation_id: Uuid },
    Unsubscribe { conversation_id: Uuid },
    Typing { conversation_id: Uuid, is_typing: bool },
    Ping,
}

pub async fn handshake(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<WsQuery>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let Some(claims) = validate_bearer(&query.token, &state.config.jwt_secret) else {
        return Ok(HttpResponse::Unauthorized().finish());
    };

    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    let connection_id = Uuid::new_v4();
    let mut events = state.hub.register(connection_id);
    state.hub.join(connection_id, &Room::Org(claims.org));
    state.hub.join(connection_id, &Room::User(claims.sub));
    debug!(connection = %connection_id, org = %claims.org, "socket connected");

    let hub = state.hub.clone();
    let store = state.store.clone();
    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if session.text(text).await.is_err() {
                        break;
                    }
                }
                frame = msg_stream.next() => {
                    let Some(Ok(message)) = frame else { break };
                    match message {
                        Message::Text(text) => {
                            let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) else {
                                continue;
                            };
                            handle_frame(frame, connection_id, &claims, &hub, &store).await;
                        }
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            }
        }
        hub.disconnect(connection_id);
        debug!(connection = %connection_id, "socket disconnected");
    });

    Ok(response)
}

async fn handle_frame(
    frame: ClientFrame,
    connection_id: Uuid,
    claims: &crate::middleware::Claims,
    hub: &std::sync::Arc<zapline_core::realtime::RealtimeHub>,
    store: &zapline_db::PgStore,
) {
    match frame {
        ClientFrame::Subscribe { conversation_id } => {
            // Room membership stays inside the operator's tenant.
            match store.conversation(conversation_id).await {
                Ok(Some(conversation)) if conversation.tenant_id == claims.org => {
                    hub.join(connection_id, &Room::Conversation(conversation_id));
                }
                Ok(_) => {
                    warn!(
                        connection = %connection_id,
                        conversation = %conversation_id,
                        "subscribe refused: wrong tenant"
                    );
                }
                Err(err) => warn!("subscribe lookup failed: {err}"),
            }
        }
        ClientFrame::Unsubscribe { conversation_id } => {
            hub.leave(connection_id, &Room::Conversation(conversation_id));
        }
        ClientFrame::Typing {
            conversation_id,
            is_typing,
        } => {
            hub.publish(
                Room::Conversation(conversation_id),
                RealtimeEvent::Typing {
                    conversation_id,
                    user_id: claims.sub,
                    is_typing,
                },
            );
        }
        ClientFrame::Ping => {}
    }
}
