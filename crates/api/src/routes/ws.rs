use std::collections::HashMap;
use std::time::Duration;

use axum::{
    Extension,
    extract::State,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use lapak_domain::chat::{ChatMessage, ConversationKey};
use lapak_domain::identity::ActorIdentity;

use crate::middleware::{self, AuthContext};
use crate::observability;
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Frames a client may send over the chat socket. Unknown or malformed
/// frames are dropped without a reply; the only acknowledgement of a
/// send is the broadcast coming back through the room.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub(crate) enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        listing: String,
        #[serde(default)]
        buyer_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        listing: String,
        #[serde(default)]
        buyer_id: Option<String>,
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub(crate) enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    NewMessage {
        id: String,
        listing: String,
        seller: String,
        buyer: String,
        sender: String,
        text: String,
        created_at: i64,
    },
}

impl ServerEvent {
    pub(crate) fn from_message(message: &ChatMessage) -> Self {
        Self::NewMessage {
            id: message.message_id.clone(),
            listing: message.listing_id.clone(),
            seller: message.seller_id.clone(),
            buyer: message.buyer_id.clone(),
            sender: message.sender_id.clone(),
            text: message.body.clone(),
            created_at: message.created_at_ms,
        }
    }
}

pub async fn chat_socket(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ws: WebSocketUpgrade,
) -> Response {
    let actor = match middleware::actor_identity(&auth) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    ws.on_upgrade(move |socket| run_chat_socket(state, actor, socket))
}

async fn run_chat_socket(state: AppState, actor: ActorIdentity, mut socket: WebSocket) {
    let queue_capacity = state.config.chat_room_capacity.max(1);
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<ServerEvent>(queue_capacity);
    let mut session = SocketSession::new(state, actor, outgoing_tx);
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            event = outgoing_rx.recv() => {
                let Some(event) = event else { break };
                let Ok(payload) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => session.handle_frame(&text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "websocket receive error");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    session.detach_all();
}

/// Per-connection state: the authenticated actor plus one forwarding
/// task per joined room. A connection may join several rooms, one per
/// listing the user has open. The outgoing queue is bounded; a
/// connection too stalled to drain it stops receiving from its rooms.
pub(crate) struct SocketSession {
    state: AppState,
    actor: ActorIdentity,
    outgoing: mpsc::Sender<ServerEvent>,
    joined: HashMap<ConversationKey, JoinHandle<()>>,
}

impl SocketSession {
    pub(crate) fn new(
        state: AppState,
        actor: ActorIdentity,
        outgoing: mpsc::Sender<ServerEvent>,
    ) -> Self {
        Self {
            state,
            actor,
            outgoing,
            joined: HashMap::new(),
        }
    }

    pub(crate) async fn handle_frame(&mut self, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(event).await,
            Err(err) => {
                tracing::debug!(error = %err, "dropping malformed chat frame");
            }
        }
    }

    pub(crate) async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom { listing, buyer_id } => {
                self.join_room(&listing, buyer_id.as_deref()).await;
            }
            ClientEvent::SendMessage {
                listing,
                buyer_id,
                text,
            } => {
                self.send_message(&listing, buyer_id.as_deref(), &text).await;
            }
        }
    }

    async fn join_room(&mut self, listing: &str, buyer_id: Option<&str>) {
        let key = match self
            .state
            .chat_service()
            .resolve_conversation(&self.actor, listing, buyer_id)
            .await
        {
            Ok(key) => key,
            Err(err) => {
                tracing::debug!(listing, error = %err, "join dropped");
                return;
            }
        };

        if self.joined.contains_key(&key) {
            return;
        }

        let mut receiver = self.state.rooms.subscribe(&key).await;
        let outgoing = self.outgoing.clone();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        match outgoing.try_send(ServerEvent::from_message(&message)) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                tracing::warn!("outgoing chat queue full; leaving room");
                                break;
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "chat room receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.joined.insert(key, handle);
    }

    async fn send_message(&mut self, listing: &str, buyer_id: Option<&str>, text: &str) {
        let message = match self
            .state
            .chat_service()
            .send_message(&self.actor, listing, buyer_id, text)
            .await
        {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(listing, error = %err, "send dropped");
                return;
            }
        };

        let key = message.conversation_key();
        let delivered = self.state.rooms.publish(&key, message).await;
        observability::register_chat_fanout(delivered);
    }

    pub(crate) fn detach_all(&mut self) {
        for (_, handle) in self.joined.drain() {
            handle.abort();
        }
    }
}
