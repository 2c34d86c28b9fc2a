use std::collections::HashMap;

use lapak_domain::chat::{ChatMessage, ConversationKey};
use tokio::sync::{RwLock, broadcast};

/// In-process room registry: one broadcast channel per conversation
/// key, created on first subscribe and pruned when a publish finds no
/// remaining receivers. Fan-out across processes would need an
/// external pub/sub keyed by the same triple.
pub struct RoomRegistry {
    capacity: usize,
    rooms: RwLock<HashMap<ConversationKey, broadcast::Sender<ChatMessage>>>,
}

impl RoomRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, key: &ConversationKey) -> broadcast::Receiver<ChatMessage> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Delivers to every current member of the room. Returns the
    /// member count; a message published into an empty room reaches
    /// nobody, which is fine because it was persisted before the
    /// publish.
    pub async fn publish(&self, key: &ConversationKey, message: ChatMessage) -> usize {
        let delivered = {
            let rooms = self.rooms.read().await;
            match rooms.get(key) {
                Some(sender) => sender.send(message).unwrap_or(0),
                None => return 0,
            }
        };

        if delivered == 0 {
            let mut rooms = self.rooms.write().await;
            if rooms
                .get(key)
                .is_some_and(|sender| sender.receiver_count() == 0)
            {
                rooms.remove(key);
            }
        }

        delivered
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
