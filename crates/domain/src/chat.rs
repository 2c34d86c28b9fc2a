use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::catalog::ListingDirectory;
use crate::ports::chat::MessageRepository;
use crate::util::{now_ms, uuid_v7_without_dashes};

const MAX_BODY_LENGTH: usize = 2_000;

/// Identity of one conversation: a listing plus its buyer/seller pair.
/// There is no stored conversation record; the key is the identity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub listing_id: String,
    pub seller_id: String,
    pub buyer_id: String,
}

/// Immutable once appended. `message_id` is a UUIDv7, so ids within a
/// conversation are distinct and time-ordered.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub message_id: String,
    pub listing_id: String,
    pub seller_id: String,
    pub buyer_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at_ms: i64,
}

impl ChatMessage {
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey {
            listing_id: self.listing_id.clone(),
            seller_id: self.seller_id.clone(),
            buyer_id: self.buyer_id.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ChatService {
    messages: Arc<dyn MessageRepository>,
    listings: Arc<dyn ListingDirectory>,
}

impl ChatService {
    pub fn new(messages: Arc<dyn MessageRepository>, listings: Arc<dyn ListingDirectory>) -> Self {
        Self { messages, listings }
    }

    /// Maps an authenticated caller plus a listing to the canonical
    /// conversation key. A seller addressing their own listing must
    /// name the buyer; anyone else is the buyer themselves and any
    /// supplied `buyer_id` is ignored.
    pub async fn resolve_conversation(
        &self,
        actor: &ActorIdentity,
        listing_id: &str,
        buyer_id: Option<&str>,
    ) -> DomainResult<ConversationKey> {
        let listing = self
            .listings
            .get_listing(listing_id)
            .await?
            .ok_or(DomainError::NotFound)?;

        let resolved_buyer = if actor.user_id == listing.seller_id {
            buyer_id
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    DomainError::Validation(
                        "buyer_id is required when the seller opens a conversation".into(),
                    )
                })?
                .to_string()
        } else {
            actor.user_id.clone()
        };

        Ok(ConversationKey {
            listing_id: listing.listing_id,
            seller_id: listing.seller_id,
            buyer_id: resolved_buyer,
        })
    }

    pub async fn send_message(
        &self,
        actor: &ActorIdentity,
        listing_id: &str,
        buyer_id: Option<&str>,
        text: &str,
    ) -> DomainResult<ChatMessage> {
        let key = self
            .resolve_conversation(actor, listing_id, buyer_id)
            .await?;

        let body = text.trim();
        if body.is_empty() {
            return Err(DomainError::Validation("message text is required".into()));
        }
        if body.chars().count() > MAX_BODY_LENGTH {
            return Err(DomainError::Validation(format!(
                "message text exceeds max length of {MAX_BODY_LENGTH}"
            )));
        }

        let message = ChatMessage {
            message_id: uuid_v7_without_dashes(),
            listing_id: key.listing_id,
            seller_id: key.seller_id,
            buyer_id: key.buyer_id,
            sender_id: actor.user_id.clone(),
            body: body.to_string(),
            created_at_ms: now_ms(),
        };

        self.messages.append(&message).await
    }

    pub async fn list_messages(&self, key: &ConversationKey) -> DomainResult<Vec<ChatMessage>> {
        self.messages.list_by_conversation(key).await
    }

    pub async fn list_buyers(
        &self,
        listing_id: &str,
        seller_id: &str,
    ) -> DomainResult<Vec<String>> {
        self.messages
            .list_buyers_for_listing(listing_id, seller_id)
            .await
    }

    pub async fn latest_message(
        &self,
        key: &ConversationKey,
    ) -> DomainResult<Option<ChatMessage>> {
        self.messages.latest_for_conversation(key).await
    }
}
