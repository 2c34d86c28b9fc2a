use crate::DomainResult;
use crate::chat::{ChatMessage, ConversationKey};

/// Durable, append-only message storage. Implementations must
/// serialize concurrent appends to the same conversation key so that
/// list order is total per conversation.
pub trait MessageRepository: Send + Sync {
    fn append(
        &self,
        message: &ChatMessage,
    ) -> crate::ports::BoxFuture<'_, DomainResult<ChatMessage>>;

    fn list_by_conversation(
        &self,
        key: &ConversationKey,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<ChatMessage>>>;

    fn list_buyers_for_listing(
        &self,
        listing_id: &str,
        seller_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<String>>>;

    fn latest_for_conversation(
        &self,
        key: &ConversationKey,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<ChatMessage>>>;
}
