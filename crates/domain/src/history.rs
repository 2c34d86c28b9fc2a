use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::DomainResult;
use crate::chat::{ChatService, ConversationKey};
use crate::identity::ActorIdentity;
use crate::ports::catalog::{ListingDirectory, UserDirectory};

/// Sender identity expanded to a display form.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct MessageSender {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,
    pub sender: MessageSender,
    pub text: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InboxConversation {
    pub buyer_id: String,
    pub buyer_name: String,
    pub buyer_image: Option<String>,
    pub last_message: String,
    pub last_message_time: i64,
    pub last_sender: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct InboxListingRef {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct InboxListing {
    pub listing: InboxListingRef,
    pub conversations: Vec<InboxConversation>,
}

/// Synchronous read side of the chat subsystem: ordered conversation
/// history and the seller's aggregated inbox.
#[derive(Clone)]
pub struct HistoryService {
    chat: ChatService,
    listings: Arc<dyn ListingDirectory>,
    users: Arc<dyn UserDirectory>,
}

impl HistoryService {
    pub fn new(
        chat: ChatService,
        listings: Arc<dyn ListingDirectory>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            chat,
            listings,
            users,
        }
    }

    pub async fn get_conversation(
        &self,
        actor: &ActorIdentity,
        listing_id: &str,
        buyer_id: Option<&str>,
    ) -> DomainResult<Vec<ConversationMessage>> {
        let key = self
            .chat
            .resolve_conversation(actor, listing_id, buyer_id)
            .await?;
        let messages = self.chat.list_messages(&key).await?;

        let mut names: HashMap<String, String> = HashMap::new();
        for message in &messages {
            if !names.contains_key(&message.sender_id) {
                let name = self.display_name(&message.sender_id).await?;
                names.insert(message.sender_id.clone(), name);
            }
        }

        Ok(messages
            .into_iter()
            .map(|message| {
                let name = names
                    .get(&message.sender_id)
                    .cloned()
                    .unwrap_or_else(|| message.sender_id.clone());
                ConversationMessage {
                    id: message.message_id,
                    sender: MessageSender {
                        id: message.sender_id,
                        name,
                    },
                    text: message.body,
                    created_at: message.created_at_ms,
                }
            })
            .collect())
    }

    /// One entry per (listing, buyer) pair with at least one message.
    /// Listings with no conversations are omitted; conversations
    /// within a listing are ordered by last-message time, newest
    /// first.
    pub async fn seller_inbox(&self, actor: &ActorIdentity) -> DomainResult<Vec<InboxListing>> {
        let listings = self.listings.list_by_seller(&actor.user_id).await?;
        let mut inbox = Vec::new();

        for listing in listings {
            let buyers = self
                .chat
                .list_buyers(&listing.listing_id, &listing.seller_id)
                .await?;

            let mut conversations = Vec::with_capacity(buyers.len());
            for buyer_id in buyers {
                let key = ConversationKey {
                    listing_id: listing.listing_id.clone(),
                    seller_id: listing.seller_id.clone(),
                    buyer_id: buyer_id.clone(),
                };
                let Some(last) = self.chat.latest_message(&key).await? else {
                    continue;
                };
                let buyer_profile = self.users.get_profile(&buyer_id).await?;
                let last_sender = self.display_name(&last.sender_id).await?;
                conversations.push(InboxConversation {
                    buyer_name: buyer_profile
                        .as_ref()
                        .map(|profile| profile.name.clone())
                        .unwrap_or_else(|| buyer_id.clone()),
                    buyer_image: buyer_profile.and_then(|profile| profile.image),
                    buyer_id,
                    last_message: last.body,
                    last_message_time: last.created_at_ms,
                    last_sender,
                });
            }

            if conversations.is_empty() {
                continue;
            }
            conversations.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
            inbox.push(InboxListing {
                listing: InboxListingRef {
                    id: listing.listing_id,
                    name: listing.name,
                    image: listing.image,
                },
                conversations,
            });
        }

        Ok(inbox)
    }

    async fn display_name(&self, user_id: &str) -> DomainResult<String> {
        Ok(self
            .users
            .get_profile(user_id)
            .await?
            .map(|profile| profile.name)
            .unwrap_or_else(|| user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UserProfile;
    use crate::chat::tests::{MockListingDirectory, MockMessageRepo, listing};
    use crate::error::DomainError;
    use crate::ports::BoxFuture;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct MockUserDirectory {
        profiles: Arc<RwLock<HashMap<String, UserProfile>>>,
    }

    impl MockUserDirectory {
        async fn insert(&self, user_id: &str, name: &str) {
            self.profiles.write().await.insert(
                user_id.to_string(),
                UserProfile {
                    user_id: user_id.to_string(),
                    name: name.to_string(),
                    image: Some(format!("{user_id}.png")),
                },
            );
        }
    }

    impl UserDirectory for MockUserDirectory {
        fn get_profile(
            &self,
            user_id: &str,
        ) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
            let user_id = user_id.to_string();
            let profiles = self.profiles.clone();
            Box::pin(async move {
                let profiles = profiles.read().await;
                Ok(profiles.get(&user_id).cloned())
            })
        }
    }

    struct Fixture {
        chat: ChatService,
        history: HistoryService,
    }

    async fn fixture() -> Fixture {
        let listings = Arc::new(MockListingDirectory::default());
        listings.insert(listing("listing-1", "seller-1")).await;
        listings.insert(listing("listing-2", "seller-1")).await;

        let users = Arc::new(MockUserDirectory::default());
        users.insert("seller-1", "Sari").await;
        users.insert("buyer-1", "Budi").await;
        users.insert("buyer-2", "Wati").await;

        let chat = ChatService::new(Arc::new(MockMessageRepo::default()), listings.clone());
        let history = HistoryService::new(chat.clone(), listings, users);
        Fixture { chat, history }
    }

    #[tokio::test]
    async fn conversation_expands_sender_display_names() {
        let fx = fixture().await;
        let buyer = ActorIdentity::with_user_id("buyer-1");
        let seller = ActorIdentity::with_user_id("seller-1");

        fx.chat
            .send_message(&buyer, "listing-1", None, "Is this available?")
            .await
            .expect("buyer send");
        fx.chat
            .send_message(&seller, "listing-1", Some("buyer-1"), "Yes")
            .await
            .expect("seller send");

        let messages = fx
            .history
            .get_conversation(&seller, "listing-1", Some("buyer-1"))
            .await
            .expect("conversation");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender.name, "Budi");
        assert_eq!(messages[0].text, "Is this available?");
        assert_eq!(messages[1].sender.name, "Sari");
    }

    #[tokio::test]
    async fn conversation_requires_buyer_id_for_seller() {
        let fx = fixture().await;
        let seller = ActorIdentity::with_user_id("seller-1");

        let err = fx
            .history
            .get_conversation(&seller, "listing-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn inbox_aggregates_per_buyer_and_omits_quiet_listings() {
        let fx = fixture().await;
        let seller = ActorIdentity::with_user_id("seller-1");
        let budi = ActorIdentity::with_user_id("buyer-1");
        let wati = ActorIdentity::with_user_id("buyer-2");

        fx.chat
            .send_message(&budi, "listing-1", None, "First question")
            .await
            .expect("budi send");
        fx.chat
            .send_message(&wati, "listing-1", None, "Still for sale?")
            .await
            .expect("wati send");
        fx.chat
            .send_message(&seller, "listing-1", Some("buyer-1"), "Replying to Budi")
            .await
            .expect("seller reply");

        let inbox = fx.history.seller_inbox(&seller).await.expect("inbox");

        // listing-2 has no conversations and is omitted.
        assert_eq!(inbox.len(), 1);
        let entry = &inbox[0];
        assert_eq!(entry.listing.id, "listing-1");
        assert_eq!(entry.conversations.len(), 2);

        // Newest last message first: the seller's reply to Budi.
        assert_eq!(entry.conversations[0].buyer_id, "buyer-1");
        assert_eq!(entry.conversations[0].buyer_name, "Budi");
        assert_eq!(entry.conversations[0].last_message, "Replying to Budi");
        assert_eq!(entry.conversations[0].last_sender, "Sari");
        assert_eq!(entry.conversations[1].buyer_id, "buyer-2");
        assert_eq!(entry.conversations[1].last_message, "Still for sale?");
        assert_eq!(entry.conversations[1].last_sender, "Wati");
        assert!(
            entry.conversations[0].last_message_time
                >= entry.conversations[1].last_message_time
        );
    }

    #[tokio::test]
    async fn inbox_is_empty_for_users_without_listings() {
        let fx = fixture().await;
        let somebody = ActorIdentity::with_user_id("buyer-1");
        let inbox = fx.history.seller_inbox(&somebody).await.expect("inbox");
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn unknown_profiles_fall_back_to_raw_ids() {
        let fx = fixture().await;
        let stranger = ActorIdentity::with_user_id("stranger-9");

        fx.chat
            .send_message(&stranger, "listing-1", None, "hello")
            .await
            .expect("send");

        let seller = ActorIdentity::with_user_id("seller-1");
        let inbox = fx.history.seller_inbox(&seller).await.expect("inbox");
        assert_eq!(inbox[0].conversations[0].buyer_name, "stranger-9");
        assert_eq!(inbox[0].conversations[0].last_sender, "stranger-9");
    }
}
