use std::collections::HashMap;
use std::sync::Arc;

use lapak_domain::DomainResult;
use lapak_domain::catalog::{Listing, UserProfile};
use lapak_domain::chat::{ChatMessage, ConversationKey};
use lapak_domain::ports::BoxFuture;
use lapak_domain::ports::catalog::{ListingDirectory, UserDirectory};
use lapak_domain::ports::chat::MessageRepository;
use tokio::sync::RwLock;

/// Append-only message log per conversation key. The write lock on
/// the map serializes concurrent appends to the same key, which is
/// what gives each conversation its total order.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    by_key: Arc<RwLock<HashMap<ConversationKey, Vec<ChatMessage>>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageRepository for InMemoryMessageRepository {
    fn append(&self, message: &ChatMessage) -> BoxFuture<'_, DomainResult<ChatMessage>> {
        let message = message.clone();
        let by_key = self.by_key.clone();
        Box::pin(async move {
            let mut by_key = by_key.write().await;
            by_key
                .entry(message.conversation_key())
                .or_default()
                .push(message.clone());
            Ok(message)
        })
    }

    fn list_by_conversation(
        &self,
        key: &ConversationKey,
    ) -> BoxFuture<'_, DomainResult<Vec<ChatMessage>>> {
        let key = key.clone();
        let by_key = self.by_key.clone();
        Box::pin(async move {
            let by_key = by_key.read().await;
            Ok(by_key.get(&key).cloned().unwrap_or_default())
        })
    }

    fn list_buyers_for_listing(
        &self,
        listing_id: &str,
        seller_id: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<String>>> {
        let listing_id = listing_id.to_string();
        let seller_id = seller_id.to_string();
        let by_key = self.by_key.clone();
        Box::pin(async move {
            let by_key = by_key.read().await;
            let mut buyers: Vec<String> = by_key
                .iter()
                .filter(|(key, messages)| {
                    key.listing_id == listing_id
                        && key.seller_id == seller_id
                        && !messages.is_empty()
                })
                .map(|(key, _)| key.buyer_id.clone())
                .collect();
            buyers.sort();
            buyers.dedup();
            Ok(buyers)
        })
    }

    fn latest_for_conversation(
        &self,
        key: &ConversationKey,
    ) -> BoxFuture<'_, DomainResult<Option<ChatMessage>>> {
        let key = key.clone();
        let by_key = self.by_key.clone();
        Box::pin(async move {
            let by_key = by_key.read().await;
            Ok(by_key.get(&key).and_then(|messages| messages.last().cloned()))
        })
    }
}

#[derive(Default)]
pub struct InMemoryListingDirectory {
    listings: Arc<RwLock<HashMap<String, Listing>>>,
}

impl InMemoryListingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, listing: Listing) {
        self.listings
            .write()
            .await
            .insert(listing.listing_id.clone(), listing);
    }
}

impl ListingDirectory for InMemoryListingDirectory {
    fn get_listing(&self, listing_id: &str) -> BoxFuture<'_, DomainResult<Option<Listing>>> {
        let listing_id = listing_id.to_string();
        let listings = self.listings.clone();
        Box::pin(async move {
            let listings = listings.read().await;
            Ok(listings.get(&listing_id).cloned())
        })
    }

    fn list_by_seller(&self, seller_id: &str) -> BoxFuture<'_, DomainResult<Vec<Listing>>> {
        let seller_id = seller_id.to_string();
        let listings = self.listings.clone();
        Box::pin(async move {
            let listings = listings.read().await;
            let mut owned: Vec<Listing> = listings
                .values()
                .filter(|listing| listing.seller_id == seller_id)
                .cloned()
                .collect();
            owned.sort_by(|a, b| a.listing_id.cmp(&b.listing_id));
            Ok(owned)
        })
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    profiles: Arc<RwLock<HashMap<String, UserProfile>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, profile: UserProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile);
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn get_profile(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let user_id = user_id.to_string();
        let profiles = self.profiles.clone();
        Box::pin(async move {
            let profiles = profiles.read().await;
            Ok(profiles.get(&user_id).cloned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapak_domain::util::uuid_v7_without_dashes;

    fn key(buyer: &str) -> ConversationKey {
        ConversationKey {
            listing_id: "listing-1".to_string(),
            seller_id: "seller-1".to_string(),
            buyer_id: buyer.to_string(),
        }
    }

    fn message(key: &ConversationKey, sender: &str, body: &str, at: i64) -> ChatMessage {
        ChatMessage {
            message_id: uuid_v7_without_dashes(),
            listing_id: key.listing_id.clone(),
            seller_id: key.seller_id.clone(),
            buyer_id: key.buyer_id.clone(),
            sender_id: sender.to_string(),
            body: body.to_string(),
            created_at_ms: at,
        }
    }

    #[tokio::test]
    async fn append_order_is_preserved_per_conversation() {
        let repo = InMemoryMessageRepository::new();
        let key = key("buyer-1");

        for index in 0..5 {
            repo.append(&message(&key, "buyer-1", &format!("msg-{index}"), index))
                .await
                .expect("append");
        }

        let listed = repo.list_by_conversation(&key).await.expect("list");
        let bodies: Vec<&str> = listed.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["msg-0", "msg-1", "msg-2", "msg-3", "msg-4"]);

        let latest = repo.latest_for_conversation(&key).await.expect("latest");
        assert_eq!(latest.expect("some").body, "msg-4");
    }

    #[tokio::test]
    async fn buyers_are_distinct_per_listing_and_seller() {
        let repo = InMemoryMessageRepository::new();
        for buyer in ["buyer-2", "buyer-1", "buyer-2"] {
            let key = key(buyer);
            repo.append(&message(&key, buyer, "hi", 1)).await.expect("append");
        }

        let buyers = repo
            .list_buyers_for_listing("listing-1", "seller-1")
            .await
            .expect("buyers");
        assert_eq!(buyers, vec!["buyer-1".to_string(), "buyer-2".to_string()]);

        let none = repo
            .list_buyers_for_listing("listing-other", "seller-1")
            .await
            .expect("buyers");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn empty_conversation_lists_nothing() {
        let repo = InMemoryMessageRepository::new();
        let listed = repo.list_by_conversation(&key("buyer-1")).await.expect("list");
        assert!(listed.is_empty());
        let latest = repo
            .latest_for_conversation(&key("buyer-1"))
            .await
            .expect("latest");
        assert!(latest.is_none());
    }
}
