use std::sync::Arc;

use lapak_domain::chat::ChatService;
use lapak_domain::history::HistoryService;
use lapak_domain::ports::catalog::{ListingDirectory, UserDirectory};
use lapak_domain::ports::chat::MessageRepository;
use lapak_infra::config::AppConfig;
use lapak_infra::repositories::{
    InMemoryListingDirectory, InMemoryMessageRepository, InMemoryUserDirectory,
};
use lapak_infra::rooms::RoomRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub messages: Arc<dyn MessageRepository>,
    pub listings: Arc<dyn ListingDirectory>,
    pub users: Arc<dyn UserDirectory>,
    pub rooms: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self::with_backends(
            config,
            Arc::new(InMemoryMessageRepository::new()),
            Arc::new(InMemoryListingDirectory::new()),
            Arc::new(InMemoryUserDirectory::new()),
        )
    }

    pub fn with_backends(
        config: AppConfig,
        messages: Arc<dyn MessageRepository>,
        listings: Arc<dyn ListingDirectory>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let rooms = Arc::new(RoomRegistry::new(config.chat_room_capacity));
        Self {
            config,
            messages,
            listings,
            users,
            rooms,
        }
    }

    pub fn chat_service(&self) -> ChatService {
        ChatService::new(self.messages.clone(), self.listings.clone())
    }

    pub fn history_service(&self) -> HistoryService {
        HistoryService::new(
            self.chat_service(),
            self.listings.clone(),
            self.users.clone(),
        )
    }
}
