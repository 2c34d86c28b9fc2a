use serde::{Deserialize, Serialize};

/// A product listing as seen by the chat subsystem: just enough to
/// resolve the owning seller and render an inbox header. Catalog CRUD
/// lives elsewhere.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    pub listing_id: String,
    pub seller_id: String,
    pub name: String,
    pub image: Option<String>,
}

/// Display identity from the user directory.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    pub image: Option<String>,
}
