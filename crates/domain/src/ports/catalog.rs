use crate::DomainResult;
use crate::catalog::{Listing, UserProfile};

/// Read access to the product catalog, scoped to what chat needs.
pub trait ListingDirectory: Send + Sync {
    fn get_listing(
        &self,
        listing_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Listing>>>;

    fn list_by_seller(
        &self,
        seller_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Listing>>>;
}

/// Read access to user display identities.
pub trait UserDirectory: Send + Sync {
    fn get_profile(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<UserProfile>>>;
}
