//! Storage, audit and event ports
//!
//! Transaction boundaries belong to the implementations: every method is one
//! write, except [`PromotionStore::commit_promotion`] which must apply the
//! request update and the promoted record together or not at all.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::{CatalogListing, CatalogRequest, Category, ListingOffer, RequestStatus};
use crate::domain::events::DomainEvent;
use crate::domain::slug::SlugProbe;
use crate::domain::value_objects::AuditStamp;
use crate::StoreError;

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Page {
    fn default() -> Self { Self { page: 1, per_page: 20 } }
}

impl Page {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self { page: page.unwrap_or(1).max(1), per_page: per_page.unwrap_or(20).clamp(1, 100) }
    }
    pub fn limit(&self) -> i64 { i64::from(self.per_page) }
    pub fn offset(&self) -> i64 { i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page) }
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn request_by_id(&self, id: Uuid) -> Result<Option<CatalogRequest>, StoreError>;
    async fn request_slug_exists(&self, slug: &str, exclude_id: Option<Uuid>) -> Result<bool, StoreError>;
    /// Live pending request by `seller_id` targeting `product_id`.
    async fn pending_request_exists(&self, seller_id: Uuid, product_id: Uuid) -> Result<bool, StoreError>;
    async fn add_request(&self, request: &CatalogRequest) -> Result<(), StoreError>;
    async fn update_request(&self, request: &CatalogRequest) -> Result<(), StoreError>;
    /// Live requests, newest first.
    async fn list_requests(&self, status: Option<RequestStatus>, page: Page) -> Result<Vec<CatalogRequest>, StoreError>;
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn listing_by_id(&self, id: Uuid) -> Result<Option<CatalogListing>, StoreError>;
    async fn listing_slug_exists(&self, slug: &str, exclude_id: Option<Uuid>) -> Result<bool, StoreError>;
    async fn add_listing(&self, listing: &CatalogListing) -> Result<(), StoreError>;
    async fn update_listing(&self, listing: &CatalogListing) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OfferStore: Send + Sync {
    async fn active_offer_exists(&self, product_id: Uuid, seller_id: Uuid) -> Result<bool, StoreError>;
    async fn add_offer(&self, offer: &ListingOffer) -> Result<(), StoreError>;
    async fn offers_for_listing(&self, product_id: Uuid) -> Result<Vec<ListingOffer>, StoreError>;
}

#[async_trait]
pub trait CategoryLookup: Send + Sync {
    async fn category(&self, id: Uuid) -> Result<Option<Category>, StoreError>;
}

#[async_trait]
pub trait CategoryStore: CategoryLookup {
    async fn add_category(&self, category: &Category) -> Result<(), StoreError>;
    async fn categories(&self) -> Result<Vec<Category>, StoreError>;
}

/// The record an approved request turns into.
#[derive(Clone, Debug)]
pub enum Promotion {
    Listing(CatalogListing),
    Offer(ListingOffer),
}

impl Promotion {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Listing(listing) => listing.id,
            Self::Offer(offer) => offer.id,
        }
    }
}

#[async_trait]
pub trait PromotionStore: Send + Sync {
    async fn commit_promotion(&self, request: &CatalogRequest, promotion: &Promotion) -> Result<(), StoreError>;
}

pub trait CatalogStore: RequestStore + ListingStore + OfferStore + CategoryStore + PromotionStore {}

impl<T> CatalogStore for T where T: RequestStore + ListingStore + OfferStore + CategoryStore + PromotionStore {}

/// Slug probe spanning request and listing slugs of one store.
pub struct CatalogSlugIndex<'a, S: ?Sized>(pub &'a S);

#[async_trait]
impl<S> SlugProbe for CatalogSlugIndex<'_, S>
where
    S: RequestStore + ListingStore + ?Sized,
{
    async fn is_taken(&self, slug: &str, exclude_id: Option<Uuid>) -> Result<bool, StoreError> {
        Ok(self.0.request_slug_exists(slug, exclude_id).await?
            || self.0.listing_slug_exists(slug, exclude_id).await?)
    }
}

/// Supplies the actor and origin stamped onto written records.
pub trait AuditSource: Send + Sync {
    fn capture(&self) -> AuditStamp;
}

#[derive(Clone, Debug, Default)]
pub struct CallerContext {
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
}

impl CallerContext {
    pub fn user(user_id: Uuid) -> Self {
        Self { user_id: Some(user_id), ip_address: None }
    }
}

impl AuditSource for CallerContext {
    fn capture(&self) -> AuditStamp {
        AuditStamp::now(self.user_id, self.ip_address.clone())
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Drops events; used when no broker is configured.
pub struct NullPublisher;

#[async_trait]
impl EventPublisher for NullPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        tracing::debug!(subject = event.subject(), "no event broker configured, dropping event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_page_bounds() {
        let page = Page::new(Some(0), Some(500));
        assert_eq!((page.page, page.limit(), page.offset()), (1, 100, 0));
        assert_eq!(Page::new(Some(3), Some(10)).offset(), 20);
    }
}
