//! In-memory catalog store
//!
//! Mirrors the unique indexes of the SQL schema so services behave the same
//! against either backend. All tables sit behind one lock, which makes
//! [`PromotionStore::commit_promotion`] atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::ports::{
    CategoryLookup, CategoryStore, ListingStore, OfferStore, Page, Promotion, PromotionStore, RequestStore,
};
use crate::domain::aggregates::{CatalogListing, CatalogRequest, Category, ListingOffer, RequestStatus};
use crate::StoreError;

#[derive(Default)]
struct Tables {
    requests: HashMap<Uuid, CatalogRequest>,
    listings: HashMap<Uuid, CatalogListing>,
    offers: HashMap<Uuid, ListingOffer>,
    categories: HashMap<Uuid, Category>,
}

impl Tables {
    fn request_slug_taken(&self, slug: &str, exclude_id: Option<Uuid>) -> bool {
        self.requests.values().any(|r| r.seo_slug == slug && Some(r.id) != exclude_id)
    }

    fn listing_slug_taken(&self, slug: &str, exclude_id: Option<Uuid>) -> bool {
        self.listings.values().any(|l| l.seo_slug == slug && Some(l.id) != exclude_id)
    }

    /// Request and listing slugs share one namespace.
    fn slug_taken(&self, slug: &str, exclude_id: Option<Uuid>) -> bool {
        self.request_slug_taken(slug, exclude_id) || self.listing_slug_taken(slug, exclude_id)
    }

    fn offer_taken(&self, product_id: Uuid, seller_id: Uuid) -> bool {
        self.offers.values().any(|o| !o.is_deleted && o.product_id == product_id && o.seller_id == seller_id)
    }

    fn check_listing(&self, listing: &CatalogListing) -> Result<(), StoreError> {
        if self.slug_taken(&listing.seo_slug, Some(listing.id)) {
            return Err(StoreError::SlugConflict(listing.seo_slug.clone()));
        }
        Ok(())
    }

    fn check_offer(&self, offer: &ListingOffer) -> Result<(), StoreError> {
        if !offer.is_deleted && self.offer_taken(offer.product_id, offer.seller_id) {
            return Err(StoreError::DuplicateOffer);
        }
        Ok(())
    }
}

/// Stored rows never carry undelivered events.
fn row(request: &CatalogRequest) -> CatalogRequest {
    let mut row = request.clone();
    row.events.clear();
    row
}

#[derive(Default)]
pub struct InMemoryCatalogStore {
    tables: RwLock<Tables>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn listing_count(&self) -> usize {
        self.tables.read().await.listings.len()
    }

    pub async fn soft_delete_request(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let request = tables.requests.get_mut(&id).ok_or(StoreError::Missing(id))?;
        request.is_deleted = true;
        Ok(())
    }
}

#[async_trait]
impl RequestStore for InMemoryCatalogStore {
    async fn request_by_id(&self, id: Uuid) -> Result<Option<CatalogRequest>, StoreError> {
        Ok(self.tables.read().await.requests.get(&id).cloned())
    }

    async fn request_slug_exists(&self, slug: &str, exclude_id: Option<Uuid>) -> Result<bool, StoreError> {
        Ok(self.tables.read().await.request_slug_taken(slug, exclude_id))
    }

    async fn pending_request_exists(&self, seller_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.read().await.requests.values().any(|r| {
            !r.is_deleted
                && r.status == RequestStatus::Pending
                && r.seller_id == seller_id
                && r.target_product_id == Some(product_id)
        }))
    }

    async fn add_request(&self, request: &CatalogRequest) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.slug_taken(&request.seo_slug, None) {
            return Err(StoreError::SlugConflict(request.seo_slug.clone()));
        }
        tables.requests.insert(request.id, row(request));
        Ok(())
    }

    async fn update_request(&self, request: &CatalogRequest) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.requests.contains_key(&request.id) {
            return Err(StoreError::Missing(request.id));
        }
        if tables.slug_taken(&request.seo_slug, Some(request.id)) {
            return Err(StoreError::SlugConflict(request.seo_slug.clone()));
        }
        tables.requests.insert(request.id, row(request));
        Ok(())
    }

    async fn list_requests(&self, status: Option<RequestStatus>, page: Page) -> Result<Vec<CatalogRequest>, StoreError> {
        let tables = self.tables.read().await;
        let mut requests: Vec<_> = tables
            .requests
            .values()
            .filter(|r| !r.is_deleted && status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created.at.cmp(&a.created.at).then(b.id.cmp(&a.id)));
        Ok(requests
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(0))
            .collect())
    }
}

#[async_trait]
impl ListingStore for InMemoryCatalogStore {
    async fn listing_by_id(&self, id: Uuid) -> Result<Option<CatalogListing>, StoreError> {
        Ok(self.tables.read().await.listings.get(&id).cloned())
    }

    async fn listing_slug_exists(&self, slug: &str, exclude_id: Option<Uuid>) -> Result<bool, StoreError> {
        Ok(self.tables.read().await.listing_slug_taken(slug, exclude_id))
    }

    async fn add_listing(&self, listing: &CatalogListing) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.check_listing(listing)?;
        tables.listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn update_listing(&self, listing: &CatalogListing) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.listings.contains_key(&listing.id) {
            return Err(StoreError::Missing(listing.id));
        }
        tables.check_listing(listing)?;
        tables.listings.insert(listing.id, listing.clone());
        Ok(())
    }
}

#[async_trait]
impl OfferStore for InMemoryCatalogStore {
    async fn active_offer_exists(&self, product_id: Uuid, seller_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.read().await.offer_taken(product_id, seller_id))
    }

    async fn add_offer(&self, offer: &ListingOffer) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.check_offer(offer)?;
        tables.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn offers_for_listing(&self, product_id: Uuid) -> Result<Vec<ListingOffer>, StoreError> {
        let tables = self.tables.read().await;
        let mut offers: Vec<_> = tables.offers.values().filter(|o| o.product_id == product_id).cloned().collect();
        offers.sort_by(|a, b| a.price.cmp(&b.price).then(a.id.cmp(&b.id)));
        Ok(offers)
    }
}

#[async_trait]
impl CategoryLookup for InMemoryCatalogStore {
    async fn category(&self, id: Uuid) -> Result<Option<Category>, StoreError> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }
}

#[async_trait]
impl CategoryStore for InMemoryCatalogStore {
    async fn add_category(&self, category: &Category) -> Result<(), StoreError> {
        self.tables.write().await.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn categories(&self) -> Result<Vec<Category>, StoreError> {
        let tables = self.tables.read().await;
        let mut categories: Vec<_> = tables.categories.values().filter(|c| !c.is_deleted).cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }
}

#[async_trait]
impl PromotionStore for InMemoryCatalogStore {
    async fn commit_promotion(&self, request: &CatalogRequest, promotion: &Promotion) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.requests.get(&request.id) {
            None => return Err(StoreError::Missing(request.id)),
            Some(stored) if stored.is_deleted || stored.status != RequestStatus::Pending => {
                return Err(StoreError::NotPending(request.id));
            }
            Some(_) => {}
        }
        // every check runs before the first insert
        match promotion {
            Promotion::Listing(listing) => tables.check_listing(listing)?,
            Promotion::Offer(offer) => tables.check_offer(offer)?,
        }
        match promotion {
            Promotion::Listing(listing) => {
                tables.listings.insert(listing.id, listing.clone());
            }
            Promotion::Offer(offer) => {
                tables.offers.insert(offer.id, offer.clone());
            }
        }
        tables.requests.insert(request.id, row(request));
        Ok(())
    }
}
