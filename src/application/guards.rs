//! Lookups and checks shared by the request and listing services.

use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use crate::application::commands::first_message;
use crate::application::ports::{CategoryLookup, EventPublisher, ListingStore, OfferStore};
use crate::domain::aggregates::{CatalogListing, Category};
use crate::domain::events::DomainEvent;
use crate::{CatalogError, Result};

/// Attempts at a write that keeps hitting a slug unique index.
pub(crate) const SLUG_WRITE_ATTEMPTS: u32 = 3;

pub(crate) fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(CatalogError::Cancelled);
    }
    Ok(())
}

pub(crate) fn validate<T: Validate>(payload: &T) -> Result<()> {
    payload.validate().map_err(|errors| CatalogError::Validation(first_message(&errors)))
}

pub(crate) async fn live_category<S: CategoryLookup + ?Sized>(store: &S, id: Uuid) -> Result<Category> {
    store
        .category(id)
        .await?
        .filter(|category| !category.is_deleted)
        .ok_or_else(|| CatalogError::NotFound("Category not found".into()))
}

/// A live category allowed to hold products.
pub(crate) async fn product_category<S: CategoryLookup + ?Sized>(store: &S, id: Option<Uuid>) -> Result<Category> {
    let id = id.ok_or_else(|| CatalogError::Validation("Category is required".into()))?;
    let category = live_category(store, id).await?;
    if !category.scope.accepts_products() {
        return Err(CatalogError::Validation(format!(
            "Category '{}' does not accept products",
            category.name
        )));
    }
    Ok(category)
}

pub(crate) async fn live_listing<S: ListingStore + ?Sized>(store: &S, id: Uuid) -> Result<CatalogListing> {
    store
        .listing_by_id(id)
        .await?
        .filter(CatalogListing::is_live)
        .ok_or_else(|| CatalogError::NotFound("Product not found".into()))
}

pub(crate) async fn ensure_no_offer<S: OfferStore + ?Sized>(store: &S, product_id: Uuid, seller_id: Uuid) -> Result<()> {
    if store.active_offer_exists(product_id, seller_id).await? {
        return Err(duplicate_offer());
    }
    Ok(())
}

pub(crate) fn duplicate_offer() -> CatalogError {
    CatalogError::Conflict("You already have an offer on this product".into())
}

/// Publishing happens after commit; a broker failure never undoes a command.
pub(crate) async fn publish_all(publisher: &dyn EventPublisher, events: Vec<DomainEvent>) {
    for event in events {
        if let Err(err) = publisher.publish(&event).await {
            warn!(subject = event.subject(), error = %err, "failed to publish domain event");
        }
    }
}
