//! Direct listing management for administrators.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::commands::{AddOffer, SaveListing};
use crate::application::guards::{self, SLUG_WRITE_ATTEMPTS};
use crate::application::ports::{AuditSource, CatalogSlugIndex, CatalogStore, EventPublisher};
use crate::application::result::CommandResult;
use crate::domain::aggregates::{CatalogListing, ListingOffer};
use crate::domain::events::{DomainEvent, ListingEvent};
use crate::domain::slug::SlugAllocator;
use crate::domain::value_objects::ListingCode;
use crate::{CatalogError, Result, StoreError};

pub struct ListingCatalog<S> {
    store: Arc<S>,
    slugs: SlugAllocator,
    events: Arc<dyn EventPublisher>,
}

impl<S> Clone for ListingCatalog<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), slugs: self.slugs.clone(), events: Arc::clone(&self.events) }
    }
}

impl<S: CatalogStore> ListingCatalog<S> {
    pub fn new(store: Arc<S>, slugs: SlugAllocator, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, slugs, events }
    }

    #[instrument(skip_all)]
    pub async fn create(
        &self,
        payload: SaveListing,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<CommandResult<CatalogListing>> {
        CommandResult::from_result(self.try_create(payload, audit, cancel).await)
    }

    #[instrument(skip_all, fields(listing_id = %listing_id))]
    pub async fn update(
        &self,
        listing_id: Uuid,
        payload: SaveListing,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<CommandResult<CatalogListing>> {
        CommandResult::from_result(self.try_update(listing_id, payload, audit, cancel).await)
    }

    #[instrument(skip_all, fields(seller_id = %seller_id))]
    pub async fn add_offer(
        &self,
        seller_id: Uuid,
        payload: AddOffer,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<CommandResult<ListingOffer>> {
        CommandResult::from_result(self.try_add_offer(seller_id, payload, audit, cancel).await)
    }

    pub async fn listing(&self, listing_id: Uuid) -> Result<CommandResult<CatalogListing>> {
        CommandResult::from_result(guards::live_listing(self.store.as_ref(), listing_id).await)
    }

    pub async fn offers(&self, listing_id: Uuid) -> Result<CommandResult<Vec<ListingOffer>>> {
        let result = match guards::live_listing(self.store.as_ref(), listing_id).await {
            Ok(listing) => {
                let offers = self.store.offers_for_listing(listing.id).await?;
                Ok(offers.into_iter().filter(|offer| !offer.is_deleted).collect())
            }
            Err(err) => Err(err),
        };
        CommandResult::from_result(result)
    }

    async fn try_create(&self, payload: SaveListing, audit: &dyn AuditSource, cancel: &CancellationToken) -> Result<CatalogListing> {
        guards::ensure_live(cancel)?;
        let SaveListing { draft, publish, .. } = payload;
        guards::validate(&draft)?;
        let category = guards::product_category(self.store.as_ref(), draft.category_id).await?;
        let candidate = draft.slug_source().to_string();
        let stamp = audit.capture();

        let mut listing = CatalogListing::create(draft.into_details(category.id), String::new(), None, stamp.clone());
        if publish {
            listing.publish(stamp.at);
        }
        let mut attempt = 1;
        loop {
            listing.seo_slug = self.coded_slug(&candidate, None, None).await?;
            guards::ensure_live(cancel)?;
            match self.store.add_listing(&listing).await {
                Ok(()) => break,
                Err(StoreError::SlugConflict(slug)) if attempt < SLUG_WRITE_ATTEMPTS => {
                    warn!(%slug, attempt, "listing slug taken at write, reallocating");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(listing_id = %listing.id, slug = %listing.seo_slug, "listing created");
        let event = ListingEvent::Created { listing_id: listing.id, slug: listing.seo_slug.clone(), approved_from_request_id: None };
        guards::publish_all(self.events.as_ref(), vec![DomainEvent::Listing(event)]).await;
        Ok(listing)
    }

    async fn try_update(
        &self,
        listing_id: Uuid,
        payload: SaveListing,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<CatalogListing> {
        guards::ensure_live(cancel)?;
        let mut listing = guards::live_listing(self.store.as_ref(), listing_id).await?;
        let SaveListing { draft, regenerate_slug, publish } = payload;
        guards::validate(&draft)?;
        let category = guards::product_category(self.store.as_ref(), draft.category_id).await?;

        // The slug only moves when asked to; the listing keeps its code either way.
        let explicit = draft.seo_slug.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        let candidate = match explicit {
            Some(slug) if slug != listing.seo_slug => Some(slug),
            _ if regenerate_slug => Some(draft.name.trim().to_string()),
            _ => None,
        };
        let code = listing.code();
        let stamp = audit.capture();
        let details = draft.into_details(category.id);

        let mut attempt = 1;
        loop {
            let slug = match &candidate {
                Some(candidate) => self.coded_slug(candidate, code.as_ref(), Some(listing.id)).await?,
                None => listing.seo_slug.clone(),
            };
            listing.revise(details.clone(), slug, stamp.clone());
            if publish && !listing.is_published {
                listing.publish(stamp.at);
            }
            guards::ensure_live(cancel)?;
            match self.store.update_listing(&listing).await {
                Ok(()) => break,
                Err(StoreError::SlugConflict(slug)) if candidate.is_some() && attempt < SLUG_WRITE_ATTEMPTS => {
                    warn!(%slug, attempt, "listing slug taken at write, reallocating");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(slug = %listing.seo_slug, "listing updated");
        let event = ListingEvent::Updated { listing_id: listing.id, slug: listing.seo_slug.clone() };
        guards::publish_all(self.events.as_ref(), vec![DomainEvent::Listing(event)]).await;
        Ok(listing)
    }

    async fn try_add_offer(
        &self,
        seller_id: Uuid,
        payload: AddOffer,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<ListingOffer> {
        guards::ensure_live(cancel)?;
        guards::validate(&payload)?;
        let listing = guards::live_listing(self.store.as_ref(), payload.product_id).await?;
        guards::ensure_no_offer(self.store.as_ref(), listing.id, seller_id).await?;

        let stamp = audit.capture();
        let mut offer = ListingOffer::create(listing.id, seller_id, payload.price, payload.inventory, stamp.clone());
        if payload.publish {
            offer.publish(stamp.at);
        }
        guards::ensure_live(cancel)?;
        match self.store.add_offer(&offer).await {
            Ok(()) => {}
            Err(StoreError::DuplicateOffer) => return Err(guards::duplicate_offer()),
            Err(err) => return Err(err.into()),
        }

        info!(offer_id = %offer.id, product_id = %listing.id, "offer created");
        let event = ListingEvent::OfferCreated {
            offer_id: offer.id,
            product_id: offer.product_id,
            seller_id,
            approved_from_request_id: None,
        };
        guards::publish_all(self.events.as_ref(), vec![DomainEvent::Listing(event)]).await;
        Ok(offer)
    }

    async fn coded_slug(&self, candidate: &str, code: Option<&ListingCode>, exclude_id: Option<Uuid>) -> Result<String> {
        let index = CatalogSlugIndex(self.store.as_ref());
        self.slugs
            .allocate_unique_coded(candidate, code, exclude_id, &index)
            .await
            .map_err(CatalogError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::commands::ListingDraft;
    use crate::application::ports::{CallerContext, CategoryStore, ListingStore, NullPublisher};
    use crate::domain::aggregates::{Category, CategoryScope};
    use crate::domain::slug::SequentialTokens;
    use crate::domain::value_objects::CodedSlug;
    use crate::infrastructure::memory::InMemoryCatalogStore;
    use crate::FailureKind;

    async fn setup() -> (Arc<InMemoryCatalogStore>, ListingCatalog<InMemoryCatalogStore>, Category) {
        let store = Arc::new(InMemoryCatalogStore::default());
        let category = Category::new("Bags", CategoryScope::Product);
        store.add_category(&category).await.unwrap();
        let catalog = ListingCatalog::new(
            Arc::clone(&store),
            SlugAllocator::new(Arc::new(SequentialTokens::default())),
            Arc::new(NullPublisher),
        );
        (store, catalog, category)
    }

    fn save(category: &Category, name: &str) -> SaveListing {
        SaveListing {
            draft: ListingDraft {
                name: name.into(),
                description: "Hand stitched".into(),
                price: Some(250_000),
                inventory: Some(4),
                category_id: Some(category.id),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn create(catalog: &ListingCatalog<InMemoryCatalogStore>, payload: SaveListing) -> CommandResult<CatalogListing> {
        catalog.create(payload, &CallerContext::default(), &CancellationToken::new()).await.unwrap()
    }

    async fn update(catalog: &ListingCatalog<InMemoryCatalogStore>, id: Uuid, payload: SaveListing) -> CatalogListing {
        catalog
            .update(id, payload, &CallerContext::default(), &CancellationToken::new())
            .await
            .unwrap()
            .into_data()
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_coded_slug() {
        let (_, catalog, category) = setup().await;
        let mut payload = save(&category, "Leather Bag");
        payload.publish = true;
        let listing = create(&catalog, payload).await.into_data().unwrap();
        assert_eq!(listing.seo_slug, "00000001~leather-bag");
        assert!(listing.is_published);

        let twin = create(&catalog, save(&category, "Leather Bag")).await.into_data().unwrap();
        assert_eq!(twin.seo_slug, "00000002~leather-bag");
    }

    #[tokio::test]
    async fn test_create_keeps_explicit_code() {
        let (_, catalog, category) = setup().await;
        let mut payload = save(&category, "Leather Bag");
        payload.draft.seo_slug = Some("abcd1234~Tote Bag".into());
        let listing = create(&catalog, payload).await.into_data().unwrap();
        assert_eq!(listing.seo_slug, "abcd1234~tote-bag");
    }

    #[tokio::test]
    async fn test_update_preserves_slug() {
        let (_, catalog, category) = setup().await;
        let listing = create(&catalog, save(&category, "Leather Bag")).await.into_data().unwrap();

        let renamed = update(&catalog, listing.id, save(&category, "Canvas Bag")).await;
        assert_eq!(renamed.seo_slug, listing.seo_slug);
        assert_eq!(renamed.details.name, "Canvas Bag");
        assert!(renamed.updated.is_some());

        let mut payload = save(&category, "Canvas Bag");
        payload.regenerate_slug = true;
        let regenerated = update(&catalog, listing.id, payload).await;
        assert_eq!(regenerated.seo_slug, "00000001~canvas-bag");

        let mut payload = save(&category, "Canvas Bag");
        payload.draft.seo_slug = Some("Weekend Tote".into());
        let explicit = update(&catalog, listing.id, payload).await;
        let slug = CodedSlug::parse(&explicit.seo_slug).unwrap();
        assert_eq!((slug.code().as_str(), slug.rest()), ("00000001", "weekend-tote"));
    }

    #[tokio::test]
    async fn test_update_missing_listing() {
        let (_, catalog, category) = setup().await;
        let result = catalog
            .update(Uuid::now_v7(), save(&category, "Bag"), &CallerContext::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.failure, Some(FailureKind::NotFound));
    }

    #[tokio::test]
    async fn test_add_offer_once_per_seller() {
        let (store, catalog, category) = setup().await;
        let listing = create(&catalog, save(&category, "Leather Bag")).await.into_data().unwrap();
        let seller = Uuid::now_v7();
        let payload = AddOffer { product_id: listing.id, price: 230_000, inventory: 2, publish: true };

        let offer = catalog
            .add_offer(seller, payload.clone(), &CallerContext::user(seller), &CancellationToken::new())
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert!(offer.is_published);
        assert_eq!(offer.created.user_id, Some(seller));

        let again = catalog
            .add_offer(seller, payload, &CallerContext::user(seller), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(again.failure, Some(FailureKind::Conflict));

        let offers = catalog.offers(listing.id).await.unwrap().into_data().unwrap();
        assert_eq!(offers.len(), 1);
        assert!(store.listing_by_id(listing.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_offer_rejects_negative_price() {
        let (_, catalog, category) = setup().await;
        let listing = create(&catalog, save(&category, "Leather Bag")).await.into_data().unwrap();
        let payload = AddOffer { product_id: listing.id, price: -5, inventory: 2, publish: false };
        let result = catalog
            .add_offer(Uuid::now_v7(), payload, &CallerContext::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.message.as_deref(), Some("Price cannot be negative"));
    }
}
