//! Catalog request lifecycle
//!
//! Sellers submit and revise pending requests; administrators approve or
//! reject them. Approval promotes a new-product request into a listing and an
//! offer request into a listing offer, committed together with the request.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::commands::{ApproveCatalogRequest, ListingDraft, RejectCatalogRequest, SubmitCatalogRequest};
use crate::application::guards::{self, SLUG_WRITE_ATTEMPTS};
use crate::application::ports::{AuditSource, CatalogSlugIndex, CatalogStore, EventPublisher, Page, Promotion};
use crate::application::result::CommandResult;
use crate::domain::aggregates::{CatalogListing, CatalogRequest, ListingOffer, RequestError, RequestStatus};
use crate::domain::events::{DomainEvent, ListingEvent};
use crate::domain::slug::SlugAllocator;
use crate::domain::value_objects::ProductDetails;
use crate::{CatalogError, Result, StoreError};

pub struct RequestLifecycle<S> {
    store: Arc<S>,
    slugs: SlugAllocator,
    events: Arc<dyn EventPublisher>,
}

impl<S> Clone for RequestLifecycle<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), slugs: self.slugs.clone(), events: Arc::clone(&self.events) }
    }
}

enum SlugPlan {
    Plain(String),
    Offer { target_slug: String },
}

fn state_conflict(err: RequestError) -> CatalogError {
    CatalogError::Conflict(err.to_string())
}

impl<S: CatalogStore> RequestLifecycle<S> {
    pub fn new(store: Arc<S>, slugs: SlugAllocator, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, slugs, events }
    }

    #[instrument(skip_all, fields(seller_id = %seller_id))]
    pub async fn submit(
        &self,
        seller_id: Uuid,
        payload: SubmitCatalogRequest,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<CommandResult<CatalogRequest>> {
        CommandResult::from_result(self.try_submit(seller_id, payload, audit, cancel).await)
    }

    #[instrument(skip_all, fields(request_id = %request_id, seller_id = %seller_id))]
    pub async fn revise(
        &self,
        request_id: Uuid,
        seller_id: Uuid,
        draft: ListingDraft,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<CommandResult<CatalogRequest>> {
        CommandResult::from_result(self.try_revise(request_id, seller_id, draft, audit, cancel).await)
    }

    /// Returns the id of the created listing or offer.
    #[instrument(skip_all, fields(request_id = %request_id, reviewer_id = %reviewer_id))]
    pub async fn approve(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        decision: ApproveCatalogRequest,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<CommandResult<Uuid>> {
        CommandResult::from_result(self.try_approve(request_id, reviewer_id, decision, audit, cancel).await)
    }

    #[instrument(skip_all, fields(request_id = %request_id, reviewer_id = %reviewer_id))]
    pub async fn reject(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        payload: RejectCatalogRequest,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<CommandResult<bool>> {
        CommandResult::from_result(self.try_reject(request_id, reviewer_id, payload, audit, cancel).await)
    }

    pub async fn find(&self, request_id: Uuid) -> Result<CommandResult<CatalogRequest>> {
        let found = self.store.request_by_id(request_id).await?.filter(|r| !r.is_deleted());
        Ok(match found {
            Some(request) => CommandResult::success(request),
            None => CommandResult::failure(crate::FailureKind::NotFound, "Request not found"),
        })
    }

    pub async fn list(&self, status: Option<RequestStatus>, page: Page) -> Result<Vec<CatalogRequest>> {
        Ok(self.store.list_requests(status, page).await?)
    }

    async fn try_submit(
        &self,
        seller_id: Uuid,
        payload: SubmitCatalogRequest,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<CatalogRequest> {
        guards::ensure_live(cancel)?;
        let SubmitCatalogRequest { target_product_id, draft } = payload;
        let (details, plan) = match target_product_id {
            Some(product_id) => {
                let target = guards::live_listing(self.store.as_ref(), product_id).await?;
                let details = offer_details(&target, draft)?;
                guards::ensure_no_offer(self.store.as_ref(), product_id, seller_id).await?;
                if self.store.pending_request_exists(seller_id, product_id).await? {
                    return Err(CatalogError::Conflict(
                        "You have already submitted a request for this product".into(),
                    ));
                }
                (details, SlugPlan::Offer { target_slug: target.seo_slug })
            }
            None => {
                guards::validate(&draft)?;
                let category = guards::product_category(self.store.as_ref(), draft.category_id).await?;
                let plan = SlugPlan::Plain(draft.slug_source().to_string());
                (draft.into_details(category.id), plan)
            }
        };

        let stamp = audit.capture();
        let mut attempt = 1;
        let mut request = loop {
            let slug = self.allocate(&plan, seller_id, None).await?;
            let request = CatalogRequest::submit(seller_id, target_product_id, details.clone(), slug, stamp.clone());
            guards::ensure_live(cancel)?;
            match self.store.add_request(&request).await {
                Ok(()) => break request,
                Err(StoreError::SlugConflict(slug)) if attempt < SLUG_WRITE_ATTEMPTS => {
                    warn!(%slug, attempt, "request slug taken at write, reallocating");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        };

        info!(request_id = %request.id(), slug = %request.seo_slug(), offer = !request.is_new_product_request(), "catalog request submitted");
        guards::publish_all(self.events.as_ref(), request.take_events()).await;
        Ok(request)
    }

    async fn try_revise(
        &self,
        request_id: Uuid,
        seller_id: Uuid,
        draft: ListingDraft,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<CatalogRequest> {
        guards::ensure_live(cancel)?;
        let mut request = self.pending_request(request_id).await?;
        if request.seller_id() != seller_id {
            return Err(CatalogError::NotFound("Request not found".into()));
        }

        // Offer slugs derive from the target and seller, neither of which changes.
        let (details, plan) = match request.target_product_id() {
            Some(product_id) => {
                let target = guards::live_listing(self.store.as_ref(), product_id).await?;
                (offer_details(&target, draft)?, None)
            }
            None => {
                guards::validate(&draft)?;
                let category = guards::product_category(self.store.as_ref(), draft.category_id).await?;
                let plan = SlugPlan::Plain(draft.slug_source().to_string());
                (draft.into_details(category.id), Some(plan))
            }
        };

        let stamp = audit.capture();
        let mut attempt = 1;
        loop {
            let slug = match &plan {
                Some(plan) => self.allocate(plan, seller_id, Some(request.id())).await?,
                None => request.seo_slug().to_string(),
            };
            request.revise(details.clone(), slug, stamp.clone()).map_err(state_conflict)?;
            guards::ensure_live(cancel)?;
            match self.store.update_request(&request).await {
                Ok(()) => break,
                Err(StoreError::SlugConflict(slug)) if plan.is_some() && attempt < SLUG_WRITE_ATTEMPTS => {
                    warn!(%slug, attempt, "request slug taken at write, reallocating");
                    request.take_events();
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(slug = %request.seo_slug(), "catalog request revised");
        guards::publish_all(self.events.as_ref(), request.take_events()).await;
        Ok(request)
    }

    async fn try_approve(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        decision: ApproveCatalogRequest,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<Uuid> {
        guards::ensure_live(cancel)?;
        let mut request = self.pending_request(request_id).await?;
        let stamp = audit.capture();
        let published_at = decision.published_at.unwrap_or(stamp.at);

        let (mut promotion, approved_product_id) = match request.target_product_id() {
            None => {
                // Scope was checked at submission; approval only needs the category to still exist.
                guards::live_category(self.store.as_ref(), request.details().category_id).await?;
                // Listing slugs live in their own coded namespace; the request slug is not reused.
                let slug = self.listing_slug(&request.details().name).await?;
                let mut listing = CatalogListing::promote(&request, slug, stamp.clone());
                if decision.publish {
                    listing.publish(published_at);
                }
                let listing_id = listing.id;
                (Promotion::Listing(listing), listing_id)
            }
            Some(product_id) => {
                let target = guards::live_listing(self.store.as_ref(), product_id).await?;
                guards::ensure_no_offer(self.store.as_ref(), target.id, request.seller_id()).await?;
                let mut offer = ListingOffer::promote(&request, target.id, stamp.clone())
                    .ok_or_else(|| CatalogError::Validation("Offer request has no price".into()))?;
                if decision.publish {
                    offer.publish(published_at);
                }
                (Promotion::Offer(offer), target.id)
            }
        };

        request
            .approve(reviewer_id, approved_product_id, promotion.id(), stamp)
            .map_err(state_conflict)?;

        let mut attempt = 1;
        loop {
            guards::ensure_live(cancel)?;
            match self.store.commit_promotion(&request, &promotion).await {
                Ok(()) => break,
                Err(StoreError::DuplicateOffer) => return Err(guards::duplicate_offer()),
                Err(StoreError::NotPending(_)) => {
                    return Err(CatalogError::Conflict("Request has already been reviewed".into()))
                }
                Err(StoreError::SlugConflict(slug)) if attempt < SLUG_WRITE_ATTEMPTS => {
                    let Promotion::Listing(listing) = &mut promotion else {
                        return Err(StoreError::SlugConflict(slug).into());
                    };
                    warn!(%slug, attempt, "listing slug taken at write, reallocating");
                    listing.seo_slug = self.listing_slug(&listing.details.name).await?;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let promoted_id = promotion.id();
        let mut events = request.take_events();
        events.push(DomainEvent::Listing(match &promotion {
            Promotion::Listing(listing) => ListingEvent::Created {
                listing_id: listing.id,
                slug: listing.seo_slug.clone(),
                approved_from_request_id: Some(request.id()),
            },
            Promotion::Offer(offer) => ListingEvent::OfferCreated {
                offer_id: offer.id,
                product_id: offer.product_id,
                seller_id: offer.seller_id,
                approved_from_request_id: Some(request.id()),
            },
        }));
        info!(%promoted_id, %approved_product_id, "catalog request approved");
        guards::publish_all(self.events.as_ref(), events).await;
        Ok(promoted_id)
    }

    async fn try_reject(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        payload: RejectCatalogRequest,
        audit: &dyn AuditSource,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        guards::ensure_live(cancel)?;
        guards::validate(&payload)?;
        let mut request = self.pending_request(request_id).await?;
        let stamp = audit.capture();
        let reason = payload.reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        request.reject(reviewer_id, reason, stamp).map_err(state_conflict)?;

        guards::ensure_live(cancel)?;
        self.store.update_request(&request).await?;
        info!("catalog request rejected");
        guards::publish_all(self.events.as_ref(), request.take_events()).await;
        Ok(true)
    }

    /// A live request still awaiting review.
    async fn pending_request(&self, id: Uuid) -> Result<CatalogRequest> {
        let request = self
            .store
            .request_by_id(id)
            .await?
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| CatalogError::NotFound("Request not found".into()))?;
        request.ensure_pending().map_err(state_conflict)?;
        Ok(request)
    }

    async fn allocate(&self, plan: &SlugPlan, seller_id: Uuid, exclude_id: Option<Uuid>) -> Result<String> {
        let index = CatalogSlugIndex(self.store.as_ref());
        let slug = match plan {
            SlugPlan::Plain(candidate) => self.slugs.allocate_unique(candidate, exclude_id, &index).await?,
            SlugPlan::Offer { target_slug } => {
                self.slugs.allocate_offer(target_slug, seller_id, exclude_id, &index).await?
            }
        };
        Ok(slug)
    }

    async fn listing_slug(&self, name: &str) -> Result<String> {
        let index = CatalogSlugIndex(self.store.as_ref());
        Ok(self.slugs.allocate_unique_coded(name, None, None, &index).await?)
    }
}

/// Offer details: blanks inherited from the target, always priced.
fn offer_details(target: &CatalogListing, mut draft: ListingDraft) -> Result<ProductDetails> {
    draft.inherit_from(target);
    guards::validate(&draft)?;
    if draft.is_custom_order {
        return Err(CatalogError::Validation("Offers cannot be custom orders".into()));
    }
    Ok(draft.into_details(target.details.category_id))
}
