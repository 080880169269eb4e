//! Catalog Listing Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::CatalogRequest;
use crate::domain::value_objects::{AuditStamp, CodedSlug, ListingCode, ProductDetails};

/// A live, publishable product. `seo_slug` is always `code~rest`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogListing {
    pub id: Uuid,
    pub seller_id: Option<Uuid>,
    pub details: ProductDetails,
    pub seo_slug: String,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub approved_from_request_id: Option<Uuid>,
    pub is_deleted: bool,
    pub created: AuditStamp,
    pub updated: Option<AuditStamp>,
}

impl CatalogListing {
    pub fn create(details: ProductDetails, seo_slug: impl Into<String>, seller_id: Option<Uuid>, created: AuditStamp) -> Self {
        Self {
            id: Uuid::now_v7(), seller_id, details, seo_slug: seo_slug.into(), is_published: false,
            published_at: None, approved_from_request_id: None, is_deleted: false, created, updated: None,
        }
    }

    /// Builds the listing an approved request turns into. The request's
    /// creation stamp carries over; `stamp` records the promotion.
    pub fn promote(request: &CatalogRequest, seo_slug: impl Into<String>, stamp: AuditStamp) -> Self {
        let mut listing = Self::create(request.details().clone(), seo_slug, Some(request.seller_id()), request.created().clone());
        listing.approved_from_request_id = Some(request.id());
        listing.updated = Some(stamp);
        listing
    }

    pub fn code(&self) -> Option<ListingCode> {
        CodedSlug::parse(&self.seo_slug).map(|slug| slug.code().clone())
    }

    pub fn publish(&mut self, at: DateTime<Utc>) {
        self.is_published = true;
        self.published_at = Some(at);
    }

    pub fn revise(&mut self, details: ProductDetails, seo_slug: impl Into<String>, stamp: AuditStamp) {
        self.details = details;
        self.seo_slug = seo_slug.into();
        self.updated = Some(stamp);
    }

    pub fn is_live(&self) -> bool { !self.is_deleted }
}
