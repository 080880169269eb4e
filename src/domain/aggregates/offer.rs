//! Listing Offer Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::CatalogRequest;
use crate::domain::value_objects::AuditStamp;

/// A seller's own price and stock for an existing listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingOffer {
    pub id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub price: i64,
    pub inventory: i32,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub approved_from_request_id: Option<Uuid>,
    pub is_deleted: bool,
    pub created: AuditStamp,
    pub updated: Option<AuditStamp>,
}

impl ListingOffer {
    pub fn create(product_id: Uuid, seller_id: Uuid, price: i64, inventory: i32, created: AuditStamp) -> Self {
        Self {
            id: Uuid::now_v7(), product_id, seller_id, price, inventory, is_published: false,
            published_at: None, approved_from_request_id: None, is_deleted: false, created, updated: None,
        }
    }

    /// `None` when the request carries no price.
    pub fn promote(request: &CatalogRequest, product_id: Uuid, created: AuditStamp) -> Option<Self> {
        let price = request.details().price?;
        let mut offer = Self::create(product_id, request.seller_id(), price, request.details().inventory, created);
        offer.approved_from_request_id = Some(request.id());
        Some(offer)
    }

    pub fn publish(&mut self, at: DateTime<Utc>) {
        self.is_published = true;
        self.published_at = Some(at);
    }
}
