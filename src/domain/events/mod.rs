//! Domain events
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainEvent {
    Request(RequestEvent),
    Listing(ListingEvent),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestEvent {
    Submitted { request_id: Uuid, seller_id: Uuid, target_product_id: Option<Uuid>, slug: String },
    Revised { request_id: Uuid, slug: String },
    Approved { request_id: Uuid, approved_product_id: Uuid, promoted_id: Uuid },
    Rejected { request_id: Uuid, reason: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingEvent {
    Created { listing_id: Uuid, slug: String, approved_from_request_id: Option<Uuid> },
    Updated { listing_id: Uuid, slug: String },
    OfferCreated { offer_id: Uuid, product_id: Uuid, seller_id: Uuid, approved_from_request_id: Option<Uuid> },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Request(RequestEvent::Submitted { .. }) => "catalog.request.submitted",
            Self::Request(RequestEvent::Revised { .. }) => "catalog.request.revised",
            Self::Request(RequestEvent::Approved { .. }) => "catalog.request.approved",
            Self::Request(RequestEvent::Rejected { .. }) => "catalog.request.rejected",
            Self::Listing(ListingEvent::Created { .. }) => "catalog.listing.created",
            Self::Listing(ListingEvent::Updated { .. }) => "catalog.listing.updated",
            Self::Listing(ListingEvent::OfferCreated { .. }) => "catalog.offer.created",
        }
    }
}
