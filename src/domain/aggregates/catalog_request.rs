//! Catalog Request Aggregate
//!
//! A seller's proposal for a new product, or for an offer on an existing
//! product when `target_product_id` is set. Requests start `Pending` and move
//! once, to `Approved` or `Rejected`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, RequestEvent};
use crate::domain::value_objects::{AuditStamp, ProductDetails};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus { #[default] Pending, Approved, Rejected }

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Approved => "approved", Self::Rejected => "rejected" }
    }
    pub fn is_terminal(&self) -> bool { !matches!(self, Self::Pending) }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for RequestStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CatalogRequest {
    pub(crate) id: Uuid,
    pub(crate) seller_id: Uuid,
    pub(crate) target_product_id: Option<Uuid>,
    pub(crate) details: ProductDetails,
    pub(crate) seo_slug: String,
    pub(crate) status: RequestStatus,
    pub(crate) reviewer_id: Option<Uuid>,
    pub(crate) reviewed_at: Option<DateTime<Utc>>,
    pub(crate) rejection_reason: Option<String>,
    pub(crate) approved_product_id: Option<Uuid>,
    pub(crate) is_deleted: bool,
    pub(crate) created: AuditStamp,
    pub(crate) updated: Option<AuditStamp>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

impl CatalogRequest {
    pub fn submit(
        seller_id: Uuid,
        target_product_id: Option<Uuid>,
        details: ProductDetails,
        seo_slug: impl Into<String>,
        created: AuditStamp,
    ) -> Self {
        let mut request = Self {
            id: Uuid::now_v7(), seller_id, target_product_id, details, seo_slug: seo_slug.into(),
            status: RequestStatus::Pending, reviewer_id: None, reviewed_at: None, rejection_reason: None,
            approved_product_id: None, is_deleted: false, created, updated: None, events: vec![],
        };
        request.raise_event(DomainEvent::Request(RequestEvent::Submitted {
            request_id: request.id,
            seller_id,
            target_product_id,
            slug: request.seo_slug.clone(),
        }));
        request
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn seller_id(&self) -> Uuid { self.seller_id }
    pub fn target_product_id(&self) -> Option<Uuid> { self.target_product_id }
    pub fn is_new_product_request(&self) -> bool { self.target_product_id.is_none() }
    pub fn details(&self) -> &ProductDetails { &self.details }
    pub fn seo_slug(&self) -> &str { &self.seo_slug }
    pub fn status(&self) -> RequestStatus { self.status }
    pub fn reviewer_id(&self) -> Option<Uuid> { self.reviewer_id }
    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> { self.reviewed_at }
    pub fn rejection_reason(&self) -> Option<&str> { self.rejection_reason.as_deref() }
    pub fn approved_product_id(&self) -> Option<Uuid> { self.approved_product_id }
    pub fn is_deleted(&self) -> bool { self.is_deleted }
    pub fn created(&self) -> &AuditStamp { &self.created }
    pub fn updated(&self) -> Option<&AuditStamp> { self.updated.as_ref() }

    /// Only live, pending requests can be edited or reviewed.
    pub fn ensure_pending(&self) -> Result<(), RequestError> {
        if self.is_deleted { return Err(RequestError::Deleted); }
        if self.status.is_terminal() { return Err(RequestError::NotPending(self.status)); }
        Ok(())
    }

    pub fn revise(&mut self, details: ProductDetails, seo_slug: impl Into<String>, stamp: AuditStamp) -> Result<(), RequestError> {
        self.ensure_pending()?;
        self.details = details;
        self.seo_slug = seo_slug.into();
        self.updated = Some(stamp);
        self.raise_event(DomainEvent::Request(RequestEvent::Revised { request_id: self.id, slug: self.seo_slug.clone() }));
        Ok(())
    }

    /// `approved_product_id` is the listing the request resolves to: the new
    /// listing, or the target listing of an offer. `promoted_id` is the record
    /// actually created.
    pub fn approve(&mut self, reviewer_id: Uuid, approved_product_id: Uuid, promoted_id: Uuid, stamp: AuditStamp) -> Result<(), RequestError> {
        self.ensure_pending()?;
        self.status = RequestStatus::Approved;
        self.reviewer_id = Some(reviewer_id);
        self.reviewed_at = Some(stamp.at);
        self.approved_product_id = Some(approved_product_id);
        self.updated = Some(stamp);
        self.raise_event(DomainEvent::Request(RequestEvent::Approved { request_id: self.id, approved_product_id, promoted_id }));
        Ok(())
    }

    pub fn reject(&mut self, reviewer_id: Uuid, reason: Option<String>, stamp: AuditStamp) -> Result<(), RequestError> {
        self.ensure_pending()?;
        self.status = RequestStatus::Rejected;
        self.reviewer_id = Some(reviewer_id);
        self.reviewed_at = Some(stamp.at);
        self.rejection_reason = reason.clone();
        self.updated = Some(stamp);
        self.raise_event(DomainEvent::Request(RequestEvent::Rejected { request_id: self.id, reason }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum RequestError { Deleted, NotPending(RequestStatus) }
impl std::error::Error for RequestError {}
impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deleted => write!(f, "Request has been deleted"),
            Self::NotPending(status) => write!(f, "Request is already {status}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::value_objects::ItemKind;

    pub(crate) fn details(name: &str) -> ProductDetails {
        ProductDetails {
            name: name.into(), short_description: None, description: "desc".into(), price: Some(100_000),
            inventory: 5, is_custom_order: false, item_kind: ItemKind::Physical, download_path: None,
            category_id: Uuid::now_v7(), image_path: None, gallery: vec![],
        }
    }

    #[test]
    fn test_request_approve() {
        let mut r = CatalogRequest::submit(Uuid::now_v7(), None, details("Bag"), "bag", AuditStamp::system());
        assert!(r.is_new_product_request());
        let listing = Uuid::now_v7();
        r.approve(Uuid::now_v7(), listing, listing, AuditStamp::system()).unwrap();
        assert_eq!(r.status(), RequestStatus::Approved);
        assert_eq!(r.approved_product_id(), Some(listing));
        assert!(r.reviewed_at().is_some());
        assert_eq!(r.take_events().len(), 2);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut r = CatalogRequest::submit(Uuid::now_v7(), None, details("Bag"), "bag", AuditStamp::system());
        r.reject(Uuid::now_v7(), Some("blurry photos".into()), AuditStamp::system()).unwrap();
        assert_eq!(r.rejection_reason(), Some("blurry photos"));
        let id = Uuid::now_v7();
        assert_eq!(r.approve(id, id, id, AuditStamp::system()), Err(RequestError::NotPending(RequestStatus::Rejected)));
        assert_eq!(r.reject(Uuid::now_v7(), None, AuditStamp::system()), Err(RequestError::NotPending(RequestStatus::Rejected)));
        assert_eq!(r.revise(details("Other"), "other", AuditStamp::system()), Err(RequestError::NotPending(RequestStatus::Rejected)));
    }

    #[test]
    fn test_deleted_request_cannot_be_reviewed() {
        let mut r = CatalogRequest::submit(Uuid::now_v7(), Some(Uuid::now_v7()), details("Bag"), "bag", AuditStamp::system());
        r.is_deleted = true;
        assert!(!r.is_new_product_request());
        assert_eq!(r.reject(Uuid::now_v7(), None, AuditStamp::system()), Err(RequestError::Deleted));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Approved".parse::<RequestStatus>().unwrap(), RequestStatus::Approved);
        assert!("archived".parse::<RequestStatus>().is_err());
    }
}
