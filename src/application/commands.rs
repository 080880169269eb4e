//! Command payloads and their validation rules

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::domain::aggregates::CatalogListing;
use crate::domain::value_objects::{GalleryItem, ItemKind, ProductDetails};

pub const MAX_PATH_LEN: usize = 600;

/// Product fields entered by a seller or an administrator.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_terms"))]
pub struct ListingDraft {
    #[validate(custom = "not_blank")]
    pub name: String,
    #[validate(length(max = 500, message = "Short description is too long"))]
    pub short_description: Option<String>,
    #[validate(custom = "not_blank")]
    pub description: String,
    pub price: Option<i64>,
    pub inventory: Option<i32>,
    #[serde(default)]
    pub is_custom_order: bool,
    #[serde(default)]
    pub item_kind: ItemKind,
    #[validate(length(max = 600, message = "Download path is too long"))]
    pub download_path: Option<String>,
    pub category_id: Option<Uuid>,
    #[validate(length(max = 600, message = "Image path is too long"))]
    pub image_path: Option<String>,
    #[serde(default)]
    #[validate(custom = "gallery_paths")]
    pub gallery: Vec<GalleryItem>,
    /// Explicit slug; the name is used when absent.
    pub seo_slug: Option<String>,
}

impl ListingDraft {
    /// Fills blank descriptive fields from the listing an offer targets and
    /// pins the category to the listing's.
    pub fn inherit_from(&mut self, listing: &CatalogListing) {
        if self.name.trim().is_empty() {
            self.name = listing.details.name.clone();
        }
        if self.description.trim().is_empty() {
            self.description = listing.details.description.clone();
        }
        self.category_id = Some(listing.details.category_id);
    }

    /// Candidate text for slug allocation.
    pub fn slug_source(&self) -> &str {
        self.seo_slug.as_deref().map(str::trim).filter(|s| !s.is_empty()).unwrap_or(self.name.as_str())
    }

    pub fn into_details(self, category_id: Uuid) -> ProductDetails {
        ProductDetails {
            name: self.name.trim().to_string(),
            short_description: trimmed(self.short_description),
            description: self.description.trim().to_string(),
            price: if self.is_custom_order { None } else { self.price },
            inventory: self.inventory.unwrap_or(0),
            is_custom_order: self.is_custom_order,
            item_kind: self.item_kind,
            download_path: trimmed(self.download_path),
            category_id,
            image_path: trimmed(self.image_path),
            gallery: self.gallery,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmitCatalogRequest {
    /// Set for an offer on an existing listing.
    pub target_product_id: Option<Uuid>,
    #[serde(flatten)]
    pub draft: ListingDraft,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApproveCatalogRequest {
    #[serde(default)]
    pub publish: bool,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct RejectCatalogRequest {
    #[validate(length(max = 1000, message = "Rejection reason is too long"))]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SaveListing {
    #[serde(flatten)]
    pub draft: ListingDraft,
    /// Rebuild the slug from the name, keeping the listing code.
    #[serde(default)]
    pub regenerate_slug: bool,
    #[serde(default)]
    pub publish: bool,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_offer"))]
pub struct AddOffer {
    pub product_id: Uuid,
    pub price: i64,
    pub inventory: i32,
    #[serde(default)]
    pub publish: bool,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn failure(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(failure("blank", "Name and description are required"));
    }
    Ok(())
}

fn gallery_paths(gallery: &[GalleryItem]) -> Result<(), ValidationError> {
    if gallery.iter().any(|item| item.path.trim().is_empty() || item.path.chars().count() > MAX_PATH_LEN) {
        return Err(failure("gallery_path", "Gallery image paths must be 1 to 600 characters"));
    }
    Ok(())
}

fn validate_terms(draft: &ListingDraft) -> Result<(), ValidationError> {
    if draft.price.is_some_and(|price| price < 0) {
        return Err(failure("price", "Price cannot be negative"));
    }
    if draft.inventory.is_some_and(|inventory| inventory < 0) {
        return Err(failure("inventory", "Inventory cannot be negative"));
    }
    if draft.is_custom_order && draft.price.is_some() {
        return Err(failure("custom_order_price", "Custom orders cannot have a price"));
    }
    if !draft.is_custom_order && draft.price.is_none() {
        return Err(failure("price_required", "Price is required"));
    }
    if draft.item_kind == ItemKind::Digital
        && draft.download_path.as_deref().map_or(true, |path| path.trim().is_empty())
    {
        return Err(failure("download_path", "Digital items require a download path"));
    }
    Ok(())
}

fn validate_offer(offer: &AddOffer) -> Result<(), ValidationError> {
    if offer.price < 0 {
        return Err(failure("price", "Price cannot be negative"));
    }
    if offer.inventory < 0 {
        return Err(failure("inventory", "Inventory cannot be negative"));
    }
    Ok(())
}

/// The first message of `errors`, by field name so the choice is stable.
pub fn first_message(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by_key(|(field, _)| *field);
    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .next()
        .unwrap_or_else(|| "Invalid input".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ListingDraft {
        ListingDraft {
            name: "دوره آموزشی".into(),
            description: "ده جلسه".into(),
            price: Some(100_000),
            category_id: Some(Uuid::now_v7()),
            ..Default::default()
        }
    }

    fn message(d: &ListingDraft) -> String {
        first_message(&d.validate().unwrap_err())
    }

    #[test]
    fn test_valid_draft() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn test_blank_name() {
        let d = ListingDraft { name: "   ".into(), ..draft() };
        assert_eq!(message(&d), "Name and description are required");
    }

    #[test]
    fn test_negative_price() {
        let d = ListingDraft { price: Some(-1), ..draft() };
        assert_eq!(message(&d), "Price cannot be negative");
    }

    #[test]
    fn test_custom_order_pricing() {
        let d = ListingDraft { is_custom_order: true, ..draft() };
        assert_eq!(message(&d), "Custom orders cannot have a price");
        let d = ListingDraft { is_custom_order: true, price: None, ..draft() };
        assert!(d.validate().is_ok());
        let d = ListingDraft { price: None, ..draft() };
        assert_eq!(message(&d), "Price is required");
    }

    #[test]
    fn test_digital_requires_download_path() {
        let d = ListingDraft { item_kind: ItemKind::Digital, ..draft() };
        assert_eq!(message(&d), "Digital items require a download path");
        let d = ListingDraft { item_kind: ItemKind::Digital, download_path: Some("files/a.zip".into()), ..draft() };
        assert!(d.validate().is_ok());
        let d = ListingDraft { item_kind: ItemKind::Digital, download_path: Some("x".repeat(601)), ..draft() };
        assert_eq!(message(&d), "Download path is too long");
    }

    #[test]
    fn test_image_paths() {
        let d = ListingDraft { image_path: Some("x".repeat(601)), ..draft() };
        assert_eq!(message(&d), "Image path is too long");
        let d = ListingDraft { gallery: vec![GalleryItem { path: "x".repeat(601), alt: None, position: 0 }], ..draft() };
        assert_eq!(message(&d), "Gallery image paths must be 1 to 600 characters");
    }

    #[test]
    fn test_slug_source_prefers_explicit_slug() {
        assert_eq!(draft().slug_source(), "دوره آموزشی");
        let d = ListingDraft { seo_slug: Some(" my-course ".into()), ..draft() };
        assert_eq!(d.slug_source(), "my-course");
    }

    #[test]
    fn test_submit_payload_flattens_draft() {
        let json = serde_json::json!({
            "target_product_id": null,
            "name": "Bag",
            "description": "Leather",
            "price": 5000,
            "item_kind": "digital",
            "download_path": "bag.pdf"
        });
        let payload: SubmitCatalogRequest = serde_json::from_value(json).unwrap();
        assert_eq!(payload.draft.item_kind, ItemKind::Digital);
        assert!(payload.draft.validate().is_ok());
    }
}
