//! Aggregates module
pub mod catalog_request;
pub mod category;
pub mod listing;
pub mod offer;

pub use catalog_request::{CatalogRequest, RequestError, RequestStatus};
pub use category::{Category, CategoryScope};
pub use listing::CatalogListing;
pub use offer::ListingOffer;
