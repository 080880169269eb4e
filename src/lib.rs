//! OpenSASE Catalog
//!
//! Seller catalog requests and their admin review workflow for a
//! self-hosted marketplace.
//!
//! ## Features
//! - Collision-free slug allocation for requests, listings and offers
//! - Seller submissions for new products or offers on existing products
//! - Admin approval and rejection with promotion into live records
//! - Direct listing management for administrators
//! - Domain events published over NATS

pub mod application;
pub mod config;
pub mod domain;
pub mod http;
pub mod infrastructure;

use thiserror::Error;

pub use application::{
    CommandResult, FailureKind, ListingCatalog, RequestLifecycle,
};
pub use domain::slug::{SlugAllocator, SlugProbe, TokenSource};

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the storage collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Slug already in use: {0}")]
    SlugConflict(String),

    #[error("Seller already holds an offer on this product")]
    DuplicateOffer,

    #[error("Request {0} is no longer pending")]
    NotPending(uuid::Uuid),

    #[error("Record not found: {0}")]
    Missing(uuid::Uuid),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl CatalogError {
    /// The business failure class, or `None` for faults the caller must handle.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Validation(_) => Some(FailureKind::Validation),
            Self::Conflict(_) => Some(FailureKind::Conflict),
            Self::NotFound(_) => Some(FailureKind::NotFound),
            Self::Cancelled | Self::Storage(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
