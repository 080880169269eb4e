//! Value Objects for the catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Actor, origin and time stamped onto a created or modified record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditStamp {
    pub fn now(user_id: Option<Uuid>, ip_address: Option<String>) -> Self {
        Self { user_id, ip_address, at: Utc::now() }
    }
    pub fn system() -> Self { Self::now(None, None) }
}

/// Eight-character code prefixing every listing slug.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingCode(String);

impl ListingCode {
    pub const LEN: usize = 8;

    pub fn new(value: impl Into<String>) -> Result<Self, ListingCodeError> {
        let value = value.into().trim().to_lowercase();
        if value.chars().count() != Self::LEN { return Err(ListingCodeError::Length); }
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) { return Err(ListingCodeError::Charset); }
        Ok(Self(value))
    }
    pub fn random() -> Self { Self(format!("{:08x}", rand::random::<u32>())) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ListingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ListingCodeError { Length, Charset }
impl std::error::Error for ListingCodeError {}
impl fmt::Display for ListingCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length => write!(f, "Listing code must be {} characters", ListingCode::LEN),
            Self::Charset => write!(f, "Listing code must be alphanumeric"),
        }
    }
}

/// Listing slug of the form `code~rest`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CodedSlug { code: ListingCode, rest: String }

impl CodedSlug {
    pub const SEPARATOR: char = '~';

    pub fn new(code: ListingCode, rest: impl Into<String>) -> Self { Self { code, rest: rest.into() } }

    /// Splits `code~rest`; `None` unless the code is well formed and `rest` is non-empty.
    pub fn parse(value: &str) -> Option<Self> {
        let (code, rest) = value.trim().split_once(Self::SEPARATOR)?;
        let code = ListingCode::new(code).ok()?;
        if rest.is_empty() { return None; }
        Some(Self::new(code, rest))
    }

    pub fn code(&self) -> &ListingCode { &self.code }
    pub fn rest(&self) -> &str { &self.rest }
}

impl fmt::Display for CodedSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.code, Self::SEPARATOR, self.rest)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind { #[default] Physical, Digital }

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Physical => "physical", Self::Digital => "digital" }
    }
    pub fn parse(value: &str) -> Option<Self> {
        match value { "physical" => Some(Self::Physical), "digital" => Some(Self::Digital), _ => None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryItem {
    pub path: String,
    pub alt: Option<String>,
    pub position: u32,
}

/// Descriptive fields shared by requests and the listings promoted from them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub short_description: Option<String>,
    pub description: String,
    /// `None` for custom orders, priced on request.
    pub price: Option<i64>,
    pub inventory: i32,
    pub is_custom_order: bool,
    pub item_kind: ItemKind,
    pub download_path: Option<String>,
    pub category_id: Uuid,
    pub image_path: Option<String>,
    pub gallery: Vec<GalleryItem>,
}
