//! Category

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryScope { #[default] General, Product, Blog, Service }

impl CategoryScope {
    /// Products may only be filed under general or product categories.
    pub fn accepts_products(&self) -> bool { matches!(self, Self::General | Self::Product) }

    pub fn as_str(&self) -> &'static str {
        match self { Self::General => "general", Self::Product => "product", Self::Blog => "blog", Self::Service => "service" }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "general" => Some(Self::General),
            "product" => Some(Self::Product),
            "blog" => Some(Self::Blog),
            "service" => Some(Self::Service),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub scope: CategoryScope,
    pub is_deleted: bool,
}

impl Category {
    pub fn new(name: impl Into<String>, scope: CategoryScope) -> Self {
        Self { id: Uuid::now_v7(), name: name.into(), scope, is_deleted: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_scope_accepts_products() {
        assert!(CategoryScope::General.accepts_products());
        assert!(CategoryScope::Product.accepts_products());
        assert!(!CategoryScope::Blog.accepts_products());
        assert_eq!(CategoryScope::parse(CategoryScope::Service.as_str()), Some(CategoryScope::Service));
    }
}
