use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One size/colour option of a product with its own stock count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Variant {
    pub id: String,
    pub label: Option<String>,
    pub stock: u64,
}

/// Canonical, per-poll view of one catalog product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSnapshot {
    pub id: String,
    pub name: String,
    pub url: String,
    /// `None` means the feed did not expose a usable price.
    pub price: Option<Decimal>,
    pub list_price: Option<Decimal>,
    pub variants: Vec<Variant>,
    pub product_stock: Option<u64>,
}

impl ProductSnapshot {
    pub const DEFAULT_NAME: &'static str = "Unnamed product";

    /// Effective stock signal: the larger of the product-level count and the
    /// sum over variants.
    pub fn aggregate_stock(&self) -> u64 {
        let variant_total: u64 = self
            .variants
            .iter()
            .fold(0u64, |acc, v| acc.saturating_add(v.stock));
        self.product_stock.unwrap_or(0).max(variant_total)
    }

    pub fn is_in_stock(&self) -> bool {
        self.aggregate_stock() > 0
    }

    /// Labels of the variants that currently have stock.
    pub fn in_stock_variant_labels(&self) -> Vec<&str> {
        self.variants
            .iter()
            .filter(|v| v.stock > 0)
            .map(|v| v.label.as_deref().unwrap_or(v.id.as_str()))
            .collect()
    }

    pub fn is_discounted(&self) -> bool {
        matches!((self.price, self.list_price), (Some(price), Some(list)) if price < list)
    }
}
