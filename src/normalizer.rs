//! Maps raw catalog records onto [`ProductSnapshot`].
//!
//! Feeds disagree on field names: the same price shows up as `salePrice`,
//! `offerPrice` or `price`, and stock may sit on the product or on each size.
//! Every lookup walks an ordered list of synonyms and the first usable value
//! wins. Nothing here performs I/O.

use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::LazyLock;
use url::Url;

use crate::models::{ProductSnapshot, Variant};
use crate::utils::error::SkipReason;

const ID_KEYS: &[&str] = &["goods_id", "id", "productId", "code"];
const NAME_KEYS: &[&str] = &["goods_name", "name", "title"];
const PATH_KEYS: &[&str] = &["url", "pdpUrl", "goods_url", "link"];
const SN_KEYS: &[&str] = &["goods_sn", "sku"];
pub const PRICE_KEYS: &[&str] = &["salePrice", "sale_price", "offerPrice", "price", "special_price"];
pub const LIST_PRICE_KEYS: &[&str] = &[
    "retailPrice",
    "retail_price",
    "mrp",
    "wasPriceData",
    "list_price",
    "listPrice",
    "original_price",
];
const AMOUNT_KEYS: &[&str] = &["amount", "value", "price"];
const VARIANT_LIST_KEYS: &[&str] = &["sku_list", "variants", "sizes", "skus"];
const VARIANT_ID_KEYS: &[&str] = &["sku_code", "id", "code", "size"];
const VARIANT_LABEL_KEYS: &[&str] = &["size", "attr_value_name", "name"];
const STOCK_KEYS: &[&str] = &["stock", "quantity", "inventory", "stockLevel"];
const IN_STOCK_FLAG_KEYS: &[&str] = &["in_stock", "inStock"];

static AMOUNT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("amount regex is valid"));

#[derive(Debug, Clone)]
pub struct Normalizer {
    origin: String,
}

impl Normalizer {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn normalize(&self, raw: &Value) -> Result<ProductSnapshot, SkipReason> {
        let record = raw.as_object().ok_or(SkipReason::NotAnObject)?;
        let id = first_present(record, ID_KEYS)
            .and_then(identifier)
            .ok_or(SkipReason::MissingId)?;

        let name = first_present(record, NAME_KEYS)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(ProductSnapshot::DEFAULT_NAME)
            .to_string();

        let url = self.product_url(record, &id);
        let variants = variants(record);
        let product_stock = first_present(record, STOCK_KEYS).and_then(stock_count);

        Ok(ProductSnapshot {
            id,
            name,
            url,
            price: resolve_price(record, PRICE_KEYS),
            list_price: resolve_price(record, LIST_PRICE_KEYS),
            variants,
            product_stock,
        })
    }

    /// Absolute link for a record: explicit absolute URL, else the record path
    /// joined onto the origin, else the `<sn>-p-<id>.html` product page.
    fn product_url(&self, record: &Map<String, Value>, id: &str) -> String {
        let path = first_present(record, PATH_KEYS)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty());

        match path {
            Some(path) => self.absolute_url(path),
            None => match first_present(record, SN_KEYS).and_then(identifier) {
                Some(sn) => format!("{}/{}-p-{}.html", self.origin, sn, id),
                None => format!("{}/p-{}.html", self.origin, id),
            },
        }
    }

    pub fn absolute_url(&self, path: &str) -> String {
        if let Ok(url) = Url::parse(path) {
            if matches!(url.scheme(), "http" | "https") {
                return url.to_string();
            }
        }
        if let Some(rest) = path.strip_prefix("//") {
            return format!("https://{}", rest);
        }
        format!("{}/{}", self.origin, path.trim_start_matches('/'))
    }
}

fn first_present<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find(|value| !value.is_null())
}

fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(
            n.as_u64()
                .map(|v| v.to_string())
                .or_else(|| n.as_i64().map(|v| v.to_string()))
                .unwrap_or_else(|| n.to_string()),
        ),
        _ => None,
    }
}

/// First synonym whose value parses as a price. Unparseable values are
/// treated as absent so a later synonym can still resolve.
pub fn resolve_price(record: &Map<String, Value>, keys: &[&str]) -> Option<Decimal> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find_map(parse_price)
}

pub fn parse_price(value: &Value) -> Option<Decimal> {
    let price = match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => parse_price_text(s),
        Value::Object(obj) => AMOUNT_KEYS
            .iter()
            .filter_map(|key| obj.get(*key))
            .find_map(|inner| match inner {
                Value::Object(_) => None,
                other => parse_price(other),
            }),
        _ => None,
    }?;

    (price >= Decimal::ZERO).then_some(price)
}

/// Parse a display price such as `"₹1,299.00"` or `"Rs. 799"`. A leading
/// minus is kept so [`parse_price`] rejects it like a negative number.
pub fn parse_price_text(text: &str) -> Option<Decimal> {
    let captures = AMOUNT_REGEX.find(text)?;
    let digits = captures.as_str().replace(',', "");
    Decimal::from_str(&digits).ok()
}

fn stock_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|v| v.max(0) as u64))
            .or_else(|| n.as_f64().map(|v| if v > 0.0 { v.floor() as u64 } else { 0 })),
        Value::String(s) => s.trim().parse::<i64>().ok().map(|v| v.max(0) as u64),
        Value::Bool(flag) => Some(u64::from(*flag)),
        _ => None,
    }
}

fn variants(record: &Map<String, Value>) -> Vec<Variant> {
    let Some(list) = first_present(record, VARIANT_LIST_KEYS).and_then(Value::as_array) else {
        return Vec::new();
    };

    list.iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let entry = entry.as_object()?;
            let id = first_present(entry, VARIANT_ID_KEYS)
                .and_then(identifier)
                .unwrap_or_else(|| index.to_string());
            let label = first_present(entry, VARIANT_LABEL_KEYS)
                .and_then(Value::as_str)
                .map(|label| label.trim().to_string())
                .filter(|label| !label.is_empty());
            let stock = first_present(entry, STOCK_KEYS)
                .or_else(|| first_present(entry, IN_STOCK_FLAG_KEYS))
                .and_then(stock_count)
                .unwrap_or(0);
            Some(Variant { id, label, stock })
        })
        .collect()
}
