use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::EventKind;

/// Identity of one dispatched (or absorbed) notification.
///
/// `tag` separates distinct occurrences of the same kind: the restock episode
/// number for restocks, the sale price for coupon deals, empty for new listings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NotificationKey {
    pub product_id: String,
    pub kind: EventKind,
    #[serde(default)]
    pub tag: String,
}

impl NotificationKey {
    pub fn new(product_id: &str, kind: EventKind, tag: impl Into<String>) -> Self {
        Self {
            product_id: product_id.to_string(),
            kind,
            tag: tag.into(),
        }
    }
}

impl std::fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.tag.is_empty() {
            write!(f, "{}:{}", self.product_id, self.kind)
        } else {
            write!(f, "{}:{}:{}", self.product_id, self.kind, self.tag)
        }
    }
}

/// Decision state carried across poll cycles.
///
/// The seen set and the notified keys only ever grow; the in-stock set mirrors
/// the last observed stock of each product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingState {
    seen_ids: BTreeSet<String>,
    in_stock_ids: BTreeSet<String>,
    restock_episodes: BTreeMap<String, u32>,
    notified_keys: BTreeSet<NotificationKey>,
    alerts_enabled: bool,
}

impl TrackingState {
    pub fn new(alerts_enabled: bool) -> Self {
        Self {
            alerts_enabled,
            ..Self::default()
        }
    }

    /// Rebuild a state from the raw parts a store persisted.
    pub fn from_parts(
        seen_ids: BTreeSet<String>,
        in_stock_ids: BTreeSet<String>,
        restock_episodes: BTreeMap<String, u32>,
        notified_keys: BTreeSet<NotificationKey>,
        alerts_enabled: bool,
    ) -> Self {
        Self {
            seen_ids,
            in_stock_ids,
            restock_episodes,
            notified_keys,
            alerts_enabled,
        }
    }

    pub fn alerts_enabled(&self) -> bool {
        self.alerts_enabled
    }

    pub fn set_alerts_enabled(&mut self, enabled: bool) {
        self.alerts_enabled = enabled;
    }

    /// Returns `true` when the id had not been seen before.
    pub fn mark_seen(&mut self, product_id: &str) -> bool {
        if self.seen_ids.contains(product_id) {
            return false;
        }
        self.seen_ids.insert(product_id.to_string())
    }

    pub fn is_seen(&self, product_id: &str) -> bool {
        self.seen_ids.contains(product_id)
    }

    pub fn is_in_stock(&self, product_id: &str) -> bool {
        self.in_stock_ids.contains(product_id)
    }

    pub fn mark_in_stock(&mut self, product_id: &str) {
        if !self.in_stock_ids.contains(product_id) {
            self.in_stock_ids.insert(product_id.to_string());
        }
    }

    pub fn mark_out_of_stock(&mut self, product_id: &str) -> bool {
        self.in_stock_ids.remove(product_id)
    }

    /// Start a new restock episode for the product and return its number.
    pub fn begin_restock_episode(&mut self, product_id: &str) -> u32 {
        let episode = self
            .restock_episodes
            .entry(product_id.to_string())
            .or_insert(0);
        *episode += 1;
        *episode
    }

    pub fn restock_episode(&self, product_id: &str) -> u32 {
        self.restock_episodes.get(product_id).copied().unwrap_or(0)
    }

    /// Returns `true` when the key was not recorded yet.
    pub fn record_key(&mut self, key: NotificationKey) -> bool {
        self.notified_keys.insert(key)
    }

    pub fn has_key(&self, key: &NotificationKey) -> bool {
        self.notified_keys.contains(key)
    }

    pub fn seen_ids(&self) -> &BTreeSet<String> {
        &self.seen_ids
    }

    pub fn in_stock_ids(&self) -> &BTreeSet<String> {
        &self.in_stock_ids
    }

    pub fn restock_episodes(&self) -> &BTreeMap<String, u32> {
        &self.restock_episodes
    }

    pub fn notified_keys(&self) -> &BTreeSet<NotificationKey> {
        &self.notified_keys
    }

    pub fn tracked_count(&self) -> usize {
        self.seen_ids.len()
    }

    pub fn in_stock_count(&self) -> usize {
        self.in_stock_ids.len()
    }

    pub fn notified_count(&self) -> usize {
        self.notified_keys.len()
    }
}
