//! The inventory-change state machine.
//!
//! Per product id the lifecycle is `Unknown -> Seen { OutOfStock | InStock }`.
//! `Seen` never returns to `Unknown`; the only cycle is between the two stock
//! states, and every `OutOfStock -> InStock` edge opens a new restock episode.
//!
//! Each snapshot is classified in a fixed order (new listing, stock edge,
//! coupon) and every classification maps to a [`NotificationKey`]. A key is
//! emitted at most once. While alerts are disabled the bookkeeping still runs
//! and keys are recorded as absorbed, so turning alerts back on never replays
//! a backlog.

use crate::config::DetectorConfig;
use crate::models::{ChangeEvent, EventKind, NotificationKey, ProductSnapshot, TrackingState};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Detection {
    /// Events to hand to the dispatcher, in feed order.
    pub events: Vec<ChangeEvent>,
    /// Keys recorded without dispatch because alerts were disabled.
    pub absorbed: usize,
    /// Classifications whose key had already been recorded.
    pub suppressed: usize,
}

impl Detection {
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    config: DetectorConfig,
}

impl ChangeDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, state: &mut TrackingState, snapshots: &[ProductSnapshot]) -> Detection {
        let alerts_enabled = state.alerts_enabled();
        let mut detection = Detection::default();

        for snapshot in snapshots {
            for key in self.classify(state, snapshot) {
                if !state.record_key(key.clone()) {
                    detection.suppressed += 1;
                    continue;
                }

                if alerts_enabled {
                    tracing::debug!(product_id = %snapshot.id, kind = %key.kind, "Change detected");
                    detection.events.push(ChangeEvent::new(key, snapshot.clone()));
                } else {
                    tracing::trace!(product_id = %snapshot.id, kind = %key.kind, "Change absorbed while alerts are off");
                    detection.absorbed += 1;
                }
            }
        }

        detection
    }

    /// Update the state for one snapshot and return the keys it qualifies for.
    ///
    /// A new listing keys on the id alone. A restock keys on the episode, so
    /// each out-of-stock to in-stock edge alerts once. A coupon keys on the
    /// sale price: the same deal alerts once, and a further price change
    /// counts as a new deal.
    fn classify(&self, state: &mut TrackingState, snapshot: &ProductSnapshot) -> Vec<NotificationKey> {
        let id = snapshot.id.as_str();
        let mut keys = Vec::new();

        if state.mark_seen(id) && self.config.notify_new_listings {
            keys.push(NotificationKey::new(id, EventKind::Unseen, ""));
        }

        let was_in_stock = state.is_in_stock(id);
        let is_in_stock = snapshot.is_in_stock();

        if is_in_stock && !was_in_stock {
            let episode = state.begin_restock_episode(id);
            keys.push(NotificationKey::new(
                id,
                EventKind::RestockedSinceOutOfStock,
                episode.to_string(),
            ));
        }

        if is_in_stock {
            state.mark_in_stock(id);
        } else if was_in_stock {
            state.mark_out_of_stock(id);
        }

        if self.config.coupon_alerts && snapshot.is_discounted() {
            if let Some(price) = snapshot.price {
                keys.push(NotificationKey::new(
                    id,
                    EventKind::CouponQualifying,
                    price.normalize().to_string(),
                ));
            }
        }

        keys
    }
}
