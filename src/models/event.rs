use serde::{Deserialize, Serialize};

use crate::models::{EventKind, NotificationKey, ProductSnapshot};

/// A classified, not yet suppressed change that should reach the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub key: NotificationKey,
    pub snapshot: ProductSnapshot,
}

impl ChangeEvent {
    pub fn new(key: NotificationKey, snapshot: ProductSnapshot) -> Self {
        Self {
            kind: key.kind,
            key,
            snapshot,
        }
    }

    pub fn product_id(&self) -> &str {
        &self.snapshot.id
    }
}
