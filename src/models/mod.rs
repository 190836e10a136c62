use serde::{Deserialize, Serialize};

pub mod event;
pub mod snapshot;
pub mod tracking_state;

// Re-exports for convenience
pub use event::*;
pub use snapshot::*;
pub use tracking_state::*;

/// What the detector decided about a product in one cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Unseen,
    RestockedSinceOutOfStock,
    CouponQualifying,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Unseen => "unseen",
            EventKind::RestockedSinceOutOfStock => "restocked_since_out_of_stock",
            EventKind::CouponQualifying => "coupon_qualifying",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
