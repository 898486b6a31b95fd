//! Subscription state reported to listeners

use std::fmt;

use serde::{Deserialize, Serialize};

/// Observable state of a poller
///
/// ```text
///            setup ok
/// Inactive ───────────▶ Active
///    ▲  ▲                  │ invalid handle / failure / new items
///    │  └──────────────────┘
///    │ items supplied
///    │
/// Waiting ◀── item set empty (from any state)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionState {
    /// No live server subscription
    Inactive,
    /// Idle because there are no items to poll
    Waiting,
    /// Subscription established, refresh polling in progress
    Active,
}

impl SubscriptionState {
    /// Returns `true` if values are currently being polled
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "INACTIVE"),
            Self::Waiting => write!(f, "WAITING"),
            Self::Active => write!(f, "ACTIVE"),
        }
    }
}
