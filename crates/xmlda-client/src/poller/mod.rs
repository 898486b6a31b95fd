//! Pollers that emulate a continuous data feed
//!
//! XML-DA servers never push data. A poller keeps a set of items and runs a
//! background loop that fetches values for them, reporting state changes
//! and value batches to a [`SubscriptionListener`].
//!
//! - [`SubscriptionPoller`] establishes a server subscription and long-polls
//!   it with polled refresh calls.
//! - [`ReadPoller`] periodically reads the items instead, for servers with
//!   broken subscription support.
//!
//! [`SubscriptionListener`]: crate::SubscriptionListener

mod read;
mod subscription;

pub use read::ReadPoller;
pub use subscription::SubscriptionPoller;

pub(crate) use read::read_request;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use xmlda_core::{make_requests, ItemRequest, SubscriptionState};

use crate::translate::{handle_map, HandleMap};

/// Common interface of all pollers
#[async_trait]
pub trait Poller: Send + Sync {
    /// Diagnostic name of the poller
    fn name(&self) -> &str;

    /// Replace the set of items to poll
    fn set_items(&self, items: Vec<ItemRequest>);

    /// Replace the item set, using each name as its own client handle
    fn set_item_names<I, S>(&self, item_names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        Self: Sized,
    {
        self.set_items(make_requests(item_names));
    }

    /// Stop polling and release server resources
    async fn dispose(&self);
}

static POLLER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique diagnostic name: `{kind}/{connection}/{n}`
pub(crate) fn poller_name(kind: &str, connection: &str) -> String {
    let id = POLLER_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{}/{}/{}", kind, connection, id)
}

/// The desired items of a poller
///
/// Every replacement bumps the generation so that replies to requests
/// built from an older item set can be recognised.
#[derive(Debug, Default)]
pub(crate) struct ItemSet {
    items: Arc<Vec<ItemRequest>>,
    handles: Arc<HandleMap>,
    generation: u64,
}

/// Immutable view of an [`ItemSet`] taken under the poller lock
#[derive(Debug, Clone)]
pub(crate) struct ItemSnapshot {
    pub items: Arc<Vec<ItemRequest>>,
    pub handles: Arc<HandleMap>,
    pub generation: u64,
}

impl ItemSet {
    pub fn replace(&mut self, items: Vec<ItemRequest>) {
        self.handles = Arc::new(handle_map(&items));
        self.items = Arc::new(items);
        self.generation += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            items: self.items.clone(),
            handles: self.handles.clone(),
            generation: self.generation,
        }
    }
}

/// Last state reported to the listener
#[derive(Debug, Default)]
pub(crate) struct ReportedState(Option<SubscriptionState>);

impl ReportedState {
    /// Record a state; returns `true` if it differs from the previous one
    pub fn update(&mut self, state: SubscriptionState) -> bool {
        if self.0 == Some(state) {
            return false;
        }
        self.0 = Some(state);
        true
    }

    pub fn get(&self) -> Option<SubscriptionState> {
        self.0
    }
}

/// Sleep for `duration` unless woken earlier
pub(crate) async fn sleep_or_wake(duration: Duration, wakeup: &Notify) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = wakeup.notified() => {}
    }
}
