//! Listener contract for poller events

use std::collections::HashMap;
use std::sync::Arc;

use xmlda_core::{ItemValue, SubscriptionState};

use crate::dispatch::EventDispatcher;

/// Receives state changes and value batches from a poller
///
/// Callbacks run on the connection's event dispatcher, one at a time and
/// in the order the poller raised them. They should return quickly: a
/// slow listener delays every other listener of the same connection.
pub trait SubscriptionListener: Send + Sync {
    /// The poller moved to a new state
    fn state_changed(&self, state: SubscriptionState);

    /// New values, keyed by client handle
    fn data_changed(&self, values: HashMap<String, ItemValue>);
}

/// Where a poller sends its events
#[derive(Clone)]
pub(crate) struct EventSink {
    listener: Option<Arc<dyn SubscriptionListener>>,
    dispatcher: EventDispatcher,
}

impl EventSink {
    pub(crate) fn new(
        listener: Option<Arc<dyn SubscriptionListener>>,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            listener,
            dispatcher,
        }
    }

    pub(crate) fn state_changed(&self, state: SubscriptionState) {
        if let Some(listener) = &self.listener {
            let listener = listener.clone();
            self.dispatcher
                .execute(move || listener.state_changed(state));
        }
    }

    pub(crate) fn data_changed(&self, values: HashMap<String, ItemValue>) {
        if values.is_empty() {
            return;
        }
        if let Some(listener) = &self.listener {
            let listener = listener.clone();
            self.dispatcher
                .execute(move || listener.data_changed(values));
        }
    }
}
