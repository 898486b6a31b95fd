//! Read based poller for servers without usable subscriptions

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use xmlda_core::{
    make_requests, ItemRequest, ReadRequest, ReadRequestItem, RequestOptions, SubscriptionState,
    XmlDaService,
};

use super::{poller_name, sleep_or_wake, ItemSet, Poller, ReportedState};
use crate::config::as_millis_u32;
use crate::connection::Connection;
use crate::listener::{EventSink, SubscriptionListener};
use crate::translate;

/// Poller that reads all items every `period`
pub struct ReadPoller {
    shared: Arc<ReadShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct ReadShared {
    name: String,
    service: Arc<dyn XmlDaService>,
    events: EventSink,
    period: Duration,
    max_age: Option<Duration>,
    running: AtomicBool,
    wakeup: Notify,
    state: Mutex<ReadState>,
}

#[derive(Default)]
struct ReadState {
    items: ItemSet,
    reported: ReportedState,
}

/// Build a read request for a set of items
pub(crate) fn read_request(items: &[ItemRequest], max_age: Option<Duration>) -> ReadRequest {
    let max_age = max_age.map(as_millis_u32);
    ReadRequest {
        options: RequestOptions::detailed(),
        items: items
            .iter()
            .map(|item| ReadRequestItem {
                item_name: item.item_name.clone(),
                client_item_handle: item.client_handle.clone(),
                max_age,
            })
            .collect(),
    }
}

impl ReadPoller {
    /// Create a read poller on a connection and start its loop
    pub fn new(
        connection: &Connection,
        listener: Option<Arc<dyn SubscriptionListener>>,
        period: Duration,
        max_age: Option<Duration>,
    ) -> Self {
        let shared = ReadShared {
            name: poller_name("ReadPoller", connection.name()),
            service: connection.service(),
            events: EventSink::new(listener, connection.dispatcher()),
            period,
            max_age,
            running: AtomicBool::new(true),
            wakeup: Notify::new(),
            state: Mutex::new(ReadState::default()),
        };
        let shared = Arc::new(shared);

        let span = info_span!("poller", name = %shared.name);
        let task = tokio::spawn(shared.clone().run().instrument(span));

        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn period(&self) -> Duration {
        self.shared.period
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// The state most recently reported to the listener
    pub fn state(&self) -> Option<SubscriptionState> {
        self.shared.state.lock().reported.get()
    }

    /// Replace the set of items to read
    pub fn set_items(&self, items: Vec<ItemRequest>) {
        self.shared.state.lock().items.replace(items);
        self.shared.wakeup.notify_waiters();
    }

    pub fn set_item_names<I, S>(&self, item_names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_items(make_requests(item_names));
    }

    /// Stop the loop; a read in flight is discarded
    pub async fn dispose(&self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            info!(poller = %self.shared.name, "Disposing");
        }
        self.shared.wakeup.notify_waiters();
    }
}

#[async_trait]
impl Poller for ReadPoller {
    fn name(&self) -> &str {
        ReadPoller::name(self)
    }

    fn set_items(&self, items: Vec<ItemRequest>) {
        ReadPoller::set_items(self, items);
    }

    async fn dispose(&self) {
        ReadPoller::dispose(self).await;
    }
}

impl Drop for ReadPoller {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl ReadShared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn report(&self, state: &mut ReadState, new_state: SubscriptionState) {
        if self.is_running() && state.reported.update(new_state) {
            self.events.state_changed(new_state);
        }
    }

    async fn run(self: Arc<Self>) {
        info!("Starting read poller");
        {
            let mut state = self.state.lock();
            self.report(&mut state, SubscriptionState::Inactive);
        }

        while self.is_running() {
            let notified = self.wakeup.notified();
            let snapshot = {
                let mut state = self.state.lock();
                if state.items.is_empty() {
                    self.report(&mut state, SubscriptionState::Waiting);
                    None
                } else {
                    Some(state.items.snapshot())
                }
            };

            let Some(snapshot) = snapshot else {
                notified.await;
                continue;
            };
            drop(notified);

            debug!(count = snapshot.items.len(), "Reading items");
            let request = read_request(&snapshot.items, self.max_age);
            let result = self.service.read(request).await;

            {
                let mut state = self.state.lock();
                match result {
                    Ok(reply) => {
                        if self.is_running() && state.items.generation() == snapshot.generation {
                            self.report(&mut state, SubscriptionState::Active);
                            self.events
                                .data_changed(translate::read_values(&reply, &snapshot.handles));
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read");
                        self.report(&mut state, SubscriptionState::Inactive);
                    }
                }
            }

            sleep_or_wake(self.period, &self.wakeup).await;
        }

        info!("Exit read loop");
    }
}
