//! Subscription based poller
//!
//! Keeps one server subscription for the current item set and long-polls it:
//!
//! ```text
//! ┌──────────────────────── poll loop ────────────────────────┐
//! │  no handle ──▶ subscribe ──▶ handle ──▶ polled refresh ─┐ │
//! │      ▲                                                  │ │
//! │      └──── invalid handle / failure / new items ────────┘ │
//! │                                                           │
//! │  item set empty ──▶ WAITING, park until set_items/dispose │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The item set, the subscription handle and the last reported state live
//! behind one mutex that is never held across a remote call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use xmlda_core::{
    make_requests, ItemRequest, PolledRefreshRequest, RequestOptions, ServiceError,
    ServiceResult, SubscribeRequest, SubscribeRequestItem, SubscriptionCancel,
    SubscriptionState, XmlDaService,
};

use super::{poller_name, sleep_or_wake, ItemSet, Poller, ReportedState};
use crate::config::{as_millis_u32, SubscriptionSettings};
use crate::connection::Connection;
use crate::listener::{EventSink, SubscriptionListener};
use crate::translate;

/// Poller that emulates a data feed with a long-polled server subscription
///
/// The background loop starts on construction and runs until
/// [`dispose`](Self::dispose) is called or the poller is dropped. Failed
/// calls never end the loop: the subscription is invalidated, `INACTIVE`
/// is reported and the subscription is set up again.
pub struct SubscriptionPoller {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    name: String,
    service: Arc<dyn XmlDaService>,
    events: EventSink,
    settings: SubscriptionSettings,
    running: AtomicBool,
    wakeup: Notify,
    state: Mutex<PollerState>,
}

#[derive(Default)]
struct PollerState {
    items: ItemSet,
    /// Present iff a server subscription is believed to be alive
    subscription: Option<ActiveSubscription>,
    reported: ReportedState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveSubscription {
    handle: String,
    /// Item set generation the subscription was created for
    generation: u64,
}

impl SubscriptionPoller {
    /// Create a poller on a connection and start its loop
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        connection: &Connection,
        listener: Option<Arc<dyn SubscriptionListener>>,
        settings: SubscriptionSettings,
    ) -> Self {
        let shared = Shared {
            name: poller_name("Poller", connection.name()),
            service: connection.service(),
            events: EventSink::new(listener, connection.dispatcher()),
            settings,
            running: AtomicBool::new(false),
            wakeup: Notify::new(),
            state: Mutex::new(PollerState::default()),
        };

        let poller = Self {
            shared: Arc::new(shared),
            task: Mutex::new(None),
        };
        poller.start();
        poller
    }

    /// Start the poll loop; does nothing if it was started before
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        self.shared.running.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let span = info_span!("poller", name = %self.shared.name);
        *task = Some(tokio::spawn(shared.run().instrument(span)));
    }

    /// Diagnostic name of the poller
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn settings(&self) -> &SubscriptionSettings {
        &self.shared.settings
    }

    /// Returns `true` until the poller is disposed
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// The state most recently reported to the listener
    pub fn state(&self) -> Option<SubscriptionState> {
        self.shared.state.lock().reported.get()
    }

    /// Replace the set of items to poll
    ///
    /// The current subscription is dropped and a new one is set up for the
    /// new items on the next loop iteration. An empty set parks the loop.
    pub fn set_items(&self, items: Vec<ItemRequest>) {
        {
            let mut state = self.shared.state.lock();
            state.subscription = None;
            self.shared.report(&mut state, SubscriptionState::Inactive);
            state.items.replace(items);
        }

        debug!(poller = %self.shared.name, "Item set replaced");
        self.shared.wakeup.notify_waiters();
    }

    /// Replace the item set, using each name as its own client handle
    pub fn set_item_names<I, S>(&self, item_names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_items(make_requests(item_names));
    }

    /// Stop the loop and cancel the subscription at the server
    ///
    /// An in-flight refresh is not aborted; its reply is discarded when it
    /// arrives. Failing to cancel at the server is logged, not returned.
    pub async fn dispose(&self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            info!(poller = %self.shared.name, "Disposing");
        }
        self.shared.wakeup.notify_waiters();

        let subscription = self.shared.state.lock().subscription.take();
        if let Some(subscription) = subscription {
            info!(poller = %self.shared.name, "Disposing at server...");
            cancel_at_server(self.shared.service.as_ref(), subscription.handle).await;
            info!(poller = %self.shared.name, "Disposing at server...done!");
        }
    }
}

#[async_trait]
impl Poller for SubscriptionPoller {
    fn name(&self) -> &str {
        SubscriptionPoller::name(self)
    }

    fn set_items(&self, items: Vec<ItemRequest>) {
        SubscriptionPoller::set_items(self, items);
    }

    async fn dispose(&self) {
        SubscriptionPoller::dispose(self).await;
    }
}

impl Drop for SubscriptionPoller {
    fn drop(&mut self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.wakeup.notify_waiters();

        let subscription = self.shared.state.lock().subscription.take();
        if let Some(subscription) = subscription {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let service = self.shared.service.clone();
                runtime.spawn(async move {
                    cancel_at_server(service.as_ref(), subscription.handle).await;
                });
            }
        }
    }
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Report a state change; repeats and post-dispose states are dropped
    fn report(&self, state: &mut PollerState, new_state: SubscriptionState) {
        if self.is_running() && state.reported.update(new_state) {
            self.events.state_changed(new_state);
        }
    }

    fn has_subscription(&self) -> bool {
        self.state.lock().subscription.is_some()
    }

    async fn run(self: Arc<Self>) {
        info!("Starting poller");
        {
            let mut state = self.state.lock();
            self.report(&mut state, SubscriptionState::Inactive);
        }

        while self.is_running() {
            if let Err(e) = self.step().await {
                warn!(error = %e, "Failed to poll");
                self.invalidate();
                self.pause_after_failure().await;
            }
            self.wait_for_items().await;
        }

        info!("Exit poll loop");
    }

    async fn step(&self) -> ServiceResult<()> {
        if !self.has_subscription() {
            info!("Performing setup");
            self.setup().await?;
        }
        if self.has_subscription() {
            debug!("Performing poll");
            self.poll_once().await?;
        }
        Ok(())
    }

    /// Subscribe to the current item set
    ///
    /// Does nothing for an empty item set.
    async fn setup(&self) -> ServiceResult<()> {
        let snapshot = {
            let state = self.state.lock();
            if state.items.is_empty() {
                debug!("No items registered. Skipping ...");
                return Ok(());
            }
            state.items.snapshot()
        };

        let request = self.subscribe_request(&snapshot.items);
        let reply = self.service.subscribe(request).await?;

        let handle = reply.server_sub_handle.clone().ok_or_else(|| {
            ServiceError::MalformedReply("subscribe reply has no server handle".to_string())
        })?;
        let values = translate::subscribe_values(&reply, &snapshot.handles);

        let installed = {
            let mut state = self.state.lock();
            if self.is_running() && state.items.generation() == snapshot.generation {
                self.events.data_changed(values);
                state.subscription = Some(ActiveSubscription {
                    handle: handle.clone(),
                    generation: snapshot.generation,
                });
                self.report(&mut state, SubscriptionState::Active);
                true
            } else {
                false
            }
        };

        if installed {
            info!(subscription = %handle, "Setup complete");
        } else {
            debug!(subscription = %handle, "Items changed during setup, dropping subscription");
            cancel_at_server(self.service.as_ref(), handle).await;
        }
        Ok(())
    }

    fn subscribe_request(&self, items: &[ItemRequest]) -> SubscribeRequest {
        let sampling_rate = self.settings.sampling_rate.map(as_millis_u32);

        SubscribeRequest {
            options: RequestOptions::detailed(),
            items: items
                .iter()
                .map(|item| SubscribeRequestItem {
                    item_name: item.item_name.clone(),
                    client_item_handle: item.client_handle.clone(),
                    enable_buffering: self.settings.enable_buffering,
                    requested_sampling_rate: sampling_rate,
                })
                .collect(),
            return_values_on_reply: true,
            subscription_ping_rate: as_millis_u32(self.settings.ping_rate()),
        }
    }

    /// One long-poll refresh of the current subscription
    async fn poll_once(&self) -> ServiceResult<()> {
        let (subscription, handles) = {
            let state = self.state.lock();
            match &state.subscription {
                Some(subscription) => (subscription.clone(), state.items.snapshot().handles),
                None => return Ok(()),
            }
        };

        let request = PolledRefreshRequest {
            options: RequestOptions::detailed(),
            server_sub_handles: vec![subscription.handle.clone()],
            wait_time: as_millis_u32(self.settings.wait_time),
            return_all_items: false,
        };

        debug!("Enter poll");
        let reply = self.service.subscription_polled_refresh(request).await?;
        debug!("Poll returned");

        let invalid = reply
            .invalid_server_sub_handles
            .iter()
            .any(|h| *h == subscription.handle);
        let values = if invalid {
            Default::default()
        } else {
            translate::refresh_values(&reply, &handles)
        };

        let mut state = self.state.lock();
        if state.subscription.as_ref() != Some(&subscription) {
            // cancelled from outside while the call was in flight
            debug!("Subscription is gone, discarding refresh reply");
            return Ok(());
        }

        if invalid {
            info!(subscription = %subscription.handle, "Invalidating");
            state.subscription = None;
            self.report(&mut state, SubscriptionState::Inactive);
        } else {
            self.events.data_changed(values);
        }
        Ok(())
    }

    fn invalidate(&self) {
        let mut state = self.state.lock();
        if let Some(subscription) = state.subscription.take() {
            info!(subscription = %subscription.handle, "Invalidating");
        }
        self.report(&mut state, SubscriptionState::Inactive);
    }

    async fn pause_after_failure(&self) {
        let delay = self.settings.retry_delay;
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            sleep_or_wake(delay, &self.wakeup).await;
        }
    }

    /// Park the loop while there is nothing to poll
    async fn wait_for_items(&self) {
        // registered before the check so a concurrent set_items is not missed
        let notified = self.wakeup.notified();
        {
            let mut state = self.state.lock();
            if !self.is_running() || !state.items.is_empty() {
                return;
            }
            info!("Waiting for items");
            self.report(&mut state, SubscriptionState::Waiting);
        }
        notified.await;
    }
}

async fn cancel_at_server(service: &dyn XmlDaService, handle: String) {
    let request = SubscriptionCancel {
        server_sub_handle: handle.clone(),
    };
    if let Err(e) = service.subscription_cancel(request).await {
        warn!(subscription = %handle, error = %e, "Failed to dispose at server");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use xmlda_core::{PolledRefreshReply, RawItemValue, SubscribeReply};

    use crate::config::ConnectionConfig;
    use crate::testing::{wait_for, MockService, RecordingListener};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn connection(service: &Arc<MockService>) -> Connection {
        Connection::new(ConnectionConfig::new("http://localhost:8080/opc"), service.clone())
            .unwrap()
    }

    fn settings() -> SubscriptionSettings {
        SubscriptionSettings::new(Duration::from_millis(1000), Some(Duration::from_millis(100)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_skips_empty_item_set() {
        let service = Arc::new(MockService::new());
        let connection = connection(&service);
        let poller = SubscriptionPoller::new(&connection, None, settings());

        poller.shared.setup().await.unwrap();
        assert!(wait_for(|| poller.state() == Some(SubscriptionState::Waiting), TIMEOUT).await);

        assert_eq!(service.subscribe_count(), 0);
        assert!(!poller.shared.has_subscription());
        poller.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_request_contents() {
        let service = Arc::new(MockService::new());
        let connection = connection(&service);
        let poller = SubscriptionPoller::new(&connection, None, settings());

        poller.set_items(vec![ItemRequest::new("h1", "Temp.Value")]);
        assert!(wait_for(|| service.subscribe_count() == 1, TIMEOUT).await);

        let request = &service.subscribe_requests()[0];
        assert_eq!(request.options, RequestOptions::detailed());
        assert_eq!(request.subscription_ping_rate, 4000);
        assert!(request.return_values_on_reply);
        assert_eq!(
            request.items,
            vec![SubscribeRequestItem {
                item_name: "Temp.Value".to_string(),
                client_item_handle: "h1".to_string(),
                enable_buffering: true,
                requested_sampling_rate: Some(100),
            }]
        );

        assert!(wait_for(|| service.refresh_count() == 1, TIMEOUT).await);
        let refresh = &service.refresh_requests()[0];
        assert_eq!(refresh.server_sub_handles, vec!["mock-1".to_string()]);
        assert_eq!(refresh.wait_time, 1000);
        poller.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_items_rebuilds_handle_map_during_poll() {
        let service = Arc::new(MockService::new());
        let connection = connection(&service);
        let poller = SubscriptionPoller::new(&connection, None, settings());

        poller.set_item_names(["A.Value", "B.Value"]);
        // the loop is now parked inside a long-poll refresh
        assert!(wait_for(|| service.refresh_count() == 1, TIMEOUT).await);

        poller.set_items(vec![
            ItemRequest::new("c", "C.Value"),
            ItemRequest::new("d", "D.Value"),
        ]);
        {
            let state = poller.shared.state.lock();
            let snapshot = state.items.snapshot();
            let mut keys: Vec<_> = snapshot.handles.keys().cloned().collect();
            keys.sort();
            assert_eq!(keys, vec!["c".to_string(), "d".to_string()]);
            assert!(state.subscription.is_none());
        }

        // the next subscription is built from the new items
        assert!(wait_for(|| service.subscribe_count() == 2, TIMEOUT).await);
        let names: Vec<_> = service.subscribe_requests()[1]
            .items
            .iter()
            .map(|item| item.item_name.clone())
            .collect();
        assert_eq!(names, vec!["C.Value".to_string(), "D.Value".to_string()]);
        poller.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_handle_clears_subscription() {
        let service = Arc::new(MockService::new());
        service.push_subscribe_reply(Ok(SubscribeReply::new("S1")));
        service.push_refresh_reply(Ok(PolledRefreshReply::default().with_invalid_handle("S1")));
        // keep the second setup pending so the cleared state can be observed
        service.push_subscribe_reply_after(Duration::from_secs(60), Ok(SubscribeReply::new("S2")));

        let listener = Arc::new(RecordingListener::new());
        let connection = connection(&service);
        let poller = SubscriptionPoller::new(&connection, Some(listener.clone()), settings());
        poller.set_items(vec![ItemRequest::new("h1", "Temp.Value")]);

        assert!(wait_for(|| service.subscribe_count() == 2, TIMEOUT).await);
        assert!(!poller.shared.has_subscription());
        assert!(
            wait_for(|| listener.last_state() == Some(SubscriptionState::Inactive), TIMEOUT).await
        );
        assert_eq!(
            listener.states(),
            vec![
                SubscriptionState::Inactive,
                SubscriptionState::Active,
                SubscriptionState::Inactive
            ]
        );
        assert!(listener.data().is_empty());
        poller.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_reply_for_replaced_items_is_dropped() {
        let service = Arc::new(MockService::new());
        service.push_subscribe_reply_after(
            Duration::from_millis(500),
            Ok(SubscribeReply::new("stale").with_item(RawItemValue::new("h1", json!(1)))),
        );

        let listener = Arc::new(RecordingListener::new());
        let connection = connection(&service);
        let poller = SubscriptionPoller::new(&connection, Some(listener.clone()), settings());
        poller.set_items(vec![ItemRequest::new("h1", "Old.Value")]);
        assert!(wait_for(|| service.subscribe_count() == 1, TIMEOUT).await);

        poller.set_items(vec![ItemRequest::new("h2", "New.Value")]);

        assert!(wait_for(|| service.cancelled_handles() == vec!["stale"], TIMEOUT).await);
        assert!(wait_for(|| service.subscribe_count() == 2, TIMEOUT).await);
        assert!(listener.data().is_empty());
        poller.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_one_loop() {
        let service = Arc::new(MockService::new());
        let connection = connection(&service);
        let poller = SubscriptionPoller::new(&connection, None, settings());

        poller.start();
        poller.set_items(vec![ItemRequest::new("h1", "Temp.Value")]);
        assert!(wait_for(|| service.refresh_count() == 1, TIMEOUT).await);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(service.subscribe_count(), 1);
        poller.dispose().await;
    }
}
