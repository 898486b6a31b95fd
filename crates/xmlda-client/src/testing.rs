//! Test utilities for xmlda-client
//!
//! Provides a scripted in-memory [`XmlDaService`] and a listener that
//! records every event, for testing pollers without a server.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use xmlda_core::{
    ItemValue, PolledRefreshReply, PolledRefreshRequest, ReadReply, ReadRequest, ServiceError,
    ServiceResult, SubscribeReply, SubscribeRequest, SubscriptionCancel, SubscriptionState,
    XmlDaService,
};

use crate::listener::SubscriptionListener;

struct Scripted<T> {
    delay: Duration,
    result: ServiceResult<T>,
}

#[derive(Default)]
struct MockState {
    subscribe_replies: VecDeque<Scripted<SubscribeReply>>,
    refresh_replies: VecDeque<Scripted<PolledRefreshReply>>,
    read_replies: VecDeque<Scripted<ReadReply>>,
    cancel_error: Option<ServiceError>,

    subscribe_requests: Vec<SubscribeRequest>,
    refresh_requests: Vec<PolledRefreshRequest>,
    read_requests: Vec<ReadRequest>,
    cancelled_handles: Vec<String>,
}

/// Scripted XML-DA service
///
/// Replies are consumed in the order they were pushed. When the script for
/// a call is exhausted the service behaves like an idle server:
///
/// - `subscribe` answers with a fresh handle `mock-{n}` and no values
/// - `subscription_polled_refresh` holds the call for the requested wait
///   time, then answers with no changes
/// - `read` answers with no values
/// - `subscription_cancel` succeeds unless [`fail_cancel`](Self::fail_cancel)
///   was called
#[derive(Default)]
pub struct MockService {
    state: Mutex<MockState>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `subscribe` call
    pub fn push_subscribe_reply(&self, result: ServiceResult<SubscribeReply>) {
        self.push_subscribe_reply_after(Duration::ZERO, result);
    }

    /// Queue a `subscribe` result that is returned after `delay`
    pub fn push_subscribe_reply_after(
        &self,
        delay: Duration,
        result: ServiceResult<SubscribeReply>,
    ) {
        self.state
            .lock()
            .subscribe_replies
            .push_back(Scripted { delay, result });
    }

    /// Queue the result of the next `subscription_polled_refresh` call
    pub fn push_refresh_reply(&self, result: ServiceResult<PolledRefreshReply>) {
        self.push_refresh_reply_after(Duration::ZERO, result);
    }

    /// Queue a refresh result that is returned after `delay`
    pub fn push_refresh_reply_after(
        &self,
        delay: Duration,
        result: ServiceResult<PolledRefreshReply>,
    ) {
        self.state
            .lock()
            .refresh_replies
            .push_back(Scripted { delay, result });
    }

    /// Queue the result of the next `read` call
    pub fn push_read_reply(&self, result: ServiceResult<ReadReply>) {
        self.state.lock().read_replies.push_back(Scripted {
            delay: Duration::ZERO,
            result,
        });
    }

    /// Make every following `subscription_cancel` call fail
    pub fn fail_cancel(&self, error: ServiceError) {
        self.state.lock().cancel_error = Some(error);
    }

    pub fn subscribe_requests(&self) -> Vec<SubscribeRequest> {
        self.state.lock().subscribe_requests.clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.state.lock().subscribe_requests.len()
    }

    pub fn refresh_requests(&self) -> Vec<PolledRefreshRequest> {
        self.state.lock().refresh_requests.clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.state.lock().refresh_requests.len()
    }

    pub fn read_requests(&self) -> Vec<ReadRequest> {
        self.state.lock().read_requests.clone()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().read_requests.len()
    }

    /// Handles passed to `subscription_cancel`, including failed attempts
    pub fn cancelled_handles(&self) -> Vec<String> {
        self.state.lock().cancelled_handles.clone()
    }
}

async fn delayed<T>(scripted: Scripted<T>) -> ServiceResult<T> {
    if !scripted.delay.is_zero() {
        tokio::time::sleep(scripted.delay).await;
    }
    scripted.result
}

#[async_trait]
impl XmlDaService for MockService {
    async fn subscribe(&self, request: SubscribeRequest) -> ServiceResult<SubscribeReply> {
        let scripted = {
            let mut state = self.state.lock();
            state.subscribe_requests.push(request);
            let n = state.subscribe_requests.len();
            state.subscribe_replies.pop_front().unwrap_or_else(|| Scripted {
                delay: Duration::ZERO,
                result: Ok(SubscribeReply::new(format!("mock-{}", n))),
            })
        };
        delayed(scripted).await
    }

    async fn subscription_polled_refresh(
        &self,
        request: PolledRefreshRequest,
    ) -> ServiceResult<PolledRefreshReply> {
        let wait_time = Duration::from_millis(u64::from(request.wait_time));
        let scripted = {
            let mut state = self.state.lock();
            state.refresh_requests.push(request);
            state.refresh_replies.pop_front().unwrap_or_else(|| Scripted {
                delay: wait_time,
                result: Ok(PolledRefreshReply::default()),
            })
        };
        delayed(scripted).await
    }

    async fn subscription_cancel(&self, request: SubscriptionCancel) -> ServiceResult<()> {
        let mut state = self.state.lock();
        state.cancelled_handles.push(request.server_sub_handle);
        match &state.cancel_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn read(&self, request: ReadRequest) -> ServiceResult<ReadReply> {
        let scripted = {
            let mut state = self.state.lock();
            state.read_requests.push(request);
            state.read_replies.pop_front().unwrap_or_else(|| Scripted {
                delay: Duration::ZERO,
                result: Ok(ReadReply::default()),
            })
        };
        delayed(scripted).await
    }
}

/// An event received by a [`RecordingListener`]
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    State(SubscriptionState),
    Data(HashMap<String, ItemValue>),
}

/// Listener that records every callback in order
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }

    /// Reported states, in order
    pub fn states(&self) -> Vec<SubscriptionState> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ListenerEvent::State(state) => Some(*state),
                ListenerEvent::Data(_) => None,
            })
            .collect()
    }

    /// Delivered value batches, in order
    pub fn data(&self) -> Vec<HashMap<String, ItemValue>> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ListenerEvent::Data(values) => Some(values.clone()),
                ListenerEvent::State(_) => None,
            })
            .collect()
    }

    pub fn last_state(&self) -> Option<SubscriptionState> {
        self.states().last().copied()
    }
}

impl SubscriptionListener for RecordingListener {
    fn state_changed(&self, state: SubscriptionState) {
        self.events.lock().push(ListenerEvent::State(state));
    }

    fn data_changed(&self, values: HashMap<String, ItemValue>) {
        self.events.lock().push(ListenerEvent::Data(values));
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses
///
/// Returns whether the condition was met. Works with paused test time.
pub async fn wait_for<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
