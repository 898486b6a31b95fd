//! Connection to an XML-DA server

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use xmlda_core::{ItemRequest, ItemValue, XmlDaService};

use crate::config::{ConnectionConfig, SubscriptionSettings};
use crate::dispatch::EventDispatcher;
use crate::error::Result;
use crate::listener::SubscriptionListener;
use crate::poller::{read_request, ReadPoller, SubscriptionPoller};
use crate::translate;

/// A configured server endpoint plus the event dispatcher shared by all
/// pollers created from it
///
/// # Example
///
/// ```rust,ignore
/// let connection = Connection::new(ConnectionConfig::new(url), service)?;
/// let poller = connection.create_subscription_poller(Some(listener));
/// poller.set_item_names(["Dynamic/Analog Types/Double"]);
/// ```
pub struct Connection {
    name: String,
    config: ConnectionConfig,
    service: Arc<dyn XmlDaService>,
    dispatcher: EventDispatcher,
}

impl Connection {
    /// Create a connection
    ///
    /// Fails if the configuration is invalid. Must be called from within a
    /// tokio runtime.
    pub fn new(config: ConnectionConfig, service: Arc<dyn XmlDaService>) -> Result<Self> {
        config.validate()?;

        let name = format!("{}/{}", config.server_url, config.local_port_name());
        let dispatcher = EventDispatcher::spawn(format!("{}/Events", name));
        info!(connection = %name, "Connection created");

        Ok(Self {
            name,
            config,
            service,
            dispatcher,
        })
    }

    /// Diagnostic name: `{server_url}/{service_name}Soap`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The underlying service, for calls the pollers do not cover
    pub fn service(&self) -> Arc<dyn XmlDaService> {
        self.service.clone()
    }

    pub(crate) fn dispatcher(&self) -> EventDispatcher {
        self.dispatcher.clone()
    }

    /// Create a subscription poller using the configured wait time and
    /// sampling rate
    pub fn create_subscription_poller(
        &self,
        listener: Option<Arc<dyn SubscriptionListener>>,
    ) -> SubscriptionPoller {
        SubscriptionPoller::new(self, listener, SubscriptionSettings::from_config(&self.config))
    }

    /// Create a subscription poller with an explicit wait time and sampling
    /// rate
    pub fn create_subscription_poller_with(
        &self,
        listener: Option<Arc<dyn SubscriptionListener>>,
        wait_time: Duration,
        sampling_rate: Option<Duration>,
    ) -> SubscriptionPoller {
        let mut settings = SubscriptionSettings::from_config(&self.config);
        settings.wait_time = wait_time;
        settings.sampling_rate = sampling_rate;
        SubscriptionPoller::new(self, listener, settings)
    }

    /// Create a poller that reads all items every `period`
    pub fn create_read_poller(
        &self,
        listener: Option<Arc<dyn SubscriptionListener>>,
        period: Duration,
        max_age: Option<Duration>,
    ) -> ReadPoller {
        ReadPoller::new(self, listener, period, max_age)
    }

    /// Read a set of items once
    pub async fn read(
        &self,
        items: &[ItemRequest],
        max_age: Option<Duration>,
    ) -> Result<HashMap<String, ItemValue>> {
        let reply = self.service.read(read_request(items, max_age)).await?;
        Ok(translate::read_values(&reply, &translate::handle_map(items)))
    }

    /// Stop event delivery
    ///
    /// Events already queued are still delivered; later events are dropped.
    /// Pollers are not disposed by this.
    pub async fn close(&self) {
        if self.dispatcher.is_running() {
            debug!(connection = %self.name, "Closing connection");
        }
        self.dispatcher.drain().await;
    }

    /// Returns `true` once [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        !self.dispatcher.is_running()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
