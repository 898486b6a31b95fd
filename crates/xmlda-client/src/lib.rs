//! xmlda-client - Subscription polling client for OPC XML-DA servers
//!
//! XML-DA servers only answer requests; they never push data. This crate
//! turns subscribe / polled-refresh round trips into a continuous feed of
//! value changes and subscription state changes delivered to a
//! [`SubscriptionListener`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xmlda_client::{Connection, ConnectionConfig, SubscriptionListener};
//!
//! let config = ConnectionConfig::load("xmlda.toml")?;
//! let connection = Connection::new(config, service)?;
//!
//! let poller = connection.create_subscription_poller(Some(Arc::new(MyListener)));
//! poller.set_item_names(["Dynamic/Analog Types/Double", "Dynamic/Analog Types/Int"]);
//!
//! // ... later
//! poller.dispose().await;
//! connection.close().await;
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod poller;
pub mod testing;
pub mod translate;

pub use config::{ConnectionConfig, SubscriptionConfig, SubscriptionSettings};
pub use connection::Connection;
pub use dispatch::EventDispatcher;
pub use error::{ClientError, Result};
pub use listener::SubscriptionListener;
pub use poller::{Poller, ReadPoller, SubscriptionPoller};

// Re-export core types for convenience
pub use xmlda_core::{
    make_requests, ErrorInformation, ItemRequest, ItemState, ItemValue, ServiceError,
    ServiceResult, SubscriptionState, XmlDaService,
};
