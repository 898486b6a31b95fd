//! xmlda-core - Core traits and types for OPC XML-DA clients
//!
//! This crate provides the item/value model shared by all pollers, the
//! method-level messages exchanged with an XML-DA server, and the
//! [`XmlDaService`] trait that transport implementations provide.

pub mod error;
pub mod models;
pub mod protocol;
pub mod service;

pub use error::{ServiceError, ServiceResult};
pub use models::*;
pub use protocol::{
    OpcError, PolledRefreshItemList, PolledRefreshReply, PolledRefreshRequest, Quality,
    QualityBits, RawItemValue, ReadReply, ReadRequest, ReadRequestItem, RequestOptions,
    SubscribeItemValue, SubscribeReply, SubscribeRequest, SubscribeRequestItem,
    SubscriptionCancel,
};
pub use service::XmlDaService;
