//! XmlDaService trait - the transport seam for pollers

use async_trait::async_trait;

use crate::error::ServiceResult;
use crate::protocol::{
    PolledRefreshReply, PolledRefreshRequest, ReadReply, ReadRequest, SubscribeReply,
    SubscribeRequest, SubscriptionCancel,
};

/// Remote calls of an XML-DA server
///
/// Implementations own the wire encoding and the HTTP exchange. A single
/// service is shared by every poller of a connection, so implementations
/// must be safe for concurrent use.
#[async_trait]
pub trait XmlDaService: Send + Sync {
    /// Establish a subscription for a set of items
    async fn subscribe(&self, request: SubscribeRequest) -> ServiceResult<SubscribeReply>;

    /// Fetch changed values of a subscription
    ///
    /// The server may hold the call for up to `request.wait_time`
    /// milliseconds before answering.
    async fn subscription_polled_refresh(
        &self,
        request: PolledRefreshRequest,
    ) -> ServiceResult<PolledRefreshReply>;

    /// Drop a subscription at the server
    async fn subscription_cancel(&self, request: SubscriptionCancel) -> ServiceResult<()>;

    /// Read the current values of a set of items
    async fn read(&self, request: ReadRequest) -> ServiceResult<ReadReply>;
}
