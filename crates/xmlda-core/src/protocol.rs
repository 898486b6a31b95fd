//! Method-level XML-DA messages
//!
//! These types describe what is exchanged with an XML-DA server for the
//! calls a poller needs (subscribe, polled refresh, cancel and read). How
//! they are encoded on the wire is up to the [`XmlDaService`]
//! implementation.
//!
//! Durations are carried in milliseconds, as the protocol does.
//!
//! [`XmlDaService`]: crate::XmlDaService

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// =============================================================================
// Common Types
// =============================================================================

/// Options sent with every request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub return_error_text: bool,
    pub return_diagnostic_info: bool,
    pub return_item_time: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale_id: Option<String>,
}

impl RequestOptions {
    /// Options asking for error text, diagnostic info and item timestamps
    pub fn detailed() -> Self {
        Self {
            return_error_text: true,
            return_diagnostic_info: true,
            return_item_time: true,
            locale_id: None,
        }
    }
}

/// Error description attached to a reply
///
/// Item values refer to these by result id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpcError {
    /// Result id (e.g. "E_UNKNOWNITEMNAME")
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl OpcError {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: Some(text.into()),
        }
    }
}

/// Quality bits of an item value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualityBits {
    #[default]
    Good,
    GoodLocalOverride,
    Bad,
    BadConfigurationError,
    BadNotConnected,
    BadDeviceFailure,
    BadSensorFailure,
    BadLastKnownValue,
    BadCommFailure,
    BadOutOfService,
    BadWaitingForInitialData,
    Uncertain,
    UncertainLastUsableValue,
    UncertainSensorNotAccurate,
    #[serde(rename = "uncertainEUExceeded")]
    UncertainEuExceeded,
    UncertainSubNormal,
}

/// Full quality of an item value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quality {
    pub quality_field: QualityBits,
    #[serde(default)]
    pub vendor_field: u8,
}

/// An item value as returned by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItemValue {
    pub client_item_handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_path: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub quality: Quality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// Result id referring to an entry in the reply's error list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
}

impl RawItemValue {
    /// Create a good-quality value for a client handle
    pub fn new(client_item_handle: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            client_item_handle: client_item_handle.into(),
            item_name: None,
            item_path: None,
            value,
            quality: Quality::default(),
            timestamp: None,
            result_id: None,
        }
    }

    pub fn with_quality(mut self, quality_field: QualityBits) -> Self {
        self.quality.quality_field = quality_field;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_item_path(mut self, item_path: impl Into<String>) -> Self {
        self.item_path = Some(item_path.into());
        self
    }

    pub fn with_result_id(mut self, result_id: impl Into<String>) -> Self {
        self.result_id = Some(result_id.into());
        self
    }
}

// =============================================================================
// Subscribe
// =============================================================================

/// One item of a subscribe request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequestItem {
    pub item_name: String,
    pub client_item_handle: String,
    pub enable_buffering: bool,
    /// Requested sampling rate in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_sampling_rate: Option<u32>,
}

/// Request to establish a subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub options: RequestOptions,
    pub items: Vec<SubscribeRequestItem>,
    pub return_values_on_reply: bool,
    /// Rate (ms) at which the server expects to hear from the client
    /// before it drops the subscription
    pub subscription_ping_rate: u32,
}

/// Initial value of a subscribed item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeItemValue {
    pub item_value: RawItemValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_sampling_rate: Option<u32>,
}

/// Reply to a subscribe request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscribeReply {
    /// Handle of the new subscription; required for refresh and cancel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_sub_handle: Option<String>,
    #[serde(default)]
    pub items: Vec<SubscribeItemValue>,
    #[serde(default)]
    pub errors: Vec<OpcError>,
}

impl SubscribeReply {
    /// Create a reply carrying a server subscription handle
    pub fn new(server_sub_handle: impl Into<String>) -> Self {
        Self {
            server_sub_handle: Some(server_sub_handle.into()),
            ..Default::default()
        }
    }

    pub fn with_item(mut self, item_value: RawItemValue) -> Self {
        self.items.push(SubscribeItemValue {
            item_value,
            revised_sampling_rate: None,
        });
        self
    }

    pub fn with_error(mut self, error: OpcError) -> Self {
        self.errors.push(error);
        self
    }
}

// =============================================================================
// Polled Refresh
// =============================================================================

/// Long-poll request for changed values of one or more subscriptions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolledRefreshRequest {
    pub options: RequestOptions,
    pub server_sub_handles: Vec<String>,
    /// Maximum time (ms) the server may hold the request
    pub wait_time: u32,
    pub return_all_items: bool,
}

/// Changed values of one subscription
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolledRefreshItemList {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_handle: Option<String>,
    #[serde(default)]
    pub items: Vec<RawItemValue>,
}

/// Reply to a polled refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolledRefreshReply {
    #[serde(default)]
    pub item_lists: Vec<PolledRefreshItemList>,
    /// Subscription handles the server no longer knows
    #[serde(default)]
    pub invalid_server_sub_handles: Vec<String>,
    #[serde(default)]
    pub errors: Vec<OpcError>,
}

impl PolledRefreshReply {
    pub fn with_item_list(mut self, subscription_handle: &str, items: Vec<RawItemValue>) -> Self {
        self.item_lists.push(PolledRefreshItemList {
            subscription_handle: Some(subscription_handle.to_string()),
            items,
        });
        self
    }

    pub fn with_invalid_handle(mut self, handle: impl Into<String>) -> Self {
        self.invalid_server_sub_handles.push(handle.into());
        self
    }

    pub fn with_error(mut self, error: OpcError) -> Self {
        self.errors.push(error);
        self
    }
}

// =============================================================================
// Cancel
// =============================================================================

/// Request to drop a subscription at the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCancel {
    pub server_sub_handle: String,
}

// =============================================================================
// Read
// =============================================================================

/// One item of a read request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequestItem {
    pub item_name: String,
    pub client_item_handle: String,
    /// Maximum age (ms) of a cached value the server may return
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u32>,
}

/// One-shot read of a set of items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub options: RequestOptions,
    pub items: Vec<ReadRequestItem>,
}

/// Reply to a read request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadReply {
    #[serde(default)]
    pub items: Vec<RawItemValue>,
    #[serde(default)]
    pub errors: Vec<OpcError>,
}

impl ReadReply {
    pub fn with_item(mut self, item: RawItemValue) -> Self {
        self.items.push(item);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_quality_bits_wire_names() {
        assert_eq!(
            serde_json::to_value(QualityBits::UncertainEuExceeded).unwrap(),
            json!("uncertainEUExceeded")
        );
        assert_eq!(
            serde_json::to_value(QualityBits::BadCommFailure).unwrap(),
            json!("badCommFailure")
        );
    }

    #[test]
    fn test_raw_value_defaults_to_good_quality() {
        let raw: RawItemValue =
            serde_json::from_value(json!({ "client_item_handle": "h1", "value": 3 })).unwrap();

        assert_eq!(raw.quality.quality_field, QualityBits::Good);
        assert_eq!(raw, RawItemValue::new("h1", json!(3)));
    }
}
