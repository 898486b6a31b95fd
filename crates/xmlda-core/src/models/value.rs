//! Item value model

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::protocol::QualityBits;

/// Coarse quality of an item value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    Good,
    Uncertain,
    Bad,
}

impl From<QualityBits> for ItemState {
    fn from(bits: QualityBits) -> Self {
        match bits {
            QualityBits::Good | QualityBits::GoodLocalOverride => ItemState::Good,
            QualityBits::Uncertain
            | QualityBits::UncertainLastUsableValue
            | QualityBits::UncertainSensorNotAccurate
            | QualityBits::UncertainEuExceeded
            | QualityBits::UncertainSubNormal => ItemState::Uncertain,
            QualityBits::Bad
            | QualityBits::BadConfigurationError
            | QualityBits::BadNotConnected
            | QualityBits::BadDeviceFailure
            | QualityBits::BadSensorFailure
            | QualityBits::BadLastKnownValue
            | QualityBits::BadCommFailure
            | QualityBits::BadOutOfService
            | QualityBits::BadWaitingForInitialData => ItemState::Bad,
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "GOOD"),
            Self::Uncertain => write!(f, "UNCERTAIN"),
            Self::Bad => write!(f, "BAD"),
        }
    }
}

/// Per-item error reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInformation {
    /// Result code (e.g. "E_UNKNOWNITEMNAME")
    pub code: String,
    /// Human-readable text, when the server supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl fmt::Display for ErrorInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "[Error - code: {}, text: {} ]", self.code, text),
            None => write!(f, "[Error - code: {} ]", self.code),
        }
    }
}

/// Snapshot of one item's value as delivered to listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemValue {
    pub item_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_path: Option<String>,
    /// The value (JSON value to support the scalar types of the protocol)
    pub value: serde_json::Value,
    pub state: ItemState,
    /// Item timestamp as reported by the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_information: Option<ErrorInformation>,
}

impl ItemValue {
    fn fmt_base(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timestamp = self
            .timestamp
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "[ItemValue - name: {}, value: {}, timestamp: {}, state: {} ]",
            self.item_name, self.value, timestamp, self.state
        )
    }
}

impl fmt::Display for ItemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_base(f)?;
        if let Some(error) = &self.error_information {
            write!(f, "\n  {}", error)?;
        }
        Ok(())
    }
}
