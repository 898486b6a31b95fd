//! Connection and poller configuration
//!
//! Configuration can be built in code or loaded from TOML:
//!
//! ```toml
//! server_url = "http://opc.example.com/OPCXML/DataAccess.asmx"
//! service_name = "OPCXML_DataAccess"
//! request_timeout_ms = 10000
//!
//! [subscription]
//! wait_time_ms = 5000
//! sampling_rate_ms = 250
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, Result};

/// Configuration of a connection to an XML-DA server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Endpoint of the XML-DA service
    pub server_url: String,
    /// Location of the WSDL, when it differs from the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wsdl_url: Option<String>,
    /// Name of the service
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Connection timeout (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Request timeout (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Defaults for subscription pollers
    #[serde(default)]
    pub subscription: SubscriptionConfig,
}

fn default_service_name() -> String {
    "OPCXML_DataAccess".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Settings of subscription pollers created from a connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Long-poll wait time (milliseconds). Derived from the request
    /// timeout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time_ms: Option<u64>,
    /// Requested sampling rate per item (milliseconds)
    #[serde(default = "default_sampling_rate_ms")]
    pub sampling_rate_ms: Option<u64>,
    /// Ping rate sent to the server as a multiple of the wait time
    #[serde(default = "default_ping_rate_factor")]
    pub ping_rate_factor: u32,
    /// Ask the server to buffer value changes between refreshes
    #[serde(default = "default_enable_buffering")]
    pub enable_buffering: bool,
    /// Pause after a failed setup or refresh (milliseconds)
    #[serde(default)]
    pub retry_delay_ms: u64,
}

fn default_sampling_rate_ms() -> Option<u64> {
    Some(100)
}

fn default_ping_rate_factor() -> u32 {
    4
}

fn default_enable_buffering() -> bool {
    true
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            wait_time_ms: None,
            sampling_rate_ms: default_sampling_rate_ms(),
            ping_rate_factor: default_ping_rate_factor(),
            enable_buffering: default_enable_buffering(),
            retry_delay_ms: 0,
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration with default timeouts
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            wsdl_url: None,
            service_name: default_service_name(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            subscription: SubscriptionConfig::default(),
        }
    }

    /// Set the service name
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    /// Parse a configuration from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Check that URLs parse and timeouts are usable
    pub fn validate(&self) -> Result<()> {
        self.server_url()?;
        if let Some(wsdl_url) = &self.wsdl_url {
            Url::parse(wsdl_url)?;
        }
        if self.service_name.is_empty() {
            return Err(ClientError::InvalidConfig(
                "service_name must not be empty".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(ClientError::InvalidConfig(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.subscription.ping_rate_factor == 0 {
            return Err(ClientError::InvalidConfig(
                "ping_rate_factor must be greater than zero".to_string(),
            ));
        }
        if self.subscription.wait_time_ms == Some(0) {
            return Err(ClientError::InvalidConfig(
                "wait_time_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The parsed server endpoint
    pub fn server_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.server_url)?)
    }

    /// Name of the local port (service name + "Soap")
    pub fn local_port_name(&self) -> String {
        format!("{}Soap", self.service_name)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Long-poll wait time for subscription pollers
    ///
    /// Without an explicit setting this is 80% of the request timeout
    /// plus one second.
    pub fn wait_time(&self) -> Duration {
        match self.subscription.wait_time_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_millis(
                (self.request_timeout_ms.saturating_mul(4) / 5).saturating_add(1_000),
            ),
        }
    }

    /// Requested sampling rate for subscribed items
    pub fn sampling_rate(&self) -> Option<Duration> {
        self.subscription.sampling_rate_ms.map(Duration::from_millis)
    }
}

/// Runtime settings of one subscription poller
#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    pub wait_time: Duration,
    pub sampling_rate: Option<Duration>,
    pub ping_rate_factor: u32,
    pub enable_buffering: bool,
    pub retry_delay: Duration,
}

impl SubscriptionSettings {
    /// Settings with the given wait time and the stock defaults otherwise
    pub fn new(wait_time: Duration, sampling_rate: Option<Duration>) -> Self {
        let defaults = SubscriptionConfig::default();
        Self {
            wait_time,
            sampling_rate,
            ping_rate_factor: defaults.ping_rate_factor,
            enable_buffering: defaults.enable_buffering,
            retry_delay: Duration::from_millis(defaults.retry_delay_ms),
        }
    }

    /// Settings taken from a connection configuration
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            wait_time: config.wait_time(),
            sampling_rate: config.sampling_rate(),
            ping_rate_factor: config.subscription.ping_rate_factor,
            enable_buffering: config.subscription.enable_buffering,
            retry_delay: Duration::from_millis(config.subscription.retry_delay_ms),
        }
    }

    /// Ping rate sent with the subscribe request
    pub fn ping_rate(&self) -> Duration {
        self.wait_time.saturating_mul(self.ping_rate_factor)
    }
}

/// Convert a duration to protocol milliseconds, saturating at `u32::MAX`
pub(crate) fn as_millis_u32(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config =
            ConnectionConfig::from_toml_str(r#"server_url = "http://localhost:8080/opc""#).unwrap();

        assert_eq!(config.service_name, "OPCXML_DataAccess");
        assert_eq!(config.local_port_name(), "OPCXML_DataAccessSoap");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.wait_time(), Duration::from_millis(9_000));
        assert_eq!(config.sampling_rate(), Some(Duration::from_millis(100)));
        assert!(config.subscription.enable_buffering);
    }

    #[test]
    fn test_subscription_section() {
        let config = ConnectionConfig::from_toml_str(
            r#"
            server_url = "http://localhost:8080/opc"
            request_timeout_ms = 20000

            [subscription]
            wait_time_ms = 2000
            ping_rate_factor = 3
            retry_delay_ms = 500
            "#,
        )
        .unwrap();

        let settings = SubscriptionSettings::from_config(&config);
        assert_eq!(settings.wait_time, Duration::from_secs(2));
        assert_eq!(settings.ping_rate(), Duration::from_secs(6));
        assert_eq!(settings.retry_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = ConnectionConfig::from_toml_str(r#"server_url = "not a url""#).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = ConnectionConfig::new("http://localhost/opc");
        config.request_timeout_ms = 0;

        assert!(matches!(
            config.validate(),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"server_url = "http://plc-01:8080/da""#).unwrap();
        writeln!(file, r#"service_name = "Plant""#).unwrap();

        let config = ConnectionConfig::load(file.path()).unwrap();
        assert_eq!(config.local_port_name(), "PlantSoap");
    }

    #[test]
    fn test_derived_wait_time_saturates() {
        let mut config = ConnectionConfig::new("http://localhost:8080/opc");
        config.request_timeout_ms = u64::MAX;

        let wait_time = config.wait_time();
        assert_eq!(wait_time, Duration::from_millis(u64::MAX / 5 + 1_000));
        assert_eq!(
            SubscriptionSettings::from_config(&config).ping_rate(),
            wait_time.saturating_mul(4)
        );
    }

    #[test]
    fn test_millis_saturate() {
        assert_eq!(as_millis_u32(Duration::from_millis(1500)), 1500);
        assert_eq!(as_millis_u32(Duration::from_secs(u64::MAX)), u32::MAX);
    }
}
