//! Client configuration: the recognized options of ยง6, their defaults, a
//! typed builder, and layered loading (defaults <- TOML file <- environment)
//! the way the web backend in this corpus layers `figment` providers.

use crate::{error::ConfigError, package::Credentials};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

/// Either a single fixed node, or a cluster seed list to gossip-discover through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoints {
    Static { host: String, port: u16 },
    Cluster { seeds: Vec<(String, u16)> },
}

/// Validated, immutable client settings. Build via [`ClientSettingsBuilder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub endpoints: Option<Endpoints>,
    pub tls: bool,
    pub tls_server_name: Option<String>,
    pub insecure_trust_all: bool,
    /// Credentials attached to every operation that doesn't supply its own
    /// override, and used for the initial `Authentication` phase handshake.
    pub default_credentials: Option<Credentials>,

    #[serde(with = "duration_millis")]
    pub reconnection_delay: Duration,
    #[serde(with = "duration_millis")]
    pub heartbeat_interval: Duration,
    #[serde(with = "duration_millis")]
    pub heartbeat_timeout: Duration,
    pub require_master: bool,

    #[serde(with = "duration_millis")]
    pub operation_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub operation_timeout_check_interval: Duration,
    pub max_operation_queue_size: usize,
    pub max_concurrent_operations: usize,
    /// Per-operation retry ceiling; `None` means unlimited.
    pub max_operation_retries: Option<u32>,
    /// Client-wide reconnect ceiling; `None` means unlimited.
    pub max_reconnections: Option<u32>,

    pub persistent_subscription_buffer_size: u32,
    pub persistent_subscription_auto_ack_enabled: bool,
    pub fail_on_no_server_response: bool,

    /// Server-imposed ceiling a catch-up subscription's `readBatchSize` must stay under.
    pub max_read_slice_size: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoints: None,
            tls: false,
            tls_server_name: None,
            insecure_trust_all: false,
            default_credentials: None,
            reconnection_delay: Duration::from_secs(1),
            heartbeat_interval: Duration::from_millis(500),
            heartbeat_timeout: Duration::from_millis(1500),
            require_master: true,
            operation_timeout: Duration::from_secs(7),
            operation_timeout_check_interval: Duration::from_secs(1),
            max_operation_queue_size: 5000,
            max_concurrent_operations: 5000,
            max_operation_retries: Some(10),
            max_reconnections: Some(10),
            persistent_subscription_buffer_size: 10,
            persistent_subscription_auto_ack_enabled: true,
            fail_on_no_server_response: false,
            max_read_slice_size: 4096,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(super::millis(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

impl ClientSettings {
    pub fn builder() -> ClientSettingsBuilder {
        ClientSettingsBuilder { inner: ClientSettings::default(), static_endpoint: None, cluster_seeds: None }
    }

    /// Loads settings from built-in defaults, overlaid by an optional TOML
    /// file (`ESDB_CONFIG`, default `eventstore.toml`) and `ESDB_`-prefixed
    /// environment variables, then validates the result.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("ESDB_CONFIG").unwrap_or_else(|_| "eventstore.toml".to_string());
        let settings: ClientSettings = Figment::new()
            .merge(Serialized::defaults(ClientSettings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ESDB_").split("_"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match &self.endpoints {
            None => return Err(ConfigError::MissingNodeSettings),
            Some(Endpoints::Static { .. }) | Some(Endpoints::Cluster { .. }) => {}
        }
        if self.max_concurrent_operations == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_concurrent_operations",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_operation_queue_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_operation_queue_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.operation_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                field: "operation_timeout",
                reason: "must be non-zero".into(),
            });
        }
        if self.max_read_slice_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_read_slice_size",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Validates that a catch-up subscription's requested batch size stays
    /// under the configured read-slice ceiling, per ยง6.
    pub fn check_read_batch_size(&self, requested: u32) -> Result<(), ConfigError> {
        if requested >= self.max_read_slice_size {
            return Err(ConfigError::ReadBatchTooLarge {
                requested,
                ceiling: self.max_read_slice_size,
            });
        }
        Ok(())
    }
}

/// Typed builder over [`ClientSettings`]; `build()` performs the same
/// validation as [`ClientSettings::from_env`].
///
/// `static_endpoint` and `cluster_seeds` are tracked independently rather
/// than sharing one field, so that setting both is a detectable error
/// instead of the second call silently overwriting the first.
#[derive(Debug, Clone)]
pub struct ClientSettingsBuilder {
    inner: ClientSettings,
    static_endpoint: Option<Endpoints>,
    cluster_seeds: Option<Endpoints>,
}

impl ClientSettingsBuilder {
    pub fn static_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.static_endpoint = Some(Endpoints::Static { host: host.into(), port });
        self
    }

    pub fn cluster_seeds(mut self, seeds: Vec<(String, u16)>) -> Self {
        self.cluster_seeds = Some(Endpoints::Cluster { seeds });
        self
    }

    pub fn tls(mut self, enabled: bool) -> Self {
        self.inner.tls = enabled;
        self
    }

    pub fn tls_server_name(mut self, name: impl Into<String>) -> Self {
        self.inner.tls_server_name = Some(name.into());
        self
    }

    pub fn insecure_trust_all(mut self, trust_all: bool) -> Self {
        self.inner.insecure_trust_all = trust_all;
        self
    }

    pub fn credentials(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.inner.default_credentials = Some(Credentials { login: login.into(), password: password.into() });
        self
    }

    pub fn reconnection_delay(mut self, d: Duration) -> Self {
        self.inner.reconnection_delay = d;
        self
    }

    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.inner.heartbeat_interval = d;
        self
    }

    pub fn heartbeat_timeout(mut self, d: Duration) -> Self {
        self.inner.heartbeat_timeout = d;
        self
    }

    pub fn require_master(mut self, require: bool) -> Self {
        self.inner.require_master = require;
        self
    }

    pub fn operation_timeout(mut self, d: Duration) -> Self {
        self.inner.operation_timeout = d;
        self
    }

    pub fn max_operation_queue_size(mut self, n: usize) -> Self {
        self.inner.max_operation_queue_size = n;
        self
    }

    pub fn max_concurrent_operations(mut self, n: usize) -> Self {
        self.inner.max_concurrent_operations = n;
        self
    }

    pub fn max_operation_retries(mut self, n: Option<u32>) -> Self {
        self.inner.max_operation_retries = n;
        self
    }

    pub fn max_reconnections(mut self, n: Option<u32>) -> Self {
        self.inner.max_reconnections = n;
        self
    }

    pub fn fail_on_no_server_response(mut self, fail: bool) -> Self {
        self.inner.fail_on_no_server_response = fail;
        self
    }

    pub fn max_read_slice_size(mut self, n: u32) -> Self {
        self.inner.max_read_slice_size = n;
        self
    }

    pub fn build(self) -> Result<ClientSettings, ConfigError> {
        let mut inner = self.inner;
        inner.endpoints = match (self.static_endpoint, self.cluster_seeds) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingEndpoints),
            (Some(endpoints), None) | (None, Some(endpoints)) => Some(endpoints),
            (None, None) => inner.endpoints,
        };
        inner.validate()?;
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_endpoints_rejected() {
        let err = ClientSettings::builder().build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingNodeSettings));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = ClientSettings::builder()
            .static_endpoint("localhost", 1113)
            .max_concurrent_operations(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "max_concurrent_operations", .. }));
    }

    #[test]
    fn defaults_match_spec_table() {
        let s = ClientSettings::builder().static_endpoint("localhost", 1113).build().unwrap();
        assert_eq!(s.reconnection_delay, Duration::from_secs(1));
        assert_eq!(s.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(s.heartbeat_timeout, Duration::from_millis(1500));
        assert!(s.require_master);
        assert_eq!(s.operation_timeout, Duration::from_secs(7));
        assert_eq!(s.max_operation_queue_size, 5000);
        assert_eq!(s.max_concurrent_operations, 5000);
        assert_eq!(s.max_operation_retries, Some(10));
        assert_eq!(s.max_reconnections, Some(10));
        assert_eq!(s.persistent_subscription_buffer_size, 10);
        assert!(s.persistent_subscription_auto_ack_enabled);
        assert!(!s.fail_on_no_server_response);
    }

    #[test]
    fn conflicting_endpoints_rejected() {
        let err = ClientSettings::builder()
            .static_endpoint("localhost", 1113)
            .cluster_seeds(vec![("localhost".into(), 2113)])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingEndpoints));
    }

    #[test]
    fn read_batch_ceiling_enforced() {
        let s = ClientSettings::builder()
            .static_endpoint("localhost", 1113)
            .max_read_slice_size(100)
            .build()
            .unwrap();
        assert!(s.check_read_batch_size(99).is_ok());
        assert!(s.check_read_batch_size(100).is_err());
    }
}
